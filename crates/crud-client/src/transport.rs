use std::io::{Read, Write};

use crud_protocol::{BusCodec, BusMessage, ProtocolError, RequestType, HEADER_SIZE};

use crate::error::{ClientResult, TransportError};

/// Carries encoded requests to the object store and responses back.
///
/// Exchanges are strictly sequential: one `send` followed by one `receive`.
/// Interleaving exchanges from several callers would corrupt the framing,
/// which is why both methods take `&mut self`.
pub trait Transport: Send {
    /// Send a request header and, for CREATE and UPDATE, exactly
    /// `request.length` payload bytes.
    fn send(&mut self, request: &BusMessage, payload: &[u8]) -> ClientResult<()>;

    /// Receive one response header. A successful READ response is followed
    /// by `length` payload bytes, which land in `buf`. Returns the response
    /// and the number of payload bytes written to `buf`.
    fn receive(&mut self, expected: RequestType, buf: &mut [u8]) -> ClientResult<(BusMessage, usize)>;

    /// Drop the connection, if any. The next `send` reconnects.
    fn disconnect(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, request: &BusMessage, payload: &[u8]) -> ClientResult<()> {
        (**self).send(request, payload)
    }

    fn receive(&mut self, expected: RequestType, buf: &mut [u8]) -> ClientResult<(BusMessage, usize)> {
        (**self).receive(expected, buf)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

/// Write one framed request: 8-byte big-endian header, then the payload.
pub fn write_frame<W: Write>(writer: &mut W, request: &BusMessage, payload: &[u8]) -> ClientResult<()> {
    let declared = request.request_payload_len();
    if payload.len() != declared {
        return Err(ProtocolError::PayloadMismatch {
            declared: request.length,
            actual: payload.len(),
        }
        .into());
    }
    let header = BusCodec::to_wire(request)?;
    writer.write_all(&header).map_err(TransportError::from)?;
    if declared > 0 {
        writer.write_all(payload).map_err(TransportError::from)?;
    }
    writer.flush().map_err(TransportError::from)?;
    Ok(())
}

/// Read one framed response, looping over short reads until the header and
/// the whole payload have arrived.
pub fn read_frame<R: Read>(
    reader: &mut R,
    expected: RequestType,
    buf: &mut [u8],
) -> ClientResult<(BusMessage, usize)> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).map_err(TransportError::from)?;
    let response = BusCodec::from_wire(header)?;
    if response.request != expected {
        return Err(ProtocolError::UnexpectedResponse {
            expected,
            actual: response.request,
        }
        .into());
    }

    let length = response.response_payload_len();
    if length > buf.len() {
        return Err(ProtocolError::PayloadOverflow {
            length,
            capacity: buf.len(),
        }
        .into());
    }
    reader.read_exact(&mut buf[..length]).map_err(TransportError::from)?;
    Ok((response, length))
}
