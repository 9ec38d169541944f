use std::sync::Arc;

use crud_protocol::{BusCodec, BusMessage, ProtocolError, RequestType};
use crud_store::{BusReply, ObjectStore, StoreSession};

use crate::error::{ClientResult, TransportError};
use crate::transport::Transport;

/// In-process bus transport.
///
/// Requests are encoded to their 64-bit bus value and decoded again before
/// the session sees them, and responses take the same trip back, so the
/// codec is exercised exactly as it is on a socket.
pub struct LocalTransport {
    store: Arc<dyn ObjectStore>,
    session: Option<StoreSession>,
    pending: Option<BusReply>,
}

impl LocalTransport {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            session: None,
            pending: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, request: &BusMessage, payload: &[u8]) -> ClientResult<()> {
        if payload.len() != request.request_payload_len() {
            return Err(ProtocolError::PayloadMismatch {
                declared: request.length,
                actual: payload.len(),
            }
            .into());
        }
        let decoded = BusCodec::decode(BusCodec::encode(request)?)?;
        let store = &self.store;
        let session = self
            .session
            .get_or_insert_with(|| StoreSession::new(Arc::clone(store)));
        let reply = session.handle(&decoded, payload);
        if session.is_closed() {
            self.session = None;
        }
        self.pending = Some(reply);
        Ok(())
    }

    fn receive(&mut self, expected: RequestType, buf: &mut [u8]) -> ClientResult<(BusMessage, usize)> {
        let reply = self.pending.take().ok_or(TransportError::Closed)?;
        let response = BusCodec::decode(BusCodec::encode(&reply.header)?)?;
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
        buf[..length].copy_from_slice(&reply.payload[..length]);
        Ok((response, length))
    }

    fn disconnect(&mut self) {
        self.session = None;
        self.pending = None;
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("session", &self.session)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
