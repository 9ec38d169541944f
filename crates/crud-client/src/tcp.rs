use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};

use crud_protocol::{BusMessage, RequestType};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientResult, TransportError};
use crate::transport::{read_frame, write_frame, Transport};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Bus transport over a TCP stream.
///
/// The connection is opened lazily by the first `send` and dropped after
/// any transport or framing error, so the next exchange starts clean.
pub struct TcpTransport {
    config: ClientConfig,
    conn: Option<Connection>,
}

impl TcpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, conn: None }
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.server_addr
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connect(&self) -> Result<Connection, TransportError> {
        let addr = self.config.server_addr;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout())
            .map_err(|source| TransportError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.io_timeout())?;
        stream.set_write_timeout(self.config.io_timeout())?;
        let reader = BufReader::new(stream.try_clone()?);
        info!(%addr, "connected to object store");
        Ok(Connection {
            reader,
            writer: BufWriter::new(stream),
        })
    }

    fn connection(&mut self) -> Result<&mut Connection, TransportError> {
        if self.conn.is_none() {
            self.conn = Some(self.connect()?);
        }
        self.conn.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, request: &BusMessage, payload: &[u8]) -> ClientResult<()> {
        let conn = self.connection()?;
        let result = write_frame(&mut conn.writer, request, payload);
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn receive(&mut self, expected: RequestType, buf: &mut [u8]) -> ClientResult<(BusMessage, usize)> {
        let conn = self.conn.as_mut().ok_or(TransportError::Closed)?;
        let result = read_frame(&mut conn.reader, expected, buf);
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!(addr = %self.config.server_addr, "disconnected from object store");
        }
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("addr", &self.config.server_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}
