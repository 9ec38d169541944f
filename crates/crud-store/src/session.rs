use std::sync::Arc;

use crud_protocol::{BusMessage, Oid, RequestType};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

/// A response header and the payload that follows it on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusReply {
    pub header: BusMessage,
    pub payload: Vec<u8>,
}

impl BusReply {
    fn ok(header: BusMessage) -> Self {
        Self {
            header,
            payload: Vec::new(),
        }
    }
}

/// Server-side state of one bus connection.
///
/// A session starts uninitialized and only accepts INIT. CLOSE ends it;
/// the connection owner checks [`StoreSession::is_closed`] after each
/// request.
pub struct StoreSession {
    store: Arc<dyn ObjectStore>,
    initialized: bool,
    closed: bool,
}

impl StoreSession {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            initialized: false,
            closed: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Execute one decoded request. Failures are reported in the result bit
    /// of the reply, never as an error of the call.
    pub fn handle(&mut self, request: &BusMessage, payload: &[u8]) -> BusReply {
        match self.execute(request, payload) {
            Ok(reply) => {
                debug!(request = %request, response = %reply.header, "bus request served");
                reply
            }
            Err(err) => {
                warn!(request = %request, error = %err, "bus request failed");
                BusReply::ok(request.failure())
            }
        }
    }

    fn execute(&mut self, request: &BusMessage, payload: &[u8]) -> StoreResult<BusReply> {
        if request.request.carries_request_payload() && payload.len() != request.length as usize {
            return Err(StoreError::PayloadMismatch {
                declared: request.length,
                actual: payload.len(),
            });
        }
        if request.request == RequestType::Init {
            self.initialized = true;
            self.closed = false;
            return Ok(BusReply::ok(request.success(Oid::NONE, 0)));
        }
        if !self.initialized {
            return Err(StoreError::NotInitialized(request.request));
        }

        match request.request {
            RequestType::Format => {
                self.store.format()?;
                Ok(BusReply::ok(request.success(Oid::NONE, 0)))
            }
            RequestType::Create => {
                let oid = self.store.create(payload, request.flags)?;
                Ok(BusReply::ok(request.success(oid, request.length)))
            }
            RequestType::Read => {
                let object = self.store.read(request.oid, request.flags)?;
                if object.len() > request.length as usize {
                    return Err(StoreError::TooLarge {
                        length: object.len(),
                        limit: request.length,
                    });
                }
                Ok(BusReply {
                    header: request.success(object.oid, object.len() as u32),
                    payload: object.data,
                })
            }
            RequestType::Update => {
                let oid = self.store.update(request.oid, payload, request.flags)?;
                Ok(BusReply::ok(request.success(oid, request.length)))
            }
            RequestType::Delete => {
                self.store.delete(request.oid)?;
                Ok(BusReply::ok(request.success(request.oid, 0)))
            }
            RequestType::Close => {
                self.initialized = false;
                self.closed = true;
                Ok(BusReply::ok(request.success(Oid::NONE, 0)))
            }
            RequestType::Init | RequestType::Unknown => Err(StoreError::Unsupported(request.request)),
        }
    }
}

impl std::fmt::Debug for StoreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSession")
            .field("initialized", &self.initialized)
            .field("closed", &self.closed)
            .finish()
    }
}
