use crud_protocol::{BusMessage, Flags, Oid, RequestType, MAX_OBJECT_SIZE};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// Requests that can be repeated after an ambiguous failure without
/// changing the outcome. CREATE and DELETE are excluded: a CREATE whose
/// response was lost may already have allocated an object.
fn retry_safe(request: RequestType) -> bool {
    matches!(
        request,
        RequestType::Init | RequestType::Format | RequestType::Read | RequestType::Update
    )
}

/// Object store client: one blocking request/response exchange at a time.
///
/// The client performs the INIT handshake lazily before the first other
/// request on a fresh connection, turns a set result bit into
/// [`ClientError::Store`], and retries retry-safe requests on transient
/// transport failures by reconnecting.
pub struct ObjectStoreClient<T: Transport> {
    transport: T,
    initialized: bool,
    retry: RetryPolicy,
}

impl<T: Transport> ObjectStoreClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_retry(transport, RetryPolicy::default())
    }

    pub fn with_retry(transport: T, retry: RetryPolicy) -> Self {
        Self {
            transport,
            initialized: false,
            retry,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send `message` with `payload`, wait for the response and copy any
    /// response payload into `out`. Returns the response and the payload
    /// length.
    pub fn request(
        &mut self,
        message: BusMessage,
        payload: &[u8],
        out: &mut [u8],
    ) -> ClientResult<(BusMessage, usize)> {
        let mut attempt = 0;
        loop {
            // A failed handshake sent nothing but INIT, so it is always
            // repeatable whatever the request behind it.
            let (result, repeatable) = match self.ensure_initialized(message.request) {
                Ok(()) => (self.exchange(&message, payload, out), retry_safe(message.request)),
                Err(err) => (Err(err), true),
            };
            match result {
                Ok(done) => return Ok(done),
                Err(err) if !err.is_transient() || !repeatable || attempt >= self.retry.max_attempts =>
                {
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(request = %message.request, attempt, ?delay, error = %err, "retrying bus request");
                    self.reset();
                    std::thread::sleep(delay);
                }
            }
        }
    }

    fn ensure_initialized(&mut self, request: RequestType) -> ClientResult<()> {
        if self.initialized || request == RequestType::Init {
            return Ok(());
        }
        self.exchange(&BusMessage::init(), &[], &mut [])?;
        Ok(())
    }

    /// One send/receive pair with result-bit checking and session bookkeeping.
    fn exchange(
        &mut self,
        message: &BusMessage,
        payload: &[u8],
        out: &mut [u8],
    ) -> ClientResult<(BusMessage, usize)> {
        self.transport.send(message, payload)?;
        let (response, length) = self.transport.receive(message.request, out)?;
        debug!(request = %message, response = %response, "bus exchange");
        if response.failed {
            return Err(ClientError::Store {
                request: message.request,
                oid: message.oid,
            });
        }
        match message.request {
            RequestType::Init => self.initialized = true,
            RequestType::Close => self.reset(),
            _ => {}
        }
        Ok((response, length))
    }

    /// Forget the session and drop the connection.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.transport.disconnect();
    }

    pub fn init(&mut self) -> ClientResult<()> {
        self.request(BusMessage::init(), &[], &mut [])?;
        Ok(())
    }

    pub fn format(&mut self) -> ClientResult<()> {
        self.request(BusMessage::format(), &[], &mut [])?;
        Ok(())
    }

    /// Create an object holding `data`. Returns the new OID.
    pub fn create(&mut self, data: &[u8], flags: Flags) -> ClientResult<Oid> {
        let length = wire_length(data)?;
        let (response, _) = self.request(BusMessage::create(length, flags), data, &mut [])?;
        Ok(response.oid)
    }

    /// Fetch a whole object. Objects are always read whole.
    pub fn read(&mut self, oid: Oid, flags: Flags) -> ClientResult<Vec<u8>> {
        let mut buf = vec![0u8; MAX_OBJECT_SIZE as usize];
        let (_, length) = self.request(BusMessage::read(oid, MAX_OBJECT_SIZE, flags), &[], &mut buf)?;
        buf.truncate(length);
        Ok(buf)
    }

    /// Replace an object's content. `data` must match the stored length.
    pub fn update(&mut self, oid: Oid, data: &[u8], flags: Flags) -> ClientResult<()> {
        let length = wire_length(data)?;
        self.request(BusMessage::update(oid, length, flags), data, &mut [])?;
        Ok(())
    }

    pub fn delete(&mut self, oid: Oid) -> ClientResult<()> {
        self.request(BusMessage::delete(oid), &[], &mut [])?;
        Ok(())
    }

    /// Ask the store to tear this session down, then disconnect.
    pub fn close(&mut self) -> ClientResult<()> {
        self.request(BusMessage::close(), &[], &mut [])?;
        Ok(())
    }
}

fn wire_length(data: &[u8]) -> ClientResult<u32> {
    u32::try_from(data.len())
        .ok()
        .filter(|&len| len <= MAX_OBJECT_SIZE)
        .ok_or_else(|| {
            crud_protocol::ProtocolError::LengthOutOfRange {
                length: u32::try_from(data.len()).unwrap_or(u32::MAX),
                max: MAX_OBJECT_SIZE,
            }
            .into()
        })
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for ObjectStoreClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("transport", &self.transport)
            .field("initialized", &self.initialized)
            .finish()
    }
}
