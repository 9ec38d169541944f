use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crud_protocol::{BusCodec, HEADER_SIZE};
use crud_store::{InMemoryObjectStore, ObjectStore, StoreSession};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Object store server.
pub struct CrudServer {
    config: ServerConfig,
    store: Arc<dyn ObjectStore>,
}

impl CrudServer {
    /// Server over a fresh in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryObjectStore::new()))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.config.bind_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Bind the configured address and serve until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` completes.
    /// Connections already being served are left to finish on their own.
    pub async fn serve_until<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info!(%addr, max_connections = self.config.max_connections, "object store server listening");

        let permits = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let idle = self.config.idle_timeout();
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let (socket, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                let _permit = permit;
                debug!(%peer, "connection accepted");
                match handle_connection(socket, store, idle).await {
                    Ok(()) => debug!(%peer, "connection closed"),
                    Err(e) => warn!(%peer, error = %e, "connection dropped"),
                }
            });
        }

        info!(%addr, "object store server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for CrudServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudServer").field("config", &self.config).finish()
    }
}

/// Serve one connection until the peer leaves, sends CLOSE or breaks the
/// framing.
async fn handle_connection(
    mut socket: TcpStream,
    store: Arc<dyn ObjectStore>,
    idle: Option<Duration>,
) -> ServerResult<()> {
    socket.set_nodelay(true)?;
    let (reader, writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut session = StoreSession::new(store);
    let mut payload = Vec::new();

    loop {
        let mut header = [0u8; HEADER_SIZE];
        if !read_header(&mut reader, &mut header, idle).await? {
            return Ok(());
        }
        let request = BusCodec::from_wire(header)?;
        payload.resize(request.request_payload_len(), 0);
        reader.read_exact(&mut payload).await?;

        let reply = session.handle(&request, &payload);
        writer.write_all(&BusCodec::to_wire(&reply.header)?).await?;
        if reply.header.response_payload_len() > 0 {
            writer.write_all(&reply.payload).await?;
        }
        writer.flush().await?;

        if session.is_closed() {
            return Ok(());
        }
    }
}

/// Read the next header. `false` means the peer closed the connection.
async fn read_header<R>(reader: &mut R, header: &mut [u8; HEADER_SIZE], idle: Option<Duration>) -> ServerResult<bool>
where
    R: AsyncRead + Unpin,
{
    let read = reader.read_exact(&mut header[..]);
    let result = match idle {
        Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| ServerError::IdleTimeout {
            ms: limit.as_millis() as u64,
        })?,
        None => read.await,
    };
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crud_client::{ClientConfig, ClientError, ObjectStoreClient, RetryPolicy, TcpTransport};
    use crud_fs::CrudFs;
    use crud_protocol::{BusMessage, Flags, Oid, RequestType};
    use std::net::SocketAddr;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    struct Running {
        addr: SocketAddr,
        store: Arc<InMemoryObjectStore>,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<ServerResult<()>>,
    }

    async fn start(config: ServerConfig) -> Running {
        let store = Arc::new(InMemoryObjectStore::new());
        let server = CrudServer::with_store(
            ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                ..config
            },
            store.clone(),
        );
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_until(listener, async {
            let _ = stopped.await;
        }));
        Running { addr, store, stop, task }
    }

    fn client_config(addr: SocketAddr) -> ClientConfig {
        ClientConfig {
            io_timeout_ms: 5_000,
            retry: RetryPolicy::none(),
            ..ClientConfig::with_addr(addr)
        }
    }

    async fn exchange(stream: &mut TcpStream, request: &BusMessage, payload: &[u8]) -> (BusMessage, Vec<u8>) {
        stream.write_all(&BusCodec::to_wire(request).unwrap()).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).await.unwrap();
        let response = BusCodec::from_wire(header).unwrap();
        let mut body = vec![0u8; response.response_payload_len()];
        stream.read_exact(&mut body).await.unwrap();
        (response, body)
    }

    #[test]
    fn server_construction() {
        let server = CrudServer::new(ServerConfig::default());
        assert_eq!(server.config().bind_addr, "127.0.0.1:19876".parse().unwrap());
    }

    #[tokio::test]
    async fn file_system_over_tcp() {
        let server = start(ServerConfig::default()).await;
        let addr = server.addr;

        let data = tokio::task::spawn_blocking(move || {
            let mut fs = CrudFs::connect(client_config(addr));
            fs.format().unwrap();
            let h = fs.open("a.txt").unwrap();
            fs.write(h, b"hello").unwrap();
            fs.seek(h, 0).unwrap();
            let mut buf = [0u8; 16];
            let n = fs.read(h, &mut buf).unwrap();
            fs.unmount().unwrap();
            buf[..n].to_vec()
        })
        .await
        .unwrap();
        assert_eq!(data, b"hello");

        // The table landed in the shared store; a second client sees it.
        let data = tokio::task::spawn_blocking(move || {
            let mut fs = CrudFs::connect(client_config(addr));
            fs.mount().unwrap();
            let h = fs.open("a.txt").unwrap();
            let mut buf = [0u8; 16];
            let n = fs.read(h, &mut buf).unwrap();
            buf[..n].to_vec()
        })
        .await
        .unwrap();
        assert_eq!(data, b"hello");
        assert!(server.store.priority_oid().is_some());

        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn large_payload_roundtrip() {
        let server = start(ServerConfig::default()).await;
        let addr = server.addr;

        let ok = tokio::task::spawn_blocking(move || {
            let mut client = ObjectStoreClient::with_retry(TcpTransport::new(client_config(addr)), RetryPolicy::none());
            let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
            let oid = client.create(&data, Flags::NONE).unwrap();
            client.read(oid, Flags::NONE).unwrap() == data
        })
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn failure_is_reported_in_result_bit() {
        let server = start(ServerConfig::default()).await;
        let addr = server.addr;

        let err = tokio::task::spawn_blocking(move || {
            let mut client = ObjectStoreClient::with_retry(TcpTransport::new(client_config(addr)), RetryPolicy::none());
            client.delete(Oid::new(404)).unwrap_err()
        })
        .await
        .unwrap();
        assert!(matches!(err, ClientError::Store { request: RequestType::Delete, .. }));
    }

    #[tokio::test]
    async fn request_before_init_fails() {
        let server = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        let (response, body) = exchange(&mut stream, &BusMessage::create(2, Flags::NONE), b"ab").await;
        assert!(response.failed);
        assert!(body.is_empty());
        assert!(server.store.is_empty());
    }

    #[tokio::test]
    async fn close_ends_connection() {
        let server = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        assert!(exchange(&mut stream, &BusMessage::init(), &[]).await.0.is_success());
        assert!(exchange(&mut stream, &BusMessage::close(), &[]).await.0.is_success());
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_header_drops_connection() {
        let server = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        // READ with a 24-bit length above the maximum object size.
        let bad: u64 = (3 << 28) | (0xFF_FFFF << 4);
        stream.write_all(&bad.to_be_bytes()).await.unwrap();
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let server = start(ServerConfig::default()).await;
        let mut first = TcpStream::connect(server.addr).await.unwrap();
        let mut second = TcpStream::connect(server.addr).await.unwrap();
        exchange(&mut first, &BusMessage::init(), &[]).await;
        let (created, _) = exchange(&mut first, &BusMessage::create(3, Flags::NONE), b"abc").await;
        assert!(created.is_success());

        // The second connection has not sent INIT yet.
        let read = BusMessage::read(created.oid, 16, Flags::NONE);
        assert!(exchange(&mut second, &read, &[]).await.0.failed);
        exchange(&mut second, &BusMessage::init(), &[]).await;
        let (response, body) = exchange(&mut second, &read, &[]).await;
        assert!(response.is_success());
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn idle_connections_are_dropped() {
        let server = start(ServerConfig {
            idle_timeout_ms: 50,
            ..ServerConfig::default()
        })
        .await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connections_beyond_limit_wait() {
        let server = start(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        })
        .await;
        let mut first = TcpStream::connect(server.addr).await.unwrap();
        assert!(exchange(&mut first, &BusMessage::init(), &[]).await.0.is_success());

        let mut second = TcpStream::connect(server.addr).await.unwrap();
        second.write_all(&BusCodec::to_wire(&BusMessage::init()).unwrap()).await.unwrap();
        let mut header = [0u8; HEADER_SIZE];
        let waited = tokio::time::timeout(Duration::from_millis(100), second.read_exact(&mut header)).await;
        assert!(waited.is_err());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), second.read_exact(&mut header))
            .await
            .unwrap()
            .unwrap();
        assert!(BusCodec::from_wire(header).unwrap().is_success());
    }
}
