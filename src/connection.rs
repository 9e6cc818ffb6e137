//! Connection adapter.
//!
//! Each physical connection runs in its own local task. The endpoint drives it with
//! [`HandleMessage`]s and receives [`TaskMessage`]s tagged with the connection id.
use bytes::{Bytes, BytesMut};
use std::cell::OnceCell;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Poll;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;

use crate::body::WireBody;
use crate::endpoint::{ConnId, ProxyConfig};
use crate::error::CloseReason;
use crate::http::Target;
use crate::log::{debug, trace};
use crate::proto::parser::parse_status_line;

const READ_BUFFER: usize = 0x4000;

/// Maximum size of a proxy `CONNECT` response head.
const MAX_TUNNEL_HEAD: usize = 0x2000;

pub(crate) type TaskTx = UnboundedSender<TaskMessage>;
pub(crate) type TaskRx = UnboundedReceiver<TaskMessage>;

type HandleTx = UnboundedSender<HandleMessage>;
type HandleRx = UnboundedReceiver<HandleMessage>;

/// Message from the endpoint to a connection task.
#[derive(Debug)]
enum HandleMessage {
    Write { head: Bytes, body: WireBody },
    /// Shutdown after previous writes complete.
    Close,
}

/// Message from a connection task to the endpoint.
#[derive(Debug)]
pub(crate) enum TaskMessage {
    Connected(ConnId),
    Data(ConnId, Bytes),
    Closed(ConnId, CloseReason),
}

/// Create the channel connection tasks report to.
#[inline]
pub(crate) fn channel() -> (TaskTx, TaskRx) {
    unbounded_channel()
}

// ===== Connector =====

/// How to reach an endpoint.
#[derive(Debug)]
pub(crate) struct Connector {
    target: Target,
    proxy: Option<ProxyConfig>,
    tls: OnceCell<Arc<rustls::ClientConfig>>,
}

impl Connector {
    pub(crate) fn new(
        target: Target,
        proxy: Option<ProxyConfig>,
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Self {
        let cell = OnceCell::new();
        if let Some(tls) = tls {
            let _ = cell.set(tls);
        }
        Self { target, proxy, tls: cell }
    }

    async fn connect(&self) -> Result<Stream, CloseReason> {
        let (host, port) = match &self.proxy {
            Some(proxy) => (proxy.host.as_str(), proxy.port),
            None => (self.target.host(), self.target.port()),
        };
        let mut tcp = open(host, port).await?;

        if !self.target.is_tls() {
            return Ok(Stream::Plain(tcp));
        }

        if let Some(proxy) = &self.proxy {
            tunnel(&mut tcp, &self.target, proxy).await?;
        }

        let name = rustls::pki_types::ServerName::try_from(self.target.host().to_owned())
            .map_err(|err| CloseReason::Failure(format!("invalid server name: {err}")))?;
        let tls = tokio_rustls::TlsConnector::from(self.tls_config()?)
            .connect(name, tcp)
            .await
            .map_err(|err| CloseReason::Failure(format!("tls handshake failed: {err}")))?;

        Ok(Stream::Tls(Box::new(tls)))
    }

    fn tls_config(&self) -> Result<Arc<rustls::ClientConfig>, CloseReason> {
        if let Some(config) = self.tls.get() {
            return Ok(Arc::clone(config));
        }

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|err| CloseReason::Failure(format!("tls configuration: {err}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let config = Arc::new(config);
        let _ = self.tls.set(Arc::clone(&config));
        Ok(config)
    }
}

/// Resolve `host` and connect to the first address accepting the connection.
async fn open(host: &str, port: u16) -> Result<TcpStream, CloseReason> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|err| CloseReason::Failure(format!("failed to resolve {host}: {err}")))?;

    let mut last = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(tcp) => {
                let _ = tcp.set_nodelay(true);
                return Ok(tcp);
            }
            Err(err) => {
                trace!("failed to connect {addr}: {err}");
                last = Some(err);
            }
        }
    }

    Err(match last {
        Some(err) => CloseReason::from_connect(&err),
        None => CloseReason::Failure(format!("no address found for {host}")),
    })
}

/// Establish a `CONNECT` tunnel through `proxy`.
async fn tunnel(tcp: &mut TcpStream, target: &Target, proxy: &ProxyConfig) -> Result<(), CloseReason> {
    let mut req = format!("CONNECT {} HTTP/1.0\r\n", target.authority());
    if let Some(auth) = proxy.authorization() {
        req.push_str("Proxy-Authorization: ");
        req.push_str(&auth);
        req.push_str("\r\n");
    }
    req.push_str("\r\n");

    let failure = |err: io::Error| CloseReason::Failure(format!("proxy tunnel failed: {err}"));
    tcp.write_all(req.as_bytes()).await.map_err(failure)?;

    // read byte by byte, anything after the head belongs to the tls handshake
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_TUNNEL_HEAD {
            return Err(CloseReason::Failure("proxy response too large".to_owned()));
        }
        match tcp.read(&mut byte).await.map_err(failure)? {
            0 => return Err(CloseReason::Failure("proxy closed the tunnel".to_owned())),
            _ => head.push(byte[0]),
        }
    }

    let line = head.split(|&b| b == b'\n').next().unwrap_or_default();
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let status = parse_status_line(line)
        .map_err(|err| CloseReason::Failure(format!("invalid proxy response: {err}")))?;

    match status.status {
        200 => Ok(()),
        code => Err(CloseReason::Failure(format!(
            "proxy refused tunnel: {code} {}",
            status.reason
        ))),
    }
}

// ===== Stream =====

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_read(cx, buf),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_write(cx, buf),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_flush(cx),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_shutdown(cx),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_shutdown(cx),
        }
    }
}

// ===== Handle =====

/// Endpoint side of a connection task.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    id: ConnId,
    tx: HandleTx,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Spawn a connection task on the current `LocalSet`.
    pub(crate) fn spawn(id: ConnId, connector: Rc<Connector>, events: TaskTx) -> Self {
        let (tx, rx) = unbounded_channel();
        let task = tokio::task::spawn_local(run(id, connector, rx, events));
        Self { id, tx, task }
    }

    #[inline]
    pub(crate) fn id(&self) -> ConnId {
        self.id
    }

    /// Queue a request for writing.
    pub(crate) fn write(&self, head: Bytes, body: WireBody) {
        let _ = self.tx.send(HandleMessage::Write { head, body });
    }

    /// Close after queued writes complete, the task reports [`TaskMessage::Closed`].
    pub(crate) fn close(self) {
        let _ = self.tx.send(HandleMessage::Close);
    }

    /// Stop the task immediately, nothing is reported.
    pub(crate) fn abort(self) {
        self.task.abort();
    }
}

// ===== Task =====

async fn run(id: ConnId, connector: Rc<Connector>, mut rx: HandleRx, tx: TaskTx) {
    let stream = match connector.connect().await {
        Ok(stream) => stream,
        Err(reason) => {
            let _ = tx.send(TaskMessage::Closed(id, reason));
            return;
        }
    };
    let _ = tx.send(TaskMessage::Connected(id));

    let reason = serve(id, stream, &mut rx, &tx).await;
    debug!("connection #{id} task finished: {reason}");
    let _ = tx.send(TaskMessage::Closed(id, reason));
}

async fn serve(id: ConnId, stream: Stream, rx: &mut HandleRx, tx: &TaskTx) -> CloseReason {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buffer = BytesMut::with_capacity(READ_BUFFER);

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => return CloseReason::Eof,
                Ok(_) => {
                    let _ = tx.send(TaskMessage::Data(id, buffer.split().freeze()));
                    buffer.reserve(READ_BUFFER);
                }
                Err(err) => return CloseReason::from_io(&err),
            },
            msg = rx.recv() => match msg {
                Some(HandleMessage::Write { head, body }) => {
                    if let Err(err) = write_request(&mut writer, head, body).await {
                        return CloseReason::from_io(&err);
                    }
                }
                Some(HandleMessage::Close) | None => {
                    let _ = writer.shutdown().await;
                    return CloseReason::Local;
                }
            },
        }
    }
}

/// Write the header block followed by the body, a file is streamed and closed when done.
async fn write_request<W>(writer: &mut W, head: Bytes, body: WireBody) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&head).await?;
    match body {
        WireBody::Empty => {}
        WireBody::Bytes(bytes) => writer.write_all(&bytes).await?,
        WireBody::File(path) => {
            let mut file = tokio::fs::File::open(&path).await?;
            tokio::io::copy(&mut file, writer).await?;
        }
    }
    writer.flush().await
}
