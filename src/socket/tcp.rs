//! Tokio implementation of the connection transport.
//!
//! Each connection runs one task owning the stream, split into read and
//! write halves. The socket talks to it through [`TcpTransport`], which
//! only forwards commands over a channel, and the task reports back by
//! dispatching [`TransportEvent`]s into the socket. The task holds the
//! socket weakly, so dropping the last handle tears the connection down.

use crate::base::context::IoResultExt;
use crate::base::neterror::{NetError, OK};
use crate::base::readystate::ReadyState;
use crate::socket::client::{ClientSocket, SocketShared};
use crate::socket::options::ConnectOptions;
use crate::socket::stream::SocketType;
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{Transport, TransportEvent};
use boring::ssl::SslAcceptor;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug)]
enum Command {
    Write(Vec<Bytes>),
    CloseOutput,
    CloseInput,
    SuspendInput,
    ResumeInput,
    StartTls,
}

#[derive(Debug)]
pub(crate) struct TcpTransport {
    commands: mpsc::UnboundedSender<Command>,
    upgradable: bool,
}

impl TcpTransport {
    fn new(upgradable: bool) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: tx,
                upgradable,
            },
            rx,
        )
    }

    fn command(&self, command: Command) {
        // The I/O task is gone once the connection finished; nothing to do.
        let _ = self.commands.send(command);
    }
}

impl Transport for TcpTransport {
    fn write_chunks(&mut self, batch: Vec<Bytes>) {
        self.command(Command::Write(batch));
    }

    fn close_output(&mut self) {
        self.command(Command::CloseOutput);
    }

    fn close_input(&mut self) {
        self.command(Command::CloseInput);
    }

    fn suspend_input(&mut self) {
        self.command(Command::SuspendInput);
    }

    fn resume_input(&mut self) {
        self.command(Command::ResumeInput);
    }

    fn start_secure_upgrade(&mut self) {
        self.command(Command::StartTls);
    }

    fn supports_secure_upgrade(&self) -> bool {
        self.upgradable
    }
}

/// Handshake role used when a plaintext connection is upgraded.
enum SecureUpgrade {
    Client { host: String, tls: TlsConfig },
    Server(Option<Arc<SslAcceptor>>),
}

impl SecureUpgrade {
    async fn run(&self, stream: SocketType) -> Result<SocketType, NetError> {
        let tcp = match stream {
            SocketType::Tcp(tcp) => tcp,
            secure @ SocketType::Ssl(_) => return Ok(secure),
        };
        match self {
            SecureUpgrade::Client { host, tls } => secure_client(host, tls, tcp)
                .await
                .map(SocketType::Ssl),
            SecureUpgrade::Server(Some(acceptor)) => tokio_boring::accept(acceptor, tcp)
                .await
                .map(SocketType::Ssl)
                .map_err(|e| handshake_status(&e)),
            SecureUpgrade::Server(None) => Err(NetError::SslProtocolError),
        }
    }
}

/// Start connecting to `host:port` and return the socket in CONNECTING.
pub(crate) fn connect(host: String, port: u16, options: ConnectOptions) -> ClientSocket {
    let (transport, commands) = TcpTransport::new(!options.secure);
    let socket = ClientSocket::from_transport(
        host.clone(),
        port,
        Box::new(transport),
        ReadyState::Connecting,
        &options,
    );
    let weak = socket.downgrade();

    tracing::debug!(host = %host, port, secure = options.secure, "connecting");
    tokio::spawn(async move {
        let opened = match options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, open(&host, port, &options))
                .await
                .unwrap_or(Err(NetError::ConnectionTimedOut)),
            None => open(&host, port, &options).await,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(host = %host, port, error = %err, "connect failed");
                notify(&weak, TransportEvent::Error(err.as_i32()));
                return;
            }
        };
        tracing::debug!(
            host = %host,
            peer = ?stream.peer_addr().ok(),
            secure = stream.is_secure(),
            "connected"
        );
        if !notify(&weak, TransportEvent::Connected) {
            return;
        }
        let upgrade = SecureUpgrade::Client {
            host,
            tls: options.tls,
        };
        drive(stream, commands, weak, upgrade).await;
    });

    socket
}

/// Wrap an inbound connection as an OPEN socket carrying the peer address.
pub(crate) fn accepted(
    stream: TcpStream,
    peer: SocketAddr,
    options: &ConnectOptions,
    acceptor: Option<Arc<SslAcceptor>>,
) -> ClientSocket {
    let (transport, commands) = TcpTransport::new(acceptor.is_some());
    let socket = ClientSocket::from_transport(
        peer.ip().to_string(),
        peer.port(),
        Box::new(transport),
        ReadyState::Open,
        options,
    );
    let weak = socket.downgrade();
    let _ = stream.set_nodelay(true);
    tokio::spawn(drive(
        SocketType::Tcp(stream),
        commands,
        weak,
        SecureUpgrade::Server(acceptor),
    ));
    socket
}

async fn open(host: &str, port: u16, options: &ConnectOptions) -> Result<SocketType, NetError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| NetError::NameNotResolved)?;

    let mut last_err = NetError::NameNotResolved;
    let mut tcp = None;
    for addr in addrs {
        match TcpStream::connect(addr).await.status_context() {
            Ok(s) => {
                tcp = Some(s);
                break;
            }
            Err(err) => last_err = err,
        }
    }
    let tcp = tcp.ok_or(last_err)?;
    tcp.set_nodelay(true).status_context()?;

    if options.secure {
        let stream = secure_client(host, &options.tls, tcp).await?;
        Ok(SocketType::Ssl(stream))
    } else {
        Ok(SocketType::Tcp(tcp))
    }
}

async fn secure_client(
    host: &str,
    tls: &TlsConfig,
    tcp: TcpStream,
) -> Result<tokio_boring::SslStream<TcpStream>, NetError> {
    let config = tls.connect_configuration(host)?;
    tokio_boring::connect(config, host, tcp)
        .await
        .map_err(|e| handshake_status(&e))
}

/// Certificate failures surface as their specific status; anything else
/// is reported as a protocol error.
fn handshake_status<S>(err: &tokio_boring::HandshakeError<S>) -> NetError {
    if let Some(Err(verify)) = err.ssl().map(|ssl| ssl.verify_result()) {
        return NetError::from_x509_verify_code(verify.as_raw());
    }
    match err.as_io_error() {
        Some(io) if io.kind() != std::io::ErrorKind::Other => NetError::from_io_error(io),
        _ => NetError::SslProtocolError,
    }
}

/// Dispatch into the socket; false once the socket is gone.
fn notify(socket: &Weak<SocketShared>, event: TransportEvent) -> bool {
    match socket.upgrade() {
        Some(shared) => {
            shared.dispatch(event);
            true
        }
        None => false,
    }
}

type Writer = WriteHalf<SocketType>;

/// A batch being written. The future owns the write half and hands it back
/// on completion; dropping it abandons the rest of the batch.
type Flush = BoxFuture<'static, (Writer, Result<(), NetError>)>;

async fn write_batch(mut writer: Writer, batch: Vec<Bytes>) -> (Writer, Result<(), NetError>) {
    let result = async {
        for chunk in &batch {
            writer.write_all(chunk).await.status_context()?;
        }
        writer.flush().await.status_context()
    }
    .await;
    (writer, result)
}

async fn flushed(flushing: &mut Option<Flush>) -> (Writer, Result<(), NetError>) {
    match flushing {
        Some(flush) => flush.await,
        None => std::future::pending().await,
    }
}

enum Step {
    Command(Option<Command>),
    Flushed(Writer, Result<(), NetError>),
    Read(std::io::Result<usize>),
}

/// Run the connection until both directions are closed or the socket is
/// dropped.
///
/// Reads continue while a batch is being written, so two peers streaming
/// at each other never stall on full buffers. A secure upgrade rejoins the
/// halves; it only arrives while no batch is in flight.
async fn drive(
    stream: SocketType,
    mut commands: mpsc::UnboundedReceiver<Command>,
    socket: Weak<SocketShared>,
    upgrade: SecureUpgrade,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let mut writer = Some(writer);
    let mut flushing: Option<Flush> = None;
    let mut queued: VecDeque<Vec<Bytes>> = VecDeque::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut reading = true;
    let mut writing = true;
    let mut suspended = false;

    while reading || writing {
        // Commands first: a pending StartTls must run before any further
        // bytes are read as plaintext.
        let step = tokio::select! {
            biased;
            command = commands.recv() => Step::Command(command),
            (half, result) = flushed(&mut flushing) => Step::Flushed(half, result),
            read = reader.read_buf(&mut buf), if reading && !suspended => Step::Read(read),
        };

        match step {
            // The socket and its transport were dropped.
            Step::Command(None) => break,
            Step::Command(Some(command)) => match command {
                Command::Write(batch) => {
                    if flushing.is_some() {
                        queued.push_back(batch);
                        continue;
                    }
                    match writer.take() {
                        Some(half) => flushing = Some(Box::pin(write_batch(half, batch))),
                        None => {
                            let status = NetError::ConnectionClosed.as_i32();
                            if !notify(&socket, TransportEvent::DrainReady(status)) {
                                break;
                            }
                        }
                    }
                }
                Command::CloseOutput => {
                    if writing {
                        writing = false;
                        queued.clear();
                        if flushing.take().is_some() {
                            tracing::debug!("output closed; abandoning in-flight write");
                        } else if let Some(half) = writer.as_mut() {
                            let _ = half.shutdown().await;
                        }
                    }
                }
                Command::CloseInput => reading = false,
                Command::SuspendInput => suspended = true,
                Command::ResumeInput => suspended = false,
                Command::StartTls => {
                    let Some(half) = writer.take() else {
                        notify(&socket, TransportEvent::Error(NetError::SslProtocolError.as_i32()));
                        return;
                    };
                    match upgrade.run(reader.unsplit(half)).await {
                        Ok(secured) => {
                            tracing::debug!(secure = secured.is_secure(), "secure upgrade complete");
                            let (r, w) = tokio::io::split(secured);
                            reader = r;
                            writer = Some(w);
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "secure upgrade failed");
                            notify(&socket, TransportEvent::Error(err.as_i32()));
                            return;
                        }
                    }
                }
            },
            Step::Flushed(half, result) => {
                flushing = None;
                writer = Some(half);
                let status = match result {
                    Ok(()) => OK,
                    Err(err) => err.as_i32(),
                };
                if !notify(&socket, TransportEvent::DrainReady(status)) {
                    break;
                }
                if let (Some(batch), Some(half)) = (queued.pop_front(), writer.take()) {
                    flushing = Some(Box::pin(write_batch(half, batch)));
                }
            }
            Step::Read(Ok(0)) => {
                reading = false;
                if !notify(&socket, TransportEvent::InputClosed(OK)) {
                    break;
                }
            }
            Step::Read(Ok(_)) => {
                let chunk = buf.split().freeze();
                buf.reserve(READ_BUFFER_SIZE);
                if !notify(&socket, TransportEvent::Data(chunk)) {
                    break;
                }
            }
            Step::Read(Err(err)) => {
                reading = false;
                let status = NetError::from_io_error(&err).as_i32();
                if !notify(&socket, TransportEvent::Error(status)) {
                    break;
                }
            }
        }
    }
}
