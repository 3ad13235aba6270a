//! Listening socket handing out accepted connections as [`ClientSocket`]s.
//!
//! Acceptance is pull-based: a connection that arrives while nobody is
//! waiting in [`ListenerSocket::accept`] or on [`Connections`] is closed
//! and dropped. Callers that want every connection must keep pulling.

use crate::base::classify::{classify, ClassifiedError};
use crate::base::context::IoResultExt;
use crate::base::error::SocketError;
use crate::base::neterror::{NetError, OK};
use crate::socket::client::ClientSocket;
use crate::socket::options::{ConnectOptions, ListenOptions};
use crate::socket::queue::{AcceptResult, ConnectionQueue};
use crate::socket::tcp;
use crate::socket::transport::ListenerEvent;
use boring::ssl::SslAcceptor;
use futures::Stream;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerStatus {
    Listening,
    Stopped(Option<ClassifiedError>),
}

struct ListenerShared {
    local_addr: SocketAddr,
    queue: ConnectionQueue<ClientSocket>,
    status: watch::Sender<ListenerStatus>,
    accepted_options: ConnectOptions,
    acceptor: Option<Arc<SslAcceptor>>,
}

impl ListenerShared {
    /// Returns false once the listener has stopped.
    fn handle(&self, event: ListenerEvent<(TcpStream, SocketAddr)>) -> bool {
        match event {
            ListenerEvent::Accept((stream, peer)) => {
                if self.queue.waiting() == 0 {
                    tracing::debug!(
                        port = self.local_addr.port(),
                        peer = %peer,
                        "no acceptor waiting; dropping connection"
                    );
                    return true;
                }
                let socket = tcp::accepted(
                    stream,
                    peer,
                    &self.accepted_options,
                    self.acceptor.clone(),
                );
                if let Some(unclaimed) = self.queue.connect(socket) {
                    tracing::debug!(
                        port = self.local_addr.port(),
                        peer = %peer,
                        "acceptor went away; dropping connection"
                    );
                    drop(unclaimed);
                }
                true
            }
            ListenerEvent::Error(status) => {
                self.stop(Some(
                    classify(status).unwrap_or_else(|| NetError::Failed.into()),
                ));
                false
            }
            ListenerEvent::StopListening(status) => {
                self.stop(classify(status));
                false
            }
        }
    }

    fn stop(&self, error: Option<ClassifiedError>) {
        if !self.queue.close(error) {
            return;
        }
        match error {
            Some(err) => tracing::warn!(
                port = self.local_addr.port(),
                name = %err.name,
                status = err.status,
                "listener closed by unexpected reason"
            ),
            None => tracing::debug!(port = self.local_addr.port(), "listener closed"),
        }
        self.status.send_replace(ListenerStatus::Stopped(error));
    }
}

/// A bound TCP listener.
///
/// Dropping the listener stops listening; connections already handed out
/// stay open.
pub struct ListenerSocket {
    shared: Arc<ListenerShared>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for ListenerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSocket")
            .field("local_addr", &self.shared.local_addr)
            .field("queue", &self.shared.queue)
            .finish()
    }
}

impl ListenerSocket {
    /// Bind and start listening. Must be called within a tokio runtime.
    pub fn bind(options: ListenOptions) -> Result<Self, SocketError> {
        let addr = SocketAddr::new(options.host, options.port);
        let listener = listen(addr, options.effective_backlog()).map_err(SocketError::Bind)?;
        let local_addr = listener
            .local_addr()
            .classified_context()
            .map_err(SocketError::Bind)?;

        let acceptor = match &options.tls {
            Some(tls) => tls
                .build_acceptor()
                .map_err(|e| SocketError::Bind(e.into()))?
                .map(Arc::new),
            None => None,
        };

        let (status, _) = watch::channel(ListenerStatus::Listening);
        let shared = Arc::new(ListenerShared {
            local_addr,
            queue: ConnectionQueue::new(),
            status,
            accepted_options: options.accepted_socket_options(),
            acceptor,
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        tracing::debug!(
            addr = %local_addr,
            backlog = options.effective_backlog(),
            "listening"
        );
        tokio::spawn(accept_loop(listener, shared.clone(), stop_rx));

        Ok(Self {
            shared,
            stop: Mutex::new(Some(stop_tx)),
        })
    }

    /// The bound port, resolved even when binding to port 0.
    pub fn local_port(&self) -> u16 {
        self.shared.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Wait for the next inbound connection.
    ///
    /// The request joins the accept queue when `accept` is called, not when
    /// the future is first polled. Yields `Ok(None)` once the listener has
    /// closed cleanly.
    pub fn accept(
        &self,
    ) -> impl Future<Output = Result<Option<ClientSocket>, SocketError>> + Send + 'static {
        let request = self.shared.queue.request();
        async move { request.await.unwrap_or(Ok(None)) }
    }

    /// The pull sequence of accepted connections.
    pub fn connections(&self) -> Connections {
        Connections {
            shared: self.shared.clone(),
            pending: None,
            done: false,
        }
    }

    /// Number of acceptors currently waiting.
    pub fn waiting(&self) -> usize {
        self.shared.queue.waiting()
    }

    /// Stop listening. Waiting acceptors get end of sequence.
    pub fn close(&self) {
        self.shared.stop(None);
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Resolves once the listener stops; fails if it stopped abnormally.
    pub async fn closed(&self) -> Result<(), SocketError> {
        let mut status = self.shared.status.subscribe();
        let stopped = status
            .wait_for(|s| matches!(s, ListenerStatus::Stopped(_)))
            .await
            .map(|s| *s);
        match stopped {
            Ok(ListenerStatus::Stopped(Some(err))) => Err(SocketError::Transport(err)),
            _ => Ok(()),
        }
    }
}

impl Drop for ListenerSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ClassifiedError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .classified_context()?;
    socket.set_reuseaddr(true).classified_context()?;
    socket.bind(addr).classified_context()?;
    socket.listen(backlog).classified_context()
}

/// Pause after a transient accept failure before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// ENOMEM, ENFILE, EMFILE.
const RESOURCE_EXHAUSTED: [i32; 3] = [12, 23, 24];

/// Accept failures that concern a single connection or a momentary
/// shortage of descriptors. The listener keeps running after these.
fn is_transient_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) || err
        .raw_os_error()
        .is_some_and(|code| RESOURCE_EXHAUSTED.contains(&code))
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<ListenerShared>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            _ = &mut stop => ListenerEvent::StopListening(OK),
            accepted = listener.accept() => match accepted {
                Ok(conn) => ListenerEvent::Accept(conn),
                Err(err) if is_transient_accept_error(&err) => {
                    tracing::warn!(
                        port = shared.local_addr.port(),
                        error = %err,
                        "accept failed; retrying"
                    );
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
                Err(err) => ListenerEvent::Error(NetError::from_io_error(&err).as_i32()),
            },
        };
        if !shared.handle(event) {
            break;
        }
    }
}

/// Pull sequence of accepted connections.
///
/// Each item is an accepted socket, or the error the listener stopped with.
/// The sequence ends when the listener closes.
pub struct Connections {
    shared: Arc<ListenerShared>,
    pending: Option<oneshot::Receiver<AcceptResult<ClientSocket>>>,
    done: bool,
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections")
            .field("local_addr", &self.shared.local_addr)
            .field("pending", &self.pending.is_some())
            .field("done", &self.done)
            .finish()
    }
}

impl Connections {
    /// End this sequence and every acceptor currently waiting on the
    /// listener. The listener keeps listening.
    pub fn close(&mut self) {
        self.done = true;
        self.pending = None;
        self.shared.queue.end_waiting();
    }
}

impl Stream for Connections {
    type Item = Result<ClientSocket, SocketError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        let shared = self.shared.clone();
        let pending = self.pending.get_or_insert_with(|| shared.queue.request());
        let result = match Pin::new(pending).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result.unwrap_or(Ok(None)),
        };
        self.pending = None;
        match result {
            Ok(Some(socket)) => Poll::Ready(Some(Ok(socket))),
            Ok(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Err(err) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}
