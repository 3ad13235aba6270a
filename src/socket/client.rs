//! Client socket: a per-connection state machine over a [`Transport`].
//!
//! All mutable state sits in a synchronous core guarded by a mutex. Caller
//! operations and transport notifications both run to completion under
//! that lock, so the core behaves like a single-threaded event loop. What
//! the caller observes comes out of one event channel per socket plus a
//! watch channel carrying lifecycle snapshots for `opened`/`closed`/drain
//! waits.

use crate::base::classify::{classify, ClassifiedError};
use crate::base::error::SocketError;
use crate::base::neterror::OK;
use crate::base::readystate::{Operation, ReadyState};
use crate::socket::options::ConnectOptions;
use crate::socket::pump::{FlushOutcome, TransmitPump};
use crate::socket::starttls::TlsUpgradeSequencer;
use crate::socket::transport::{Transport, TransportEvent};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};

/// Notifications observed by the socket's owner, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Data(Bytes),
    /// Buffered output fell back under the watermark after a `send`
    /// returned `false`.
    Drain,
    /// Terminal; nothing follows.
    Closed,
    /// Abnormal termination. Always immediately followed by `Closed`.
    Errored(ClassifiedError),
}

#[derive(Debug, Clone, Default)]
struct Lifecycle {
    state: ReadyState,
    opened: bool,
    drains: u64,
    error: Option<ClassifiedError>,
}

struct SocketCore {
    host: String,
    port: u16,
    secure: bool,
    state: ReadyState,
    transport: Box<dyn Transport>,
    pump: TransmitPump,
    starttls: TlsUpgradeSequencer,
    suspend_count: u32,
    /// Inbound chunks that arrived while suspended.
    held: VecDeque<Bytes>,
    /// The peer finished sending while output was still flushing.
    input_finished: bool,
    drains: u64,
    events: Option<mpsc::UnboundedSender<SocketEvent>>,
    lifecycle: watch::Sender<Lifecycle>,
}

impl SocketCore {
    fn emit(&mut self, event: SocketEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn set_state(&mut self, state: ReadyState) {
        self.state = state;
        self.lifecycle.send_modify(|l| l.state = state);
    }

    fn send(&mut self, chunk: Bytes) -> Result<bool, SocketError> {
        if !self.state.allows(Operation::Send) {
            return Err(SocketError::NotOpen { state: self.state });
        }
        let deferred = self.starttls.is_deferring();
        let under = self.pump.enqueue(chunk, deferred);
        if !deferred {
            self.pump.start(self.transport.as_mut());
        }
        Ok(under)
    }

    fn suspend(&mut self) {
        if !self.state.allows(Operation::Suspend) {
            return;
        }
        self.suspend_count += 1;
        if self.suspend_count == 1 {
            self.transport.suspend_input();
        }
    }

    fn resume(&mut self) {
        if !self.state.allows(Operation::Resume) || self.suspend_count == 0 {
            return;
        }
        self.suspend_count -= 1;
        if self.suspend_count == 0 {
            self.transport.resume_input();
            self.release_held();
        }
    }

    fn release_held(&mut self) {
        while let Some(chunk) = self.held.pop_front() {
            self.emit(SocketEvent::Data(chunk));
        }
    }

    fn close(&mut self) {
        if !self.state.allows(Operation::Close) {
            return;
        }
        match self.state {
            ReadyState::Open => {
                if self.pump.is_active() || self.pump.buffered_amount() > 0 {
                    tracing::debug!(
                        host = %self.host,
                        port = self.port,
                        buffered = self.pump.buffered_amount(),
                        "closing after flush"
                    );
                    self.set_state(ReadyState::Closing);
                } else {
                    self.finish_close(None);
                }
            }
            _ => self.finish_close(None),
        }
    }

    fn close_immediately(&mut self) {
        if self.state.allows(Operation::CloseImmediately) {
            self.finish_close(None);
        }
    }

    fn upgrade_to_secure(&mut self) -> Result<(), SocketError> {
        if !self.state.allows(Operation::UpgradeToSecure) {
            return Err(SocketError::NotOpen { state: self.state });
        }
        if self.secure || self.starttls.is_deferring() {
            return Ok(());
        }
        if !self.transport.supports_secure_upgrade() {
            tracing::debug!(host = %self.host, "transport cannot upgrade; ignoring");
            return Ok(());
        }
        self.starttls
            .upgrade(&self.pump, self.transport.as_mut(), &mut self.secure);
        Ok(())
    }

    fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.state == ReadyState::Connecting {
                    tracing::debug!(host = %self.host, port = self.port, "socket open");
                    self.set_state(ReadyState::Open);
                    self.lifecycle.send_modify(|l| l.opened = true);
                    self.emit(SocketEvent::Opened);
                }
            }
            TransportEvent::Data(chunk) => {
                if matches!(self.state, ReadyState::Open | ReadyState::Closing) {
                    if self.suspend_count > 0 {
                        self.held.push_back(chunk);
                    } else {
                        self.emit(SocketEvent::Data(chunk));
                    }
                }
            }
            TransportEvent::DrainReady(status) => self.on_flush_complete(status),
            TransportEvent::InputClosed(status) => {
                if status == OK && self.pump.is_active() {
                    // Half-close: stay open until buffered output is out.
                    tracing::debug!(host = %self.host, "peer finished sending; flushing first");
                    self.input_finished = true;
                } else {
                    self.report_error_and_close(status);
                }
            }
            TransportEvent::Error(status) => self.report_error_and_close(status),
        }
    }

    fn on_flush_complete(&mut self, status: i32) {
        if self.state == ReadyState::Closed {
            return;
        }
        if status != OK {
            self.report_error_and_close(status);
            return;
        }
        if self.pump.complete(self.transport.as_mut()) == FlushOutcome::Continued {
            return;
        }
        if self.starttls.on_drained(&mut self.pump, self.transport.as_mut(), &mut self.secure) {
            return;
        }
        if self.pump.take_drain_owed() {
            self.drains += 1;
            let drains = self.drains;
            self.lifecycle.send_modify(|l| l.drains = drains);
            self.emit(SocketEvent::Drain);
        }
        if self.state == ReadyState::Closing || self.input_finished {
            self.finish_close(None);
        }
    }

    fn report_error_and_close(&mut self, status: i32) {
        if self.state == ReadyState::Closed {
            return;
        }
        self.finish_close(classify(status));
    }

    fn finish_close(&mut self, error: Option<ClassifiedError>) {
        self.pump.clear();
        self.starttls.reset();
        self.transport.close_output();
        self.transport.close_input();
        self.state = ReadyState::Closed;
        // State and error change together so waiters never see one without
        // the other.
        self.lifecycle.send_modify(|l| {
            l.state = ReadyState::Closed;
            l.error = error;
        });
        self.release_held();

        if let Some(err) = error {
            tracing::warn!(
                host = %self.host,
                port = self.port,
                category = %err.category,
                name = %err.name,
                status = err.status,
                "socket failed"
            );
            self.emit(SocketEvent::Errored(err));
        } else {
            tracing::debug!(host = %self.host, port = self.port, "socket closed");
        }
        self.emit(SocketEvent::Closed);
        self.events = None;
    }
}

pub(crate) struct SocketShared {
    core: Mutex<SocketCore>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<SocketEvent>>,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl SocketShared {
    pub(crate) fn dispatch(&self, event: TransportEvent) {
        self.core.lock().handle(event);
    }
}

/// A TCP client socket.
///
/// Created by [`ClientSocket::connect`] or handed out by a
/// [`ListenerSocket`](crate::socket::listener::ListenerSocket). Dropping the
/// socket closes it immediately.
pub struct ClientSocket {
    shared: Arc<SocketShared>,
}

impl fmt::Debug for ClientSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("ClientSocket")
            .field("host", &core.host)
            .field("port", &core.port)
            .field("secure", &core.secure)
            .field("ready_state", &core.state)
            .field("buffered_amount", &core.pump.buffered_amount())
            .finish()
    }
}

impl ClientSocket {
    /// Open a connection to `host:port`. The socket starts in
    /// [`ReadyState::Connecting`]. Must be called within a tokio runtime.
    pub fn connect(host: impl Into<String>, port: u16, options: ConnectOptions) -> Self {
        crate::socket::tcp::connect(host.into(), port, options)
    }

    /// Wrap an already-created transport. Transport notifications are fed
    /// in through [`dispatch`](ClientSocket::dispatch).
    pub fn from_transport(
        host: impl Into<String>,
        port: u16,
        transport: Box<dyn Transport>,
        initial: ReadyState,
        options: &ConnectOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle {
            state: initial,
            opened: initial == ReadyState::Open,
            ..Lifecycle::default()
        });
        let core = SocketCore {
            host: host.into(),
            port,
            secure: options.secure,
            state: initial,
            transport,
            pump: TransmitPump::new(options.watermark),
            starttls: TlsUpgradeSequencer::new(),
            suspend_count: 0,
            held: VecDeque::new(),
            input_finished: false,
            drains: 0,
            events: Some(events_tx),
            lifecycle: lifecycle_tx,
        };
        Self {
            shared: Arc::new(SocketShared {
                core: Mutex::new(core),
                events: tokio::sync::Mutex::new(events_rx),
                lifecycle: lifecycle_rx,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<SocketShared> {
        Arc::downgrade(&self.shared)
    }

    /// Feed a transport notification into the state machine.
    pub fn dispatch(&self, event: TransportEvent) {
        self.shared.dispatch(event);
    }

    pub fn host(&self) -> String {
        self.shared.core.lock().host.clone()
    }

    pub fn port(&self) -> u16 {
        self.shared.core.lock().port
    }

    pub fn secure(&self) -> bool {
        self.shared.core.lock().secure
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.core.lock().state
    }

    /// Bytes queued or in flight that the transport has not yet taken.
    pub fn buffered_amount(&self) -> usize {
        self.shared.core.lock().pump.buffered_amount()
    }

    pub fn suspend_count(&self) -> u32 {
        self.shared.core.lock().suspend_count
    }

    /// Queue `chunk` for writing.
    ///
    /// Returns `Ok(false)` when buffered output now exceeds the watermark.
    /// The chunk is still queued; wait for [`SocketEvent::Drain`] before
    /// sending more.
    pub fn send(&self, chunk: impl Into<Bytes>) -> Result<bool, SocketError> {
        self.shared.core.lock().send(chunk.into())
    }

    /// Queue `length` bytes of `chunk` starting at `offset`.
    pub fn send_range(
        &self,
        chunk: Bytes,
        offset: usize,
        length: usize,
    ) -> Result<bool, SocketError> {
        let end = offset.checked_add(length).filter(|end| *end <= chunk.len());
        let Some(end) = end else {
            return Err(SocketError::InvalidRange {
                offset,
                length,
                size: chunk.len(),
            });
        };
        self.send(chunk.slice(offset..end))
    }

    /// Send `chunk`, then wait for drain if the send reported backpressure.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), SocketError> {
        let drains = {
            let mut core = self.shared.core.lock();
            if core.send(chunk.into())? {
                return Ok(());
            }
            core.drains
        };

        let mut lifecycle = self.shared.lifecycle.clone();
        let snapshot = lifecycle
            .wait_for(|l| l.drains > drains || l.state == ReadyState::Closed)
            .await
            .map(|l| l.clone())
            .map_err(|_| SocketError::NotOpen {
                state: ReadyState::Closed,
            })?;
        if snapshot.drains > drains {
            return Ok(());
        }
        Err(closed_error(&snapshot))
    }

    /// Next inbound chunk, `Ok(None)` once the socket has closed cleanly.
    ///
    /// Only one read may be outstanding; a concurrent call fails with
    /// [`SocketError::ReadPending`].
    pub async fn read(&self) -> Result<Option<Bytes>, SocketError> {
        let mut events = self
            .shared
            .events
            .try_lock()
            .map_err(|_| SocketError::ReadPending)?;
        loop {
            match events.recv().await {
                Some(SocketEvent::Data(chunk)) => return Ok(Some(chunk)),
                Some(SocketEvent::Errored(err)) => return Err(SocketError::Transport(err)),
                Some(SocketEvent::Closed) | None => return Ok(None),
                Some(SocketEvent::Opened) | Some(SocketEvent::Drain) => continue,
            }
        }
    }

    /// Next raw event; `None` after [`SocketEvent::Closed`] was consumed.
    /// Shares the single-reader guard with [`read`](ClientSocket::read).
    pub async fn next_event(&self) -> Result<Option<SocketEvent>, SocketError> {
        let mut events = self
            .shared
            .events
            .try_lock()
            .map_err(|_| SocketError::ReadPending)?;
        Ok(events.recv().await)
    }

    /// Pause inbound data notifications. Nested calls need matching
    /// [`resume`](ClientSocket::resume) calls.
    pub fn suspend(&self) {
        self.shared.core.lock().suspend();
    }

    pub fn resume(&self) {
        self.shared.core.lock().resume();
    }

    /// Close after buffered output is flushed.
    pub fn close(&self) {
        self.shared.core.lock().close();
    }

    /// Discard buffered output and close both directions now.
    pub fn close_immediately(&self) {
        self.shared.core.lock().close_immediately();
    }

    /// Switch the connection to TLS once previously written plaintext has
    /// been flushed.
    pub fn upgrade_to_secure(&self) -> Result<(), SocketError> {
        self.shared.core.lock().upgrade_to_secure()
    }

    /// Resolves once the socket is open, or fails with the connect error.
    pub async fn opened(&self) -> Result<(), SocketError> {
        let mut lifecycle = self.shared.lifecycle.clone();
        let snapshot = lifecycle
            .wait_for(|l| l.opened || l.state == ReadyState::Closed)
            .await
            .map(|l| l.clone())
            .map_err(|_| SocketError::NotOpen {
                state: ReadyState::Closed,
            })?;
        if snapshot.opened {
            Ok(())
        } else {
            Err(closed_error(&snapshot))
        }
    }

    /// Resolves once the socket is closed; fails if it closed abnormally.
    pub async fn closed(&self) -> Result<(), SocketError> {
        let mut lifecycle = self.shared.lifecycle.clone();
        let snapshot = lifecycle
            .wait_for(|l| l.state == ReadyState::Closed)
            .await
            .map(|l| l.clone())
            .map_err(|_| SocketError::NotOpen {
                state: ReadyState::Closed,
            })?;
        match snapshot.error {
            Some(err) => Err(SocketError::Transport(err)),
            None => Ok(()),
        }
    }
}

fn closed_error(snapshot: &Lifecycle) -> SocketError {
    match snapshot.error {
        Some(err) => SocketError::Transport(err),
        None => SocketError::NotOpen {
            state: ReadyState::Closed,
        },
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        self.shared.core.lock().close_immediately();
    }
}
