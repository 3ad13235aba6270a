//! Shared test fixtures: a transport that records what the socket asks of
//! it, and helpers for building sockets around it.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tcpnet::base::readystate::ReadyState;
use tcpnet::socket::client::{ClientSocket, SocketEvent};
use tcpnet::socket::options::ConnectOptions;
use tcpnet::socket::transport::Transport;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(Vec<Bytes>),
    CloseOutput,
    CloseInput,
    SuspendInput,
    ResumeInput,
    StartTls,
}

/// Handle onto the calls a [`RecordingTransport`] received.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn batches(&self) -> Vec<Vec<Bytes>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    /// Every byte handed to the transport, in order.
    pub fn written(&self) -> Vec<u8> {
        self.batches().concat().iter().flat_map(|c| c.to_vec()).collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[derive(Debug)]
pub struct RecordingTransport {
    log: Recorder,
    upgradable: bool,
}

impl Transport for RecordingTransport {
    fn write_chunks(&mut self, batch: Vec<Bytes>) {
        self.log.push(Call::Write(batch));
    }

    fn close_output(&mut self) {
        self.log.push(Call::CloseOutput);
    }

    fn close_input(&mut self) {
        self.log.push(Call::CloseInput);
    }

    fn suspend_input(&mut self) {
        self.log.push(Call::SuspendInput);
    }

    fn resume_input(&mut self) {
        self.log.push(Call::ResumeInput);
    }

    fn start_secure_upgrade(&mut self) {
        self.log.push(Call::StartTls);
    }

    fn supports_secure_upgrade(&self) -> bool {
        self.upgradable
    }
}

pub fn socket_with(
    initial: ReadyState,
    options: &ConnectOptions,
    upgradable: bool,
) -> (ClientSocket, Recorder) {
    let log = Recorder::default();
    let transport = RecordingTransport {
        log: log.clone(),
        upgradable,
    };
    let socket = ClientSocket::from_transport("example.com", 7000, Box::new(transport), initial, options);
    (socket, log)
}

pub fn open_socket() -> (ClientSocket, Recorder) {
    socket_with(ReadyState::Open, &ConnectOptions::default(), true)
}

pub fn open_socket_with_watermark(watermark: usize) -> (ClientSocket, Recorder) {
    socket_with(ReadyState::Open, &ConnectOptions::new().watermark(watermark), true)
}

pub fn connecting_socket() -> (ClientSocket, Recorder) {
    socket_with(ReadyState::Connecting, &ConnectOptions::default(), true)
}

/// Log to the test writer; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Drain every remaining event. Only terminates once the socket closed.
pub async fn collect_events(socket: &ClientSocket) -> Vec<SocketEvent> {
    let mut events = Vec::new();
    while let Some(event) = socket.next_event().await.unwrap() {
        events.push(event);
    }
    events
}
