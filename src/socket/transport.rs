//! The byte-stream transport primitive a socket drives.
//!
//! A [`Transport`] accepts outbound batches and direction-close requests
//! without blocking; everything it has to report back arrives later as a
//! [`TransportEvent`] fed into the owning socket. The tokio implementation
//! lives in [`crate::socket::tcp`]; tests substitute a recording double.

use bytes::Bytes;
use std::fmt;

/// Notifications delivered by a connection transport.
///
/// Statuses are transport codes as understood by
/// [`NetError`](crate::base::neterror::NetError), with
/// [`OK`](crate::base::neterror::OK) for success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Connected,
    /// Inbound bytes, in arrival order.
    Data(Bytes),
    /// The batch handed to [`Transport::write_chunks`] finished.
    DrainReady(i32),
    /// The inbound direction stopped. `OK` means an orderly remote stop.
    InputClosed(i32),
    /// The transport failed.
    Error(i32),
}

/// Operations a socket issues to its transport. Every method returns
/// immediately.
pub trait Transport: Send + fmt::Debug {
    /// Start writing `batch` in order. Exactly one
    /// [`TransportEvent::DrainReady`] reports completion.
    fn write_chunks(&mut self, batch: Vec<Bytes>);

    fn close_output(&mut self);

    fn close_input(&mut self);

    fn suspend_input(&mut self);

    fn resume_input(&mut self);

    /// Begin a TLS handshake on the established stream. Writes issued
    /// afterwards travel over the secured stream.
    fn start_secure_upgrade(&mut self);

    /// Whether [`start_secure_upgrade`](Transport::start_secure_upgrade) is
    /// supported on this connection.
    fn supports_secure_upgrade(&self) -> bool {
        true
    }
}

/// Notifications delivered by a listening transport.
#[derive(Debug)]
pub enum ListenerEvent<C> {
    Accept(C),
    Error(i32),
    StopListening(i32),
}
