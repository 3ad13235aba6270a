//! Client and listener sockets.
//!
//! - [`client`]: per-connection state machine and async handle
//! - [`pump`]: outbound queue with one flush in flight
//! - [`starttls`]: ordering of in-place TLS upgrades against writes
//! - [`listener`] / [`queue`]: accept queue and connection pull sequence
//! - [`tcp`]: tokio transport driving the byte stream

pub mod client;
pub mod listener;
pub mod options;
pub mod pump;
pub mod queue;
pub mod starttls;
pub mod stream;
pub mod tcp;
pub mod tls;
pub mod transport;
