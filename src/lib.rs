//! # tcpnet
//!
//! Non-blocking TCP client and listener sockets on tokio.
//!
//! Each [`ClientSocket`] is a state machine (`connecting`, `open`, `closing`,
//! `closed`) over a byte-stream transport. Writes are buffered with an
//! advisory watermark and reach the wire strictly in submission order, one
//! flush at a time. A plaintext connection can be upgraded to TLS in place;
//! writes issued during the upgrade are held until the handshake starts.
//! Transport failures are reported as a [`ClassifiedError`] carrying a
//! `{category, name}` pair.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tcpnet::{ClientSocket, ConnectOptions, ListenOptions, ListenerSocket};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tcpnet::SocketError> {
//!     let listener = ListenerSocket::bind(ListenOptions::new(0))?;
//!     let accept = listener.accept();
//!
//!     let client = ClientSocket::connect("127.0.0.1", listener.local_port(), ConnectOptions::new());
//!     client.opened().await?;
//!     client.write(&b"hello"[..]).await?;
//!
//!     let server_side = accept.await?.expect("listener open");
//!     let chunk = server_side.read().await?;
//!     println!("{:?}", chunk);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Status codes, classification, errors and ready states
//! - [`socket`] - Client and listener sockets and the tokio transport

pub mod base;
pub mod socket;

pub use base::classify::{classify, ClassifiedError, ErrorCategory, ErrorName};
pub use base::error::SocketError;
pub use base::neterror::NetError;
pub use base::readystate::ReadyState;
pub use socket::client::{ClientSocket, SocketEvent};
pub use socket::listener::{Connections, ListenerSocket};
pub use socket::options::{ConnectOptions, ListenOptions};
pub use socket::tls::{TlsConfig, TlsIdentity};
pub use socket::transport::{Transport, TransportEvent};
