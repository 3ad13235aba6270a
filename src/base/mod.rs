//! Base types and error handling.
//!
//! Provides the foundational vocabulary shared by client and listener sockets:
//! - [`NetError`](neterror::NetError): numeric transport statuses
//! - [`classify`](classify::classify): status to `{category, name}` mapping
//! - [`ReadyState`](readystate::ReadyState): socket lifecycle states

pub mod classify;
pub mod context;
pub mod error;
pub mod neterror;
pub mod readystate;
