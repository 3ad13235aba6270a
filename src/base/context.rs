//! Ergonomic error context helpers.
//!
//! Provides extension traits for turning `std::io` results into transport
//! statuses and classified socket errors.

use crate::base::classify::ClassifiedError;
use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding transport context to IO Results.
pub trait IoResultExt<T> {
    /// Convert an IO error into the matching transport status.
    ///
    /// # Example
    /// ```ignore
    /// use tcpnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await.status_context()?;
    /// // Err(NetError::ConnectionRefused)
    /// ```
    fn status_context(self) -> Result<T, NetError>;

    /// Convert an IO error straight into a classified error.
    fn classified_context(self) -> Result<T, ClassifiedError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn status_context(self) -> Result<T, NetError> {
        self.map_err(|e| NetError::from_io_error(&e))
    }

    fn classified_context(self) -> Result<T, ClassifiedError> {
        self.status_context().map_err(ClassifiedError::from)
    }
}
