//! Classification of transport statuses into semantic error kinds.
//!
//! Every abnormal socket termination is reported to callers as a
//! [`ClassifiedError`], so they can branch on `{category, name}` instead of
//! raw status codes.

use crate::base::neterror::{NetError, CERT_ERROR_RANGE, OK};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    Security,
    Network,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Security => f.write_str("Security"),
            ErrorCategory::Network => f.write_str("Network"),
        }
    }
}

/// Semantic error kinds. The `Display` form is the stable name callers
/// match on (e.g. `ConnectionRefusedError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorName {
    // Certificate verification
    SecurityExpiredCertificateError,
    SecurityRevokedCertificateError,
    SecurityUntrustedCertificateIssuerError,
    SecurityInadequateKeyUsageError,
    SecurityCertificateSignatureAlgorithmDisabledError,

    // TLS protocol
    SecurityNoCertificateError,
    SecurityBadCertificateError,
    SecurityUnsupportedCertificateTypeError,
    #[serde(rename = "SecurityUnsupportedTLSVersionError")]
    SecurityUnsupportedTlsVersionError,
    SecurityCertificateDomainMismatchError,
    SecurityError,

    // Network
    ConnectionRefusedError,
    NetworkTimeoutError,
    DomainNotFoundError,
    NetworkInterruptError,
    NetworkError,
}

impl ErrorName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorName::SecurityExpiredCertificateError => "SecurityExpiredCertificateError",
            ErrorName::SecurityRevokedCertificateError => "SecurityRevokedCertificateError",
            ErrorName::SecurityUntrustedCertificateIssuerError => {
                "SecurityUntrustedCertificateIssuerError"
            }
            ErrorName::SecurityInadequateKeyUsageError => "SecurityInadequateKeyUsageError",
            ErrorName::SecurityCertificateSignatureAlgorithmDisabledError => {
                "SecurityCertificateSignatureAlgorithmDisabledError"
            }
            ErrorName::SecurityNoCertificateError => "SecurityNoCertificateError",
            ErrorName::SecurityBadCertificateError => "SecurityBadCertificateError",
            ErrorName::SecurityUnsupportedCertificateTypeError => {
                "SecurityUnsupportedCertificateTypeError"
            }
            ErrorName::SecurityUnsupportedTlsVersionError => "SecurityUnsupportedTLSVersionError",
            ErrorName::SecurityCertificateDomainMismatchError => {
                "SecurityCertificateDomainMismatchError"
            }
            ErrorName::SecurityError => "SecurityError",
            ErrorName::ConnectionRefusedError => "ConnectionRefusedError",
            ErrorName::NetworkTimeoutError => "NetworkTimeoutError",
            ErrorName::DomainNotFoundError => "DomainNotFoundError",
            ErrorName::NetworkInterruptError => "NetworkInterruptError",
            ErrorName::NetworkError => "NetworkError",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorName::ConnectionRefusedError
            | ErrorName::NetworkTimeoutError
            | ErrorName::DomainNotFoundError
            | ErrorName::NetworkInterruptError
            | ErrorName::NetworkError => ErrorCategory::Network,
            _ => ErrorCategory::Security,
        }
    }
}

impl fmt::Display for ErrorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport failure after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub name: ErrorName,
    /// The raw status the transport reported.
    pub status: i32,
}

impl ClassifiedError {
    /// The underlying transport status as a [`NetError`].
    pub fn net_error(&self) -> NetError {
        NetError::from(self.status)
    }

    /// Certificate verification failures: expiry, revocation, issuer trust,
    /// key usage, signature algorithm.
    pub fn is_certificate_error(&self) -> bool {
        match self.name {
            ErrorName::SecurityExpiredCertificateError
            | ErrorName::SecurityRevokedCertificateError
            | ErrorName::SecurityUntrustedCertificateIssuerError
            | ErrorName::SecurityInadequateKeyUsageError
            | ErrorName::SecurityCertificateSignatureAlgorithmDisabledError => true,
            ErrorName::SecurityError => CERT_ERROR_RANGE.contains(&self.status),
            _ => false,
        }
    }

    /// Security failures in the TLS protocol itself rather than in the
    /// peer's certificate chain.
    pub fn is_protocol_error(&self) -> bool {
        self.category == ErrorCategory::Security && !self.is_certificate_error()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.net_error())
    }
}

impl std::error::Error for ClassifiedError {}

impl From<NetError> for ClassifiedError {
    fn from(err: NetError) -> Self {
        let name = name_for(err);
        ClassifiedError {
            category: name.category(),
            name,
            status: err.as_i32(),
        }
    }
}

/// Classifies a transport status. Returns `None` for [`OK`].
pub fn classify(status: i32) -> Option<ClassifiedError> {
    if status == OK {
        return None;
    }
    Some(ClassifiedError::from(NetError::from(status)))
}

fn name_for(err: NetError) -> ErrorName {
    if err.is_security_error() {
        return match err {
            NetError::CertDateInvalid => ErrorName::SecurityExpiredCertificateError,
            NetError::CertRevoked => ErrorName::SecurityRevokedCertificateError,
            NetError::CertAuthorityInvalid => ErrorName::SecurityUntrustedCertificateIssuerError,
            NetError::SslKeyUsageIncompatible => ErrorName::SecurityInadequateKeyUsageError,
            NetError::CertWeakSignatureAlgorithm => {
                ErrorName::SecurityCertificateSignatureAlgorithmDisabledError
            }
            NetError::SslClientAuthCertNeeded => ErrorName::SecurityNoCertificateError,
            NetError::CertInvalid
            | NetError::BadSslClientAuthCert
            | NetError::SslServerCertBadFormat => ErrorName::SecurityBadCertificateError,
            NetError::ClientAuthCertTypeUnsupported => {
                ErrorName::SecurityUnsupportedCertificateTypeError
            }
            NetError::SslVersionOrCipherMismatch => ErrorName::SecurityUnsupportedTlsVersionError,
            NetError::CertCommonNameInvalid => ErrorName::SecurityCertificateDomainMismatchError,
            _ => ErrorName::SecurityError,
        };
    }

    match err {
        NetError::ConnectionRefused => ErrorName::ConnectionRefusedError,
        NetError::ConnectionTimedOut | NetError::TimedOut => ErrorName::NetworkTimeoutError,
        NetError::NameNotResolved | NetError::NameResolutionFailed => {
            ErrorName::DomainNotFoundError
        }
        NetError::ConnectionReset
        | NetError::ConnectionAborted
        | NetError::InternetDisconnected
        | NetError::NetworkChanged => ErrorName::NetworkInterruptError,
        _ => ErrorName::NetworkError,
    }
}
