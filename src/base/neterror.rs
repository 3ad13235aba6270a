use std::io;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Status value a transport reports for success.
pub const OK: i32 = 0;

/// Codes reserved for certificate verification failures.
pub const CERT_ERROR_RANGE: RangeInclusive<i32> = -299..=-200;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic Errors
    #[error("Operation failed")]
    Failed,
    #[error("Operation aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Operation timed out")]
    TimedOut,
    #[error("Access denied")]
    AccessDenied,
    #[error("Insufficient resources")]
    InsufficientResources,
    #[error("Network changed")]
    NetworkChanged,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Internet disconnected")]
    InternetDisconnected,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("SSL client auth cert needed")]
    SslClientAuthCertNeeded,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("SSL version or cipher mismatch")]
    SslVersionOrCipherMismatch,
    #[error("SSL renegotiation requested")]
    SslRenegotiationRequested,
    #[error("Bad SSL client auth cert")]
    BadSslClientAuthCert,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("SSL bad record MAC alert")]
    SslBadRecordMacAlert,
    #[error("SSL client auth cert no private key")]
    SslClientAuthCertNoPrivateKey,
    #[error("Name resolution failed")]
    NameResolutionFailed,
    #[error("Network access denied")]
    NetworkAccessDenied,
    #[error("Message too big")]
    MsgTooBig,
    #[error("Address in use")]
    AddressInUse,
    #[error("SSL pinned key not in cert chain")]
    SslPinnedKeyNotInCertChain,
    #[error("Client auth cert type unsupported")]
    ClientAuthCertTypeUnsupported,
    #[error("SSL decrypt error alert")]
    SslDecryptErrorAlert,
    #[error("SSL server cert changed")]
    SslServerCertChanged,
    #[error("SSL unrecognized name alert")]
    SslUnrecognizedNameAlert,
    #[error("SSL server cert bad format")]
    SslServerCertBadFormat,
    #[error("SSL obsolete cipher")]
    SslObsoleteCipher,
    #[error("No buffer space")]
    NoBufferSpace,
    #[error("TLS 1.3 downgrade detected")]
    Tls13DowngradeDetected,
    #[error("SSL key usage incompatible")]
    SslKeyUsageIncompatible,

    // Certificate Errors
    #[error("Certificate common name invalid")]
    CertCommonNameInvalid,
    #[error("Certificate date invalid")]
    CertDateInvalid,
    #[error("Certificate authority invalid")]
    CertAuthorityInvalid,
    #[error("Certificate contains errors")]
    CertContainsErrors,
    #[error("Certificate has no revocation mechanism")]
    CertNoRevocationMechanism,
    #[error("Unable to check certificate revocation")]
    CertUnableToCheckRevocation,
    #[error("Certificate revoked")]
    CertRevoked,
    #[error("Certificate invalid")]
    CertInvalid,
    #[error("Certificate weak signature algorithm")]
    CertWeakSignatureAlgorithm,
    #[error("Certificate non-unique name")]
    CertNonUniqueName,
    #[error("Certificate weak key")]
    CertWeakKey,
    #[error("Certificate name constraint violation")]
    CertNameConstraintViolation,
    #[error("Certificate validity too long")]
    CertValidityTooLong,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::TimedOut => -7,
            NetError::AccessDenied => -10,
            NetError::InsufficientResources => -12,
            NetError::NetworkChanged => -21,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::InternetDisconnected => -106,
            NetError::SslProtocolError => -107,
            NetError::AddressInvalid => -108,
            NetError::AddressUnreachable => -109,
            NetError::SslClientAuthCertNeeded => -110,
            NetError::SocketNotConnected => -112,
            NetError::SslVersionOrCipherMismatch => -113,
            NetError::SslRenegotiationRequested => -114,
            NetError::BadSslClientAuthCert => -117,
            NetError::ConnectionTimedOut => -118,
            NetError::SslBadRecordMacAlert => -126,
            NetError::SslClientAuthCertNoPrivateKey => -135,
            NetError::NameResolutionFailed => -137,
            NetError::NetworkAccessDenied => -138,
            NetError::MsgTooBig => -142,
            NetError::AddressInUse => -147,
            NetError::SslPinnedKeyNotInCertChain => -150,
            NetError::ClientAuthCertTypeUnsupported => -151,
            NetError::SslDecryptErrorAlert => -153,
            NetError::SslServerCertChanged => -156,
            NetError::SslUnrecognizedNameAlert => -159,
            NetError::SslServerCertBadFormat => -167,
            NetError::SslObsoleteCipher => -172,
            NetError::NoBufferSpace => -176,
            NetError::Tls13DowngradeDetected => -180,
            NetError::SslKeyUsageIncompatible => -181,

            NetError::CertCommonNameInvalid => -200,
            NetError::CertDateInvalid => -201,
            NetError::CertAuthorityInvalid => -202,
            NetError::CertContainsErrors => -203,
            NetError::CertNoRevocationMechanism => -204,
            NetError::CertUnableToCheckRevocation => -205,
            NetError::CertRevoked => -206,
            NetError::CertInvalid => -207,
            NetError::CertWeakSignatureAlgorithm => -208,
            NetError::CertNonUniqueName => -210,
            NetError::CertWeakKey => -211,
            NetError::CertNameConstraintViolation => -212,
            NetError::CertValidityTooLong => -213,

            NetError::Unknown(code) => *code,
        }
    }

    /// True for failures raised by the TLS layer or certificate verification.
    pub fn is_security_error(&self) -> bool {
        match self {
            NetError::SslProtocolError
            | NetError::SslClientAuthCertNeeded
            | NetError::SslVersionOrCipherMismatch
            | NetError::SslRenegotiationRequested
            | NetError::BadSslClientAuthCert
            | NetError::SslBadRecordMacAlert
            | NetError::SslClientAuthCertNoPrivateKey
            | NetError::SslPinnedKeyNotInCertChain
            | NetError::ClientAuthCertTypeUnsupported
            | NetError::SslDecryptErrorAlert
            | NetError::SslServerCertChanged
            | NetError::SslUnrecognizedNameAlert
            | NetError::SslServerCertBadFormat
            | NetError::SslObsoleteCipher
            | NetError::Tls13DowngradeDetected
            | NetError::SslKeyUsageIncompatible => true,
            other => other.is_certificate_error(),
        }
    }

    pub fn is_certificate_error(&self) -> bool {
        CERT_ERROR_RANGE.contains(&self.as_i32())
    }

    /// Maps an OS-level socket error onto the closest transport status.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                NetError::ConnectionReset
            }
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::NotConnected => NetError::SocketNotConnected,
            io::ErrorKind::AddrInUse => NetError::AddressInUse,
            io::ErrorKind::AddrNotAvailable => NetError::AddressInvalid,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            io::ErrorKind::PermissionDenied => NetError::AccessDenied,
            io::ErrorKind::InvalidInput => NetError::InvalidArgument,
            io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
            io::ErrorKind::OutOfMemory => NetError::InsufficientResources,
            _ => NetError::Failed,
        }
    }

    /// Maps an X.509 verification result code (`X509_V_ERR_*`) onto a
    /// certificate status.
    pub fn from_x509_verify_code(code: i32) -> Self {
        match code {
            // CERT_NOT_YET_VALID, CERT_HAS_EXPIRED, ERROR_IN_CERT_NOT_BEFORE/AFTER_FIELD
            9 | 10 | 13 | 14 => NetError::CertDateInvalid,
            23 => NetError::CertRevoked,
            // issuer lookup failures, self-signed chains, INVALID_CA, CERT_UNTRUSTED
            2 | 18 | 19 | 20 | 21 | 24 | 27 => NetError::CertAuthorityInvalid,
            26 => NetError::SslKeyUsageIncompatible,
            62 => NetError::CertCommonNameInvalid,
            _ => NetError::CertInvalid,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -7 => NetError::TimedOut,
            -10 => NetError::AccessDenied,
            -12 => NetError::InsufficientResources,
            -21 => NetError::NetworkChanged,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -106 => NetError::InternetDisconnected,
            -107 => NetError::SslProtocolError,
            -108 => NetError::AddressInvalid,
            -109 => NetError::AddressUnreachable,
            -110 => NetError::SslClientAuthCertNeeded,
            -112 => NetError::SocketNotConnected,
            -113 => NetError::SslVersionOrCipherMismatch,
            -114 => NetError::SslRenegotiationRequested,
            -117 => NetError::BadSslClientAuthCert,
            -118 => NetError::ConnectionTimedOut,
            -126 => NetError::SslBadRecordMacAlert,
            -135 => NetError::SslClientAuthCertNoPrivateKey,
            -137 => NetError::NameResolutionFailed,
            -138 => NetError::NetworkAccessDenied,
            -142 => NetError::MsgTooBig,
            -147 => NetError::AddressInUse,
            -150 => NetError::SslPinnedKeyNotInCertChain,
            -151 => NetError::ClientAuthCertTypeUnsupported,
            -153 => NetError::SslDecryptErrorAlert,
            -156 => NetError::SslServerCertChanged,
            -159 => NetError::SslUnrecognizedNameAlert,
            -167 => NetError::SslServerCertBadFormat,
            -172 => NetError::SslObsoleteCipher,
            -176 => NetError::NoBufferSpace,
            -180 => NetError::Tls13DowngradeDetected,
            -181 => NetError::SslKeyUsageIncompatible,

            -200 => NetError::CertCommonNameInvalid,
            -201 => NetError::CertDateInvalid,
            -202 => NetError::CertAuthorityInvalid,
            -203 => NetError::CertContainsErrors,
            -204 => NetError::CertNoRevocationMechanism,
            -205 => NetError::CertUnableToCheckRevocation,
            -206 => NetError::CertRevoked,
            -207 => NetError::CertInvalid,
            -208 => NetError::CertWeakSignatureAlgorithm,
            -210 => NetError::CertNonUniqueName,
            -211 => NetError::CertWeakKey,
            -212 => NetError::CertNameConstraintViolation,
            -213 => NetError::CertValidityTooLong,
            _ => NetError::Unknown(code),
        }
    }
}
