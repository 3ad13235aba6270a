use crate::socket::pump::DEFAULT_WATERMARK;
use crate::socket::tls::TlsConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Listen backlog used when none is given.
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Options for [`ClientSocket::connect`](crate::socket::client::ClientSocket::connect).
#[must_use]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Negotiate TLS as part of the connect handshake.
    pub secure: bool,

    /// Buffered byte count above which `send` reports backpressure.
    pub watermark: usize,

    /// Give up connecting after this long.
    pub connect_timeout: Option<Duration>,

    /// TLS settings for `secure` connects and later upgrades.
    pub tls: TlsConfig,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            secure: false,
            watermark: DEFAULT_WATERMARK,
            connect_timeout: None,
            tls: TlsConfig::default(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn watermark(mut self, watermark: usize) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }
}

/// Options for [`ListenerSocket::bind`](crate::socket::listener::ListenerSocket::bind).
#[must_use]
#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub host: IpAddr,

    /// `0` lets the OS pick a port.
    pub port: u16,

    pub backlog: Option<u32>,

    /// Watermark applied to accepted sockets.
    pub watermark: usize,

    /// Server-side TLS. Accepted sockets can only be upgraded when this
    /// carries an identity.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            backlog: None,
            watermark: DEFAULT_WATERMARK,
            tls: None,
        }
    }
}

impl ListenOptions {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    pub fn watermark(mut self, watermark: usize) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub(crate) fn effective_backlog(&self) -> u32 {
        self.backlog.unwrap_or(DEFAULT_BACKLOG)
    }

    /// Settings inherited by accepted sockets.
    pub(crate) fn accepted_socket_options(&self) -> ConnectOptions {
        ConnectOptions {
            secure: false,
            watermark: self.watermark,
            connect_timeout: None,
            tls: self.tls.clone().unwrap_or_default(),
        }
    }
}
