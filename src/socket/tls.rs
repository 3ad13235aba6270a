use crate::base::neterror::NetError;
use boring::ssl::{
    ConnectConfiguration, SslAcceptor, SslConnector, SslContextBuilder, SslFiletype, SslMethod,
    SslVerifyMode, SslVersion,
};
use std::path::PathBuf;

/// Server certificate chain and private key, both PEM files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    pub cert_chain: PathBuf,
    pub private_key: PathBuf,
}

/// TLS settings used for secure connects, in-place upgrades and, with an
/// identity, the server side of accepted connections.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: Option<String>,
    pub alpn_protos: Vec<String>,
    /// Verify the peer certificate and, on the client side, its hostname.
    pub verify_peer: bool,
    pub identity: Option<TlsIdentity>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            alpn_protos: Vec::new(),
            verify_peer: true,
            identity: None,
        }
    }
}

impl TlsConfig {
    /// Server configuration presenting `identity`.
    pub fn server(identity: TlsIdentity) -> Self {
        Self {
            verify_peer: false,
            identity: Some(identity),
            ..Self::default()
        }
    }

    /// Apply version bounds, ciphers and verification to a context builder.
    pub fn apply_to_builder(&self, builder: &mut SslContextBuilder) -> Result<(), NetError> {
        if let Some(min) = self.min_version {
            builder
                .set_min_proto_version(Some(min))
                .map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder
                .set_max_proto_version(Some(max))
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if !self.alpn_protos.is_empty() {
            let mut alpn_wire = Vec::new();
            for proto in &self.alpn_protos {
                if proto.is_empty() || proto.len() > 255 {
                    return Err(NetError::InvalidArgument);
                }
                alpn_wire.push(proto.len() as u8);
                alpn_wire.extend_from_slice(proto.as_bytes());
            }
            builder
                .set_alpn_protos(&alpn_wire)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        builder.set_verify(if self.verify_peer {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });

        Ok(())
    }

    /// Per-connection client configuration for `host`.
    pub fn connect_configuration(&self, host: &str) -> Result<ConnectConfiguration, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.apply_to_builder(&mut builder)?;
        let mut config = builder
            .build()
            .configure()
            .map_err(|_| NetError::SslProtocolError)?;
        config.set_use_server_name_indication(Self::should_set_sni(host));
        config.set_verify_hostname(self.verify_peer);
        Ok(config)
    }

    /// Server-side acceptor; `None` without an identity.
    pub fn build_acceptor(&self) -> Result<Option<SslAcceptor>, NetError> {
        let Some(identity) = &self.identity else {
            return Ok(None);
        };
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())
            .map_err(|_| NetError::SslProtocolError)?;
        builder
            .set_certificate_chain_file(&identity.cert_chain)
            .map_err(|_| NetError::SslServerCertBadFormat)?;
        builder
            .set_private_key_file(&identity.private_key, SslFiletype::PEM)
            .map_err(|_| NetError::SslServerCertBadFormat)?;
        builder
            .check_private_key()
            .map_err(|_| NetError::SslServerCertBadFormat)?;
        self.apply_to_builder(&mut builder)?;
        Ok(Some(builder.build()))
    }

    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        host.parse::<std::net::IpAddr>().is_err()
    }
}
