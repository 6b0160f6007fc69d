use std::path::PathBuf;

/// TLS trust and identity configuration for a probe
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Custom CA bundle (PEM); WebPKI roots are used when unset
    pub ca_file: Option<PathBuf>,
    /// Hostname to verify instead of the host portion of the target
    pub server_name: Option<String>,
    /// Accept any certificate without chain or hostname validation
    pub insecure_skip_verify: bool,
    /// Client certificate chain (PEM) for mutual TLS
    pub cert_file: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS
    pub key_file: Option<PathBuf>,
}
