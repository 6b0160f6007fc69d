use crate::probe::starttls::StartTls;
use rustls::CertificateError;
use std::fmt;

/// Probe stage during which a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dial,
    Negotiation,
    Handshake,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dial => "dial",
            Self::Negotiation => "negotiation",
            Self::Handshake => "handshake",
        })
    }
}

/// Why the presented certificate chain was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    UntrustedChain,
    HostnameMismatch,
    Expired,
    NotYetValid,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UntrustedChain => "untrusted chain",
            Self::HostnameMismatch => "hostname mismatch",
            Self::Expired => "expired",
            Self::NotYetValid => "not yet valid",
        })
    }
}

/// Error types for probe operations
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Target is not a usable `host:port` pair
    #[error("invalid target {0:?}: expected host:port")]
    InvalidTarget(String),

    /// TLS trust material or client identity could not be loaded
    #[error("TLS configuration: {0}")]
    Config(anyhow::Error),

    /// TCP connection could not be established
    #[error("failed to dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The caller-supplied deadline fired while a stage was in flight
    #[error("deadline exceeded during {stage}")]
    DeadlineExceeded { stage: Stage },

    /// The STARTTLS peer sent an unexpected or malformed response
    #[error("{protocol} negotiation failed at {step}: {reason}")]
    Negotiation {
        protocol: StartTls,
        step: &'static str,
        reason: String,
    },

    /// TLS handshake failed at the transport level
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// The handshake completed far enough to present a chain, but
    /// verification rejected it
    #[error("certificate verification failed: {0}")]
    Verification(VerifyFailure),
}

impl ProbeError {
    /// Classify a rustls handshake error, separating certificate
    /// rejections from transport-level failures.
    #[must_use]
    pub fn from_tls(err: &rustls::Error) -> Self {
        match err {
            rustls::Error::InvalidCertificate(reason) => match reason {
                CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
                    Self::Verification(VerifyFailure::Expired)
                }
                CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
                    Self::Verification(VerifyFailure::NotYetValid)
                }
                CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. } => {
                    Self::Verification(VerifyFailure::HostnameMismatch)
                }
                _ => Self::Verification(VerifyFailure::UntrustedChain),
            },
            other => Self::Handshake(other.to_string()),
        }
    }

    /// Short stable label, used as the `result` metric label value
    #[must_use]
    pub const fn classification(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => "invalid_target",
            Self::Config(_) => "config",
            Self::Dial { .. } => "dial",
            Self::DeadlineExceeded { .. } => "deadline",
            Self::Negotiation { .. } => "negotiation",
            Self::Handshake(_) => "handshake",
            Self::Verification(VerifyFailure::UntrustedChain) => "untrusted_chain",
            Self::Verification(VerifyFailure::HostnameMismatch) => "hostname_mismatch",
            Self::Verification(VerifyFailure::Expired) => "expired",
            Self::Verification(VerifyFailure::NotYetValid) => "not_yet_valid",
        }
    }
}
