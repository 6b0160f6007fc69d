//! TCP/STARTTLS certificate probing engine
//!
//! # Module Organization
//!
//! - `dialer` - deadline-aware TCP connection establishment
//! - `starttls` - per-protocol plaintext upgrade negotiation
//! - `error` - probe error taxonomy
//!
//! One probe invocation runs dial -> negotiate (when configured) ->
//! TLS handshake -> metric emission, all bounded by a single deadline.

pub mod dialer;
pub mod error;
pub mod starttls;

// Re-export commonly used types
pub use error::{ProbeError, Stage, VerifyFailure};
pub use starttls::StartTls;

use crate::{
    metrics,
    tls::{self, ChainFacts, TlsConfig},
};
use prometheus::Registry;
use tokio::time::Instant;

/// TCP-level probe options
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConfig {
    /// Plaintext negotiation to run before the TLS upgrade
    pub starttls: StartTls,
}

/// Immutable configuration for one probe invocation
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub tcp: TcpConfig,
    pub tls: TlsConfig,
}

/// Result of one probe invocation: an error classification when it
/// failed, plus whatever chain facts the peer presented before the
/// failure. A rejected certificate keeps its facts so operators can
/// see why the probe failed.
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    pub facts: Option<ChainFacts>,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    const fn failed(error: ProbeError) -> Self {
        Self {
            facts: None,
            error: Some(error),
        }
    }
}

/// Probe `target` (`host:port`) according to `module`, registering the
/// outcome metrics on `registry`.
///
/// The deadline bounds the whole invocation: dial, STARTTLS
/// negotiation and TLS handshake. The connection is closed on every
/// exit path.
///
/// # Errors
///
/// Returns the classified `ProbeError` when any stage fails; metrics
/// for the failure (including facts of a rejected certificate) are
/// still registered first.
pub async fn probe_tcp(
    deadline: Instant,
    target: &str,
    module: &Module,
    registry: &Registry,
) -> Result<(), ProbeError> {
    let outcome = run(deadline, target, module).await;

    if let Err(err) = metrics::record_probe(registry, &outcome) {
        eprintln!("failed to record probe metrics for {target}: {err}");
    }

    match outcome.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run(deadline: Instant, target: &str, module: &Module) -> ProbeOutcome {
    let host = match split_host_port(target) {
        Ok((host, _)) => host,
        Err(err) => return ProbeOutcome::failed(err),
    };

    // trust material problems should surface before any connection is made
    let (connector, captured) = match tls::build_connector(&module.tls).await {
        Ok(built) => built,
        Err(err) => return ProbeOutcome::failed(ProbeError::Config(err)),
    };

    let verify_host = tls::verify_host(&module.tls, host);
    let server_name = match tls::server_name_from_host(verify_host) {
        Ok(name) => name,
        Err(_) => return ProbeOutcome::failed(ProbeError::InvalidTarget(verify_host.to_string())),
    };

    let stream = match dialer::dial(target, deadline).await {
        Ok(stream) => stream,
        Err(err) => return ProbeOutcome::failed(err),
    };

    let stream = match starttls::negotiate(stream, module.tcp.starttls, deadline).await {
        Ok(stream) => stream,
        Err(err) => return ProbeOutcome::failed(err),
    };

    let verified_on_success = !module.tls.insecure_skip_verify;
    match tls::handshake(
        &connector,
        server_name,
        stream,
        &captured,
        verified_on_success,
        deadline,
    )
    .await
    {
        Ok(facts) => ProbeOutcome {
            facts: Some(facts),
            error: None,
        },
        Err(failure) => ProbeOutcome {
            facts: failure.facts,
            error: Some(failure.error),
        },
    }
}

/// Split a `host:port` target, accepting bracketed IPv6 hosts
fn split_host_port(target: &str) -> Result<(&str, u16), ProbeError> {
    let invalid = || ProbeError::InvalidTarget(target.to_string());

    let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'));

    let host = match bare {
        Some(v6) => v6,
        // an unbracketed colon means the "port" split an IPv6 literal
        None if host.contains(':') => return Err(invalid()),
        None => host,
    };

    if host.is_empty() {
        return Err(invalid());
    }

    Ok((host, port))
}
