use super::{
    config::TlsConfig,
    facts::ChainFacts,
    verifier::{CapturedChain, ChainCapturingVerifier, InsecureVerifier},
};
use crate::probe::error::{ProbeError, Stage};
use anyhow::{Context, Result, anyhow};
use rustls::{
    ClientConfig, RootCertStore,
    client::danger::ServerCertVerifier,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName},
};
use rustls_pemfile::{certs, private_key};
use std::{
    io::Cursor,
    net::IpAddr,
    path::Path,
    sync::{Arc, Mutex, OnceLock},
};
use tokio::{
    fs,
    net::TcpStream,
    time::{Instant, timeout_at},
};
use tokio_rustls::TlsConnector;

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// This should be called before any TLS operations. It's safe to call
/// multiple times as initialization only happens once.
///
/// # Panics
///
/// Panics if the crypto provider cannot be installed (should never happen in practice)
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
            eprintln!("failed to install ring crypto provider: {err:?}");
            std::process::exit(1);
        }
    });
}

/// Handshake failure plus whatever chain the peer managed to present
/// before the failure.
#[derive(Debug)]
pub struct HandshakeFailure {
    pub error: ProbeError,
    pub facts: Option<ChainFacts>,
}

/// Build a TLS connector for the given trust configuration, together
/// with the slot the verifier copies the presented chain into.
///
/// # Errors
///
/// Returns an error if trust material or the client identity cannot be
/// loaded.
pub async fn build_connector(tls: &TlsConfig) -> Result<(TlsConnector, CapturedChain)> {
    ensure_crypto_provider();

    let captured: CapturedChain = Arc::new(Mutex::new(None));

    let verifier: Arc<dyn ServerCertVerifier> = if tls.insecure_skip_verify {
        Arc::new(InsecureVerifier::new(Arc::clone(&captured)))
    } else {
        let roots = root_store(tls).await?;
        Arc::new(ChainCapturingVerifier::new(roots, Arc::clone(&captured))?)
    };

    let builder = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    let config = if let (Some(cert_path), Some(key_path)) = (&tls.cert_file, &tls.key_file) {
        let certs = load_cert_chain(cert_path.as_path()).await?;
        let key = load_private_key(key_path.as_path()).await?;
        builder.with_client_auth_cert(certs, key)?
    } else {
        builder.with_no_client_auth()
    };

    Ok((TlsConnector::from(Arc::new(config)), captured))
}

/// Perform the TLS client handshake on a (possibly STARTTLS-upgraded)
/// connection and extract the presented chain's facts.
///
/// On success the chain facts are marked verified unless the connector
/// was built with `insecure_skip_verify`. On failure the error is
/// classified and whatever chain the peer presented is still parsed and
/// returned, so a rejected certificate remains diagnosable.
///
/// # Errors
///
/// Returns a `HandshakeFailure` carrying a `ProbeError` classification
/// (deadline, transport failure, or certificate rejection).
pub async fn handshake(
    connector: &TlsConnector,
    server_name: ServerName<'static>,
    stream: TcpStream,
    captured: &CapturedChain,
    verified_on_success: bool,
    deadline: Instant,
) -> Result<ChainFacts, HandshakeFailure> {
    let result = timeout_at(deadline, connector.connect(server_name, stream)).await;

    let presented = captured.lock().ok().and_then(|mut slot| slot.take());

    match result {
        Err(_elapsed) => Err(HandshakeFailure {
            error: ProbeError::DeadlineExceeded {
                stage: Stage::Handshake,
            },
            facts: rejected_facts(presented.as_deref()),
        }),
        Ok(Err(io_err)) => {
            let error = io_err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                .map_or_else(
                    || ProbeError::Handshake(io_err.to_string()),
                    ProbeError::from_tls,
                );

            Err(HandshakeFailure {
                error,
                facts: rejected_facts(presented.as_deref()),
            })
        }
        Ok(Ok(tls_stream)) => {
            // drop closes the connection; certificate data is already
            // captured (or available from the session) at this point
            let presented = presented.or_else(|| {
                let (_, connection) = tls_stream.get_ref();
                connection.peer_certificates().map(<[_]>::to_vec)
            });

            let Some(chain) = presented else {
                return Err(HandshakeFailure {
                    error: ProbeError::Handshake("no peer certificates presented".to_string()),
                    facts: None,
                });
            };

            ChainFacts::from_der_chain(&chain, verified_on_success).map_err(|e| HandshakeFailure {
                error: ProbeError::Handshake(format!("failed to parse peer certificate: {e}")),
                facts: None,
            })
        }
    }
}

/// Best-effort facts for a chain that failed verification
fn rejected_facts(presented: Option<&[CertificateDer<'static>]>) -> Option<ChainFacts> {
    presented.and_then(|chain| ChainFacts::from_der_chain(chain, false).ok())
}

async fn root_store(tls: &TlsConfig) -> Result<RootCertStore> {
    let Some(path) = &tls.ca_file else {
        return Ok(webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect());
    };

    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read CA bundle {}", path.display()))?;

    let mut store = RootCertStore::empty();
    let mut reader = Cursor::new(data);
    for cert in certs(&mut reader) {
        let cert = cert.map_err(|e| anyhow!("invalid CA PEM in {}: {e}", path.display()))?;
        store
            .add(cert)
            .with_context(|| format!("rejected CA certificate in {}", path.display()))?;
    }

    if store.is_empty() {
        anyhow::bail!("no CA certificates found in {}", path.display());
    }

    Ok(store)
}

async fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read certificate {}", path.display()))?;
    let mut reader = Cursor::new(data);
    let parsed = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid certificate PEM: {e}"))?;

    if parsed.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }

    Ok(parsed)
}

async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read private key {}", path.display()))?;

    let mut reader = Cursor::new(data);
    private_key(&mut reader)
        .map_err(|e| anyhow!("invalid private key PEM: {e}"))?
        .ok_or_else(|| anyhow!("no private key found in {}", path.display()))
}

/// Resolve the hostname to verify: the explicit override when
/// configured, else the host portion of the dialed target.
pub fn verify_host<'a>(tls: &'a TlsConfig, target_host: &'a str) -> &'a str {
    tls.server_name.as_deref().unwrap_or(target_host)
}

/// Build a rustls `ServerName` from a hostname or IP address literal
///
/// # Errors
///
/// Returns an error if `host` is neither an IP address nor a valid DNS
/// name.
pub fn server_name_from_host(host: &str) -> Result<ServerName<'static>> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string())
                .map_err(|_| anyhow!("invalid server name: {host}"))
        },
        |ip| Ok(ServerName::from(ip).to_owned()),
    )
}
