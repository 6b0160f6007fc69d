use anyhow::{Result, anyhow};
use rustls::{
    DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
    client::{
        WebPkiServerVerifier,
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    },
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{
    fmt,
    sync::{Arc, Mutex},
};

/// Slot the verifiers copy the presented DER chain into, leaf first.
///
/// The slot outlives the handshake, so the chain stays available for
/// fact extraction even when verification rejects it.
pub type CapturedChain = Arc<Mutex<Option<Vec<CertificateDer<'static>>>>>;

fn capture(
    slot: &CapturedChain,
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
) {
    let mut chain = Vec::with_capacity(1 + intermediates.len());
    chain.push(end_entity.clone().into_owned());
    chain.extend(intermediates.iter().map(|c| c.clone().into_owned()));

    if let Ok(mut captured) = slot.lock() {
        *captured = Some(chain);
    }
}

/// A certificate verifier that records the presented chain while
/// delegating actual verification to the standard `WebPKI` verifier.
///
/// # Security
///
/// - Does NOT bypass certificate validation
/// - Uses the standard `WebPKI` verifier for all security checks
/// - Only records the raw chain in addition to normal verification
#[derive(Clone)]
pub struct ChainCapturingVerifier {
    captured: CapturedChain,
    inner_verifier: Arc<WebPkiServerVerifier>,
}

impl fmt::Debug for ChainCapturingVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainCapturingVerifier")
            .field("inner_verifier", &"WebPkiServerVerifier")
            .finish_non_exhaustive()
    }
}

impl ChainCapturingVerifier {
    /// Create a chain-capturing verifier over the given root store
    ///
    /// # Errors
    ///
    /// Returns an error if the `WebPKI` verifier cannot be built
    pub fn new(root_store: RootCertStore, captured: CapturedChain) -> Result<Self> {
        let inner_verifier = WebPkiServerVerifier::builder(Arc::new(root_store))
            .build()
            .map_err(|e| anyhow!("failed to build WebPKI verifier: {e}"))?;

        Ok(Self {
            captured,
            inner_verifier,
        })
    }
}

impl ServerCertVerifier for ChainCapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        // record before verification so facts survive a rejection
        capture(&self.captured, end_entity, intermediates);

        self.inner_verifier.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        )
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner_verifier
            .verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner_verifier
            .verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner_verifier.supported_verify_schemes()
    }
}

/// A verifier that records the presented chain and accepts any
/// certificate without validation. Backs `insecure_skip_verify`.
#[derive(Debug)]
pub struct InsecureVerifier {
    captured: CapturedChain,
}

impl InsecureVerifier {
    #[must_use]
    pub const fn new(captured: CapturedChain) -> Self {
        Self { captured }
    }
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        capture(&self.captured, end_entity, intermediates);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
