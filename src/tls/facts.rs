//! Read-only certificate facts derived from the presented chain.

use anyhow::{Result, anyhow};
use rustls::pki_types::CertificateDer;
use std::net::{Ipv4Addr, Ipv6Addr};
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

/// Facts extracted from one certificate in the presented chain
#[derive(Debug, Clone, Default)]
pub struct CertificateFacts {
    /// Subject DN
    pub subject: String,
    /// Subject common name, when the DN carries one
    pub common_name: Option<String>,
    /// Issuer DN
    pub issuer: String,
    /// Serial number, colon-separated hex
    pub serial: String,
    /// Start of the validity window, Unix seconds
    pub not_before: i64,
    /// End of the validity window, Unix seconds
    pub not_after: i64,
    /// SAN DNS entries
    pub dns_names: Vec<String>,
    /// SAN IP entries
    pub ip_addresses: Vec<String>,
    /// SAN rfc822Name entries
    pub email_addresses: Vec<String>,
    /// SAN URI entries
    pub uris: Vec<String>,
    /// Signature algorithm name, or the raw OID when unrecognized
    pub signature_algorithm: String,
}

/// The presented chain, leaf first, plus its verification status
#[derive(Debug, Clone, Default)]
pub struct ChainFacts {
    pub chain: Vec<CertificateFacts>,
    /// True when the chain validated against the configured trust source
    pub verified: bool,
}

impl ChainFacts {
    /// The end-entity certificate the peer presented
    #[must_use]
    pub fn leaf(&self) -> Option<&CertificateFacts> {
        self.chain.first()
    }

    /// Parse a leaf-first DER chain into facts
    ///
    /// # Errors
    ///
    /// Returns an error if any chain entry is not a parseable X.509
    /// certificate.
    pub fn from_der_chain(chain: &[CertificateDer<'static>], verified: bool) -> Result<Self> {
        let chain = chain
            .iter()
            .map(|der| extract_facts(der.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { chain, verified })
    }
}

/// Extract certificate facts from a DER-encoded certificate
///
/// # Errors
///
/// Returns an error if the DER data is not a parseable X.509
/// certificate.
pub fn extract_facts(der: &[u8]) -> Result<CertificateFacts> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| anyhow!("failed to parse certificate: {e}"))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(ToString::to_string);

    let mut facts = CertificateFacts {
        subject: cert.subject().to_string(),
        common_name,
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
        signature_algorithm: signature_algorithm_name(
            &cert.signature_algorithm.algorithm.to_id_string(),
        ),
        ..CertificateFacts::default()
    };

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => facts.dns_names.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = format_ip(bytes) {
                        facts.ip_addresses.push(ip);
                    }
                }
                GeneralName::RFC822Name(email) => {
                    facts.email_addresses.push((*email).to_string());
                }
                GeneralName::URI(uri) => facts.uris.push((*uri).to_string()),
                _ => {}
            }
        }
    }

    Ok(facts)
}

/// SAN iPAddress entries are raw octets, 4 for IPv4 and 16 for IPv6
fn format_ip(bytes: &[u8]) -> Option<String> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Some(Ipv4Addr::from(octets).to_string());
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Some(Ipv6Addr::from(octets).to_string());
    }
    None
}

/// Map well-known signature OIDs (RFC 3279/5480/8410) to short names
fn signature_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.5" => "SHA1-RSA",
        "1.2.840.113549.1.1.11" => "SHA256-RSA",
        "1.2.840.113549.1.1.12" => "SHA384-RSA",
        "1.2.840.113549.1.1.13" => "SHA512-RSA",
        "1.2.840.113549.1.1.10" => "RSA-PSS",
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256",
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384",
        "1.2.840.10045.4.3.4" => "ECDSA-SHA512",
        "1.3.101.112" => "Ed25519",
        other => other,
    }
    .to_string()
}
