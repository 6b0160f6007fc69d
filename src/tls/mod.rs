//! TLS handshake, verification policy and certificate facts
//!
//! # Module Organization
//!
//! - `config` - trust and identity configuration
//! - `connector` - client config construction and the handshake itself
//! - `facts` - certificate fact extraction
//! - `verifier` - chain-capturing certificate verifiers

pub mod config;
pub mod connector;
pub mod facts;
pub mod verifier;

// Re-export commonly used types
pub use config::TlsConfig;
pub use connector::{
    HandshakeFailure, build_connector, ensure_crypto_provider, handshake, server_name_from_host,
    verify_host,
};
pub use facts::{CertificateFacts, ChainFacts, extract_facts};
pub use verifier::{CapturedChain, ChainCapturingVerifier, InsecureVerifier};
