//! tlspulse - probe TLS certificates over TCP, with STARTTLS support
//!
//! The probe dials a `host:port` target, optionally negotiates a
//! STARTTLS upgrade (SMTP, FTP or IMAP), completes a TLS handshake and
//! publishes certificate facts as Prometheus metrics.

pub mod cli;
pub mod exporter;
pub mod metrics;
pub mod probe;
pub mod tls;
