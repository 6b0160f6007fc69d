use crate::probe::ProbeOutcome;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, opts,
    register_histogram_with_registry, register_int_counter_vec_with_registry,
};
use std::sync::LazyLock;

/// Process-level registry, served on `/metrics`
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

pub static PROBES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!("tlspulse_probes_total", "Total probes by result"),
        &["result"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PROBE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram_with_registry!(
        HistogramOpts::new("tlspulse_probe_duration_seconds", "Probe duration in seconds"),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Register the outcome of one probe on the caller-supplied registry.
///
/// Each metric name is registered exactly once per call; the exporter
/// hands every probe a fresh registry, so one scrape sees exactly one
/// probe's values. Certificate gauges only appear when the peer
/// presented a chain, so "no certificate obtained" stays
/// distinguishable from "certificate obtained but rejected".
///
/// # Errors
///
/// Returns an error if a metric cannot be created or the registry
/// already carries one of the probe metric names.
pub fn record_probe(registry: &Registry, outcome: &ProbeOutcome) -> Result<(), prometheus::Error> {
    let success = IntGauge::with_opts(opts!(
        "tlspulse_probe_success",
        "1 if the probe succeeded, 0 otherwise"
    ))?;
    success.set(i64::from(outcome.is_success()));
    registry.register(Box::new(success))?;

    let Some(facts) = &outcome.facts else {
        return Ok(());
    };

    if let Some(leaf) = facts.leaf() {
        let not_after = IntGauge::with_opts(opts!(
            "tlspulse_cert_not_after_timestamp_seconds",
            "Leaf certificate notAfter date, Unix seconds"
        ))?;
        not_after.set(leaf.not_after);
        registry.register(Box::new(not_after))?;

        let not_before = IntGauge::with_opts(opts!(
            "tlspulse_cert_not_before_timestamp_seconds",
            "Leaf certificate notBefore date, Unix seconds"
        ))?;
        not_before.set(leaf.not_before);
        registry.register(Box::new(not_before))?;
    }

    let verified = IntGauge::with_opts(opts!(
        "tlspulse_cert_chain_verified",
        "1 if the presented chain validated against the trust source"
    ))?;
    verified.set(i64::from(facts.verified));
    registry.register(Box::new(verified))?;

    let info = IntGaugeVec::new(
        Opts::new(
            "tlspulse_cert_info",
            "Per-certificate chain facts (value is always 1)",
        ),
        &["subject", "issuer", "serial"],
    )?;
    for cert in &facts.chain {
        info.with_label_values(&[
            cert.subject.as_str(),
            cert.issuer.as_str(),
            cert.serial.as_str(),
        ])
        .set(1);
    }
    registry.register(Box::new(info))?;

    Ok(())
}

/// Encode a registry's metrics in the Prometheus text format
///
/// # Errors
///
/// Returns an error if metrics encoding fails
pub fn encode_registry(registry: &Registry) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| format!("could not encode metrics: {e}"))?;

    Ok(buffer)
}

/// Encode and return the process-level metrics for HTTP export
///
/// # Errors
///
/// Returns an error if metrics encoding fails
pub fn encode_metrics() -> Result<Vec<u8>, String> {
    encode_registry(&REGISTRY)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::{
        probe::error::{ProbeError, VerifyFailure},
        tls::{CertificateFacts, ChainFacts},
    };

    fn sample_facts(verified: bool) -> ChainFacts {
        ChainFacts {
            chain: vec![
                CertificateFacts {
                    subject: "CN=localhost".to_string(),
                    common_name: Some("localhost".to_string()),
                    issuer: "CN=test CA".to_string(),
                    serial: "01:02:03".to_string(),
                    not_before: 1_700_000_000,
                    not_after: 1_900_000_000,
                    dns_names: vec!["localhost".to_string()],
                    ..CertificateFacts::default()
                },
                CertificateFacts {
                    subject: "CN=test CA".to_string(),
                    issuer: "CN=test CA".to_string(),
                    serial: "0a:0b".to_string(),
                    not_before: 1_600_000_000,
                    not_after: 2_000_000_000,
                    ..CertificateFacts::default()
                },
            ],
            verified,
        }
    }

    #[test]
    fn test_record_probe_success() {
        let registry = Registry::new();
        let outcome = ProbeOutcome {
            facts: Some(sample_facts(true)),
            error: None,
        };

        record_probe(&registry, &outcome).unwrap();

        let output = String::from_utf8(encode_registry(&registry).unwrap()).unwrap();
        assert!(output.contains("tlspulse_probe_success 1"));
        assert!(output.contains("tlspulse_cert_not_after_timestamp_seconds 1900000000"));
        assert!(output.contains("tlspulse_cert_not_before_timestamp_seconds 1700000000"));
        assert!(output.contains("tlspulse_cert_chain_verified 1"));
        assert!(output.contains("subject=\"CN=localhost\""));
        assert!(output.contains("subject=\"CN=test CA\""));
    }

    #[test]
    fn test_record_probe_failure_without_facts() {
        let registry = Registry::new();
        let outcome = ProbeOutcome {
            facts: None,
            error: Some(ProbeError::InvalidTarget("nope".to_string())),
        };

        record_probe(&registry, &outcome).unwrap();

        let output = String::from_utf8(encode_registry(&registry).unwrap()).unwrap();
        assert!(output.contains("tlspulse_probe_success 0"));
        assert!(!output.contains("tlspulse_cert_not_after_timestamp_seconds"));
        assert!(!output.contains("tlspulse_cert_chain_verified"));
    }

    #[test]
    fn test_record_probe_rejected_cert_keeps_facts() {
        let registry = Registry::new();
        let outcome = ProbeOutcome {
            facts: Some(sample_facts(false)),
            error: Some(ProbeError::Verification(VerifyFailure::Expired)),
        };

        record_probe(&registry, &outcome).unwrap();

        let output = String::from_utf8(encode_registry(&registry).unwrap()).unwrap();
        assert!(output.contains("tlspulse_probe_success 0"));
        // the rejected certificate is still fully reported
        assert!(output.contains("tlspulse_cert_not_after_timestamp_seconds 1900000000"));
        assert!(output.contains("tlspulse_cert_chain_verified 0"));
    }

    #[test]
    fn test_record_probe_rejects_reused_registry() {
        let registry = Registry::new();
        let outcome = ProbeOutcome::default();

        record_probe(&registry, &outcome).unwrap();
        assert!(record_probe(&registry, &outcome).is_err());
    }

    #[test]
    fn test_process_metrics() {
        PROBES_TOTAL.with_label_values(&["success"]).inc();
        PROBES_TOTAL.with_label_values(&["expired"]).inc();
        PROBE_DURATION.observe(0.05);

        let output = String::from_utf8(encode_metrics().unwrap()).unwrap();
        assert!(output.contains("tlspulse_probes_total"));
        assert!(output.contains("tlspulse_probe_duration_seconds"));
    }
}
