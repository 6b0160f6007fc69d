#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::*;
use prometheus::Registry;
use tlspulse::{
    metrics::encode_registry,
    probe::{ProbeError, Stage, StartTls, probe_tcp},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    time::{Duration, Instant},
};

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

async fn probe_starttls(proto: StartTls) {
    let addr = spawn_starttls_tls_server(proto, "localhost.pem", "localhost.key").await;
    let target = format!("localhost:{}", addr.port());

    let mut module = ca_module();
    module.tcp.starttls = proto;

    let registry = Registry::new();
    probe_tcp(deadline(), &target, &module, &registry)
        .await
        .unwrap();

    let output = String::from_utf8(encode_registry(&registry).unwrap()).unwrap();
    assert_eq!(metric_value(&output, "tlspulse_probe_success"), Some(1.0));
    assert_eq!(
        metric_value(&output, "tlspulse_cert_chain_verified"),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_probe_smtp_starttls() {
    probe_starttls(StartTls::Smtp).await;
}

#[tokio::test]
async fn test_probe_ftp_starttls() {
    probe_starttls(StartTls::Ftp).await;
}

#[tokio::test]
async fn test_probe_imap_starttls() {
    probe_starttls(StartTls::Imap).await;
}

#[tokio::test]
async fn test_starttls_refusal_skips_handshake() {
    // an SMTP peer that answers the STARTTLS command with a failure
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let mut lines = BufReader::new(stream);
            lines.get_mut().write_all(b"220 mail.test\r\n").await.unwrap();
            let mut line = String::new();
            lines.read_line(&mut line).await.unwrap();
            lines.get_mut().write_all(b"250 mail.test\r\n").await.unwrap();
            line.clear();
            lines.read_line(&mut line).await.unwrap();
            assert_eq!(line, "STARTTLS\r\n");
            lines
                .get_mut()
                .write_all(b"454 TLS not available due to temporary reason\r\n")
                .await
                .unwrap();
        }
    });

    let mut module = ca_module();
    module.tcp.starttls = StartTls::Smtp;

    let registry = Registry::new();
    let result = probe_tcp(deadline(), &addr.to_string(), &module, &registry).await;

    assert!(matches!(
        result.unwrap_err(),
        ProbeError::Negotiation {
            protocol: StartTls::Smtp,
            step: "STARTTLS",
            ..
        }
    ));

    // no TLS handshake was attempted, so no certificate facts exist
    let output = String::from_utf8(encode_registry(&registry).unwrap()).unwrap();
    assert_eq!(metric_value(&output, "tlspulse_probe_success"), Some(0.0));
    assert!(!output.contains("tlspulse_cert_not_after_timestamp_seconds"));
    assert!(!output.contains("tlspulse_cert_chain_verified"));
}

#[tokio::test]
async fn test_starttls_wrong_protocol_greeting() {
    // probing an SMTP-style peer with the IMAP grammar fails at the greeting
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(b"220 mail.test ESMTP ready\r\n").await;
        }
    });

    let mut module = ca_module();
    module.tcp.starttls = StartTls::Imap;

    let registry = Registry::new();
    let result = probe_tcp(deadline(), &addr.to_string(), &module, &registry).await;

    assert!(matches!(
        result.unwrap_err(),
        ProbeError::Negotiation {
            protocol: StartTls::Imap,
            step: "greeting",
            ..
        }
    ));
}

#[tokio::test]
async fn test_starttls_negotiation_deadline() {
    // a peer that accepts the connection and then goes silent
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        }
    });

    let mut module = ca_module();
    module.tcp.starttls = StartTls::Smtp;

    let registry = Registry::new();
    let started = Instant::now();
    let short_deadline = Instant::now() + Duration::from_millis(300);
    let result = probe_tcp(short_deadline, &addr.to_string(), &module, &registry).await;

    assert!(matches!(
        result.unwrap_err(),
        ProbeError::DeadlineExceeded {
            stage: Stage::Negotiation
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}
