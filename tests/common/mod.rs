#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rustls::ServerConfig;
use std::{io::Cursor, net::SocketAddr, path::PathBuf, sync::Arc};
use tlspulse::{
    probe::{Module, StartTls},
    tls::ensure_crypto_provider,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::TlsAcceptor;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/certs")
        .join(name)
}

/// Module trusting the test CA
pub fn ca_module() -> Module {
    let mut module = Module::default();
    module.tls.ca_file = Some(fixture("ca.pem"));
    module
}

pub fn acceptor(cert: &str, key: &str) -> TlsAcceptor {
    ensure_crypto_provider();

    let cert_data = std::fs::read(fixture(cert)).unwrap();
    let certs = rustls_pemfile::certs(&mut Cursor::new(cert_data))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let key_data = std::fs::read(fixture(key)).unwrap();
    let key = rustls_pemfile::private_key(&mut Cursor::new(key_data))
        .unwrap()
        .unwrap();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

/// Serve exactly one TLS connection with the given identity, holding it
/// open until the client hangs up.
pub async fn spawn_tls_server(cert: &str, key: &str) -> SocketAddr {
    spawn_starttls_tls_server(StartTls::None, cert, key).await
}

/// Serve exactly one connection: run the plaintext STARTTLS dialogue for
/// `proto`, then complete the TLS handshake with the given identity.
pub async fn spawn_starttls_tls_server(proto: StartTls, cert: &str, key: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = acceptor(cert, key);

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let stream = match proto {
                StartTls::None => stream,
                StartTls::Smtp => smtp_dialogue(stream).await,
                StartTls::Ftp => ftp_dialogue(stream).await,
                StartTls::Imap => imap_dialogue(stream).await,
            };

            if let Ok(mut tls) = acceptor.accept(stream).await {
                let mut buf = [0u8; 1];
                let _ = tls.read(&mut buf).await;
            }
        }
    });

    addr
}

async fn expect_command(lines: &mut BufReader<TcpStream>, want: &str) {
    let mut line = String::new();
    lines.read_line(&mut line).await.unwrap();
    assert_eq!(line, format!("{want}\r\n"));
}

pub async fn smtp_dialogue(stream: TcpStream) -> TcpStream {
    let mut lines = BufReader::new(stream);
    lines
        .get_mut()
        .write_all(b"220 mail.test ESMTP ready\r\n")
        .await
        .unwrap();
    expect_command(&mut lines, "EHLO tlspulse").await;
    lines
        .get_mut()
        .write_all(b"250-mail.test\r\n250-PIPELINING\r\n250 STARTTLS\r\n")
        .await
        .unwrap();
    expect_command(&mut lines, "STARTTLS").await;
    lines
        .get_mut()
        .write_all(b"220 2.0.0 Ready to start TLS\r\n")
        .await
        .unwrap();
    lines.into_inner()
}

pub async fn ftp_dialogue(stream: TcpStream) -> TcpStream {
    let mut lines = BufReader::new(stream);
    lines
        .get_mut()
        .write_all(b"220 FTP server ready\r\n")
        .await
        .unwrap();
    expect_command(&mut lines, "AUTH TLS").await;
    lines
        .get_mut()
        .write_all(b"234 AUTH TLS successful\r\n")
        .await
        .unwrap();
    lines.into_inner()
}

pub async fn imap_dialogue(stream: TcpStream) -> TcpStream {
    let mut lines = BufReader::new(stream);
    lines
        .get_mut()
        .write_all(b"* OK IMAP4rev1 server ready\r\n")
        .await
        .unwrap();
    expect_command(&mut lines, ". STARTTLS").await;
    lines
        .get_mut()
        .write_all(b". OK Begin TLS negotiation now\r\n")
        .await
        .unwrap();
    lines.into_inner()
}

/// Value of a plain (unlabelled) gauge in a text exposition
pub fn metric_value(exposition: &str, name: &str) -> Option<f64> {
    exposition
        .lines()
        .find(|line| line.starts_with(name) && !line.starts_with('#'))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
