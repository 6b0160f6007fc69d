//! Plaintext STARTTLS negotiation, one state machine per protocol.
//!
//! Each negotiator speaks its protocol's line-oriented upgrade grammar
//! over the raw connection and hands the same, still-plaintext stream
//! back once the peer has signalled readiness for TLS.

use super::error::{ProbeError, Stage};
use std::{fmt, str::FromStr};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    time::{Instant, timeout_at},
};

/// Hostname sent in the SMTP EHLO command. The peer only needs a
/// syntactically valid name to answer with its capability list.
const EHLO_HOSTNAME: &str = "tlspulse";

/// STARTTLS protocol selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartTls {
    /// No plaintext negotiation, TLS from the first byte
    #[default]
    None,
    Smtp,
    Ftp,
    Imap,
}

impl FromStr for StartTls {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "smtp" => Ok(Self::Smtp),
            "ftp" => Ok(Self::Ftp),
            "imap" => Ok(Self::Imap),
            _ => Err(format!("Invalid STARTTLS protocol: {s}")),
        }
    }
}

impl fmt::Display for StartTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Smtp => "smtp",
            Self::Ftp => "ftp",
            Self::Imap => "imap",
        })
    }
}

/// Negotiate a STARTTLS upgrade on `stream`.
///
/// Returns the same stream, still plaintext, positioned right where the
/// TLS handshake must begin. For `StartTls::None` the stream passes
/// through untouched.
///
/// # Errors
///
/// Returns `ProbeError::Negotiation` if the peer answers any step with
/// an unexpected status or closes the connection mid-exchange, and
/// `ProbeError::DeadlineExceeded` if `deadline` fires during a read or
/// write.
pub async fn negotiate<S>(
    stream: S,
    protocol: StartTls,
    deadline: Instant,
) -> Result<S, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session {
        lines: BufReader::new(stream),
        deadline,
        protocol,
    };

    match protocol {
        StartTls::None => {}
        StartTls::Smtp => smtp(&mut session).await?,
        StartTls::Ftp => ftp(&mut session).await?,
        StartTls::Imap => imap(&mut session).await?,
    }

    Ok(session.lines.into_inner())
}

/// Transient per-negotiation state: the raw stream behind a line
/// buffer. Dropped as soon as the exchange ends.
struct Session<S> {
    lines: BufReader<S>,
    deadline: Instant,
    protocol: StartTls,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn send(&mut self, step: &'static str, command: &str) -> Result<(), ProbeError> {
        let data = format!("{command}\r\n");
        let written =
            timeout_at(self.deadline, self.lines.get_mut().write_all(data.as_bytes())).await;

        match written {
            Err(_elapsed) => Err(ProbeError::DeadlineExceeded {
                stage: Stage::Negotiation,
            }),
            Ok(Err(e)) => Err(self.fail(step, format!("write failed: {e}"))),
            Ok(Ok(())) => Ok(()),
        }
    }

    async fn read_line(&mut self, step: &'static str) -> Result<String, ProbeError> {
        let mut line = String::new();
        let read = timeout_at(self.deadline, self.lines.read_line(&mut line)).await;

        match read {
            Err(_elapsed) => Err(ProbeError::DeadlineExceeded {
                stage: Stage::Negotiation,
            }),
            Ok(Err(e)) => Err(self.fail(step, format!("read failed: {e}"))),
            // EOF mid-exchange
            Ok(Ok(0)) => Err(self.fail(step, "connection closed by peer".to_string())),
            Ok(Ok(_)) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    fn fail(&self, step: &'static str, reason: String) -> ProbeError {
        ProbeError::Negotiation {
            protocol: self.protocol,
            step,
            reason,
        }
    }
}

/// SMTP upgrade (RFC 3207): `220` greeting, `EHLO`, multi-line `250`
/// capability reply, `STARTTLS`, `220` go-ahead.
async fn smtp<S>(s: &mut Session<S>) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = s.read_line("greeting").await?;
    if !greeting.starts_with("220") {
        return Err(s.fail("greeting", format!("expected 220, got {greeting:?}")));
    }

    s.send("EHLO", &format!("EHLO {EHLO_HOSTNAME}")).await?;
    loop {
        let line = s.read_line("EHLO").await?;
        if !line.starts_with("250") {
            return Err(s.fail("EHLO", format!("expected 250, got {line:?}")));
        }
        // "250-" marks a continuation line, "250 " (or bare "250") the last
        if !line.starts_with("250-") {
            break;
        }
    }

    s.send("STARTTLS", "STARTTLS").await?;
    let reply = s.read_line("STARTTLS").await?;
    if !reply.starts_with("220") {
        return Err(s.fail("STARTTLS", format!("expected 220, got {reply:?}")));
    }

    Ok(())
}

/// FTP upgrade (RFC 4217): `220` greeting, `AUTH TLS`, `234` go-ahead.
async fn ftp<S>(s: &mut Session<S>) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = s.read_line("greeting").await?;
    if !greeting.starts_with("220") {
        return Err(s.fail("greeting", format!("expected 220, got {greeting:?}")));
    }

    s.send("AUTH TLS", "AUTH TLS").await?;
    let reply = s.read_line("AUTH TLS").await?;
    if !reply.starts_with("234") {
        return Err(s.fail("AUTH TLS", format!("expected 234, got {reply:?}")));
    }

    Ok(())
}

/// IMAP upgrade (RFC 2595): untagged `* OK` greeting, tagged
/// `STARTTLS`, tagged `OK` go-ahead.
async fn imap<S>(s: &mut Session<S>) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = s.read_line("greeting").await?;
    if !greeting.contains("* OK") {
        return Err(s.fail("greeting", format!("expected * OK, got {greeting:?}")));
    }

    s.send("STARTTLS", ". STARTTLS").await?;
    let reply = s.read_line("STARTTLS").await?;
    if !reply.starts_with(". OK") {
        return Err(s.fail("STARTTLS", format!("expected . OK, got {reply:?}")));
    }

    Ok(())
}
