use super::error::{ProbeError, Stage};
use tokio::{
    net::TcpStream,
    time::{Instant, timeout_at},
};

/// Open a raw TCP connection to `target` (`host:port`), bounded by the
/// probe deadline.
///
/// # Errors
///
/// Returns `ProbeError::Dial` when the connection cannot be established
/// (refused, unreachable, DNS failure) and
/// `ProbeError::DeadlineExceeded` when `deadline` fires first. No
/// retries are performed.
pub async fn dial(target: &str, deadline: Instant) -> Result<TcpStream, ProbeError> {
    timeout_at(deadline, TcpStream::connect(target))
        .await
        .map_err(|_| ProbeError::DeadlineExceeded { stage: Stage::Dial })?
        .map_err(|source| ProbeError::Dial {
            target: target.to_string(),
            source,
        })
}
