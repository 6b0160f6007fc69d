use crate::{
    cli::actions::Action,
    probe::{Module, StartTls, TcpConfig},
    tls::TlsConfig,
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::{net::IpAddr, path::PathBuf, time::Duration};

/// Build the probe module from the TLS and STARTTLS flags
fn extract_module(matches: &ArgMatches) -> Result<Module> {
    let starttls = matches
        .get_one::<String>("starttls")
        .map(|s| s.parse::<StartTls>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?
        .unwrap_or_default();

    let tls = TlsConfig {
        ca_file: matches.get_one::<String>("tls-ca").map(PathBuf::from),
        server_name: matches.get_one::<String>("tls-server-name").cloned(),
        insecure_skip_verify: matches.get_flag("insecure-skip-verify"),
        cert_file: matches.get_one::<String>("tls-cert").map(PathBuf::from),
        key_file: matches.get_one::<String>("tls-key").map(PathBuf::from),
    };

    Ok(Module {
        tcp: TcpConfig { starttls },
        tls,
    })
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if the listen address is invalid or the STARTTLS
/// protocol is unknown
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    // Extract port with default
    let port = matches.get_one::<u16>("port").copied().unwrap_or(9219);

    // Extract probe timeout with default
    let timeout = matches.get_one::<u64>("timeout").copied().unwrap_or(10);

    let module = extract_module(matches)?;

    Ok(Action::Serve {
        listen,
        port,
        timeout: Duration::from_secs(timeout),
        module,
    })
}
