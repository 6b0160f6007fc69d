use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("listen")
                .env("TLSPULSE_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("9219")
                .env("TLSPULSE_PORT")
                .help("listening port for /probe and /metrics")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("timeout")
                .default_value("10")
                .env("TLSPULSE_TIMEOUT")
                .help("per-probe deadline in seconds (dial, STARTTLS and TLS handshake)")
                .long("timeout")
                .short('t')
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("starttls")
                .env("TLSPULSE_STARTTLS")
                .help("negotiate a plaintext STARTTLS upgrade before the TLS handshake")
                .long_help(
                    "Negotiate a plaintext STARTTLS upgrade before the TLS handshake:\n\n\
                    - smtp: 220 greeting, EHLO, STARTTLS (RFC 3207)\n\
                    - ftp: 220 greeting, AUTH TLS (RFC 4217)\n\
                    - imap: * OK greeting, tagged STARTTLS (RFC 2595)\n\n\
                    When not set, TLS starts from the first byte.",
                )
                .long("starttls")
                .value_name("PROTOCOL")
                .value_parser(["smtp", "ftp", "imap"]),
        )
        .arg(
            Arg::new("tls-ca")
                .env("TLSPULSE_TLS_CA")
                .help("Path to CA bundle used to verify the probed certificate chain")
                .long("tls-ca")
                .long_help(
                    "Path to Certificate Authority (CA) bundle in PEM format.\n\
                    When not set, the WebPKI root store is used.\n\n\
                    Example: /etc/ssl/certs/ca-certificates.crt",
                )
                .value_name("PATH"),
        )
        .arg(
            Arg::new("tls-server-name")
                .env("TLSPULSE_TLS_SERVER_NAME")
                .help("Hostname to verify instead of the host portion of the target")
                .long("tls-server-name")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("insecure-skip-verify")
                .env("TLSPULSE_INSECURE_SKIP_VERIFY")
                .help("Accept any certificate without chain or hostname validation")
                .long_help(
                    "Accept any certificate without chain or hostname validation.\n\
                    Certificate facts are still extracted and exported, which makes\n\
                    this useful for inspecting expired or self-signed endpoints.",
                )
                .long("insecure-skip-verify")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tls-cert")
                .env("TLSPULSE_TLS_CERT")
                .help("Path to client certificate file for TLS client authentication")
                .long("tls-cert")
                .value_name("PATH")
                .requires("tls-key"),
        )
        .arg(
            Arg::new("tls-key")
                .env("TLSPULSE_TLS_KEY")
                .help("Path to client private key file for TLS client authentication")
                .long("tls-key")
                .value_name("PATH")
                .requires("tls-cert"),
        )
}
