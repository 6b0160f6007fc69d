use crate::{
    metrics::{PROBE_DURATION, PROBES_TOTAL, encode_metrics, encode_registry},
    probe::{self, Module},
};
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::Instant};

/// One line of probe telemetry, printed as JSON per invocation
#[derive(Serialize, Debug)]
struct Pulse {
    time: String,
    target: String,
    success: bool,
    duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct AppState {
    module: Module,
    timeout: Duration,
}

/// Start the exporter service
///
/// # Errors
///
/// Returns an error if the service fails to start or bind to the port
pub async fn start(
    listen: Option<IpAddr>,
    port: u16,
    timeout: Duration,
    module: Module,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState { module, timeout });

    let app = Router::new()
        .route("/probe", get(probe_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            // Explicit address specified - bind to it
            let socket_addr = format!("{addr}:{port}");
            let listener = TcpListener::bind(&socket_addr).await?;
            (listener, socket_addr)
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("::0:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                // Fallback to IPv4 if IPv6 fails
                let socket_addr = format!("0.0.0.0:{port}");
                (TcpListener::bind(&socket_addr).await?, socket_addr)
            }
        }
    };

    println!(
        "{} - Listening on {}, probe timeout: {}s",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        bind_addr,
        timeout.as_secs()
    );

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[derive(Deserialize)]
struct ProbeParams {
    target: Option<String>,
}

async fn probe_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProbeParams>,
) -> impl IntoResponse {
    let Some(target) = params.target else {
        return (
            StatusCode::BAD_REQUEST,
            b"missing target parameter".to_vec(),
        );
    };

    // one registry per scrape, so each response carries exactly one
    // probe's values
    let registry = Registry::new();
    let deadline = Instant::now() + state.timeout;

    let started = Utc::now();
    let timer = PROBE_DURATION.start_timer();
    let result = probe::probe_tcp(deadline, &target, &state.module, &registry).await;
    timer.observe_duration();

    let classification = match &result {
        Ok(()) => "success",
        Err(err) => err.classification(),
    };
    PROBES_TOTAL.with_label_values(&[classification]).inc();

    let pulse = Pulse {
        time: started.to_rfc3339_opts(SecondsFormat::Millis, true),
        target,
        success: result.is_ok(),
        duration_ms: (Utc::now() - started).num_milliseconds(),
        error: result.err().map(|e| e.to_string()),
    };
    println!("{}", serde_json::to_string(&pulse).unwrap_or_default());

    // probe failure is conveyed by tlspulse_probe_success 0, not by the
    // HTTP status
    match encode_registry(&registry) {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            eprintln!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            eprintln!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}
