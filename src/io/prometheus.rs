//! Prometheus metrics HTTP endpoint
//!
//! Exposes sync metrics in Prometheus text format at /metrics and the
//! scheduler's state at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{
    Metrics, MetricsSummary, METRICS_DURATION_BOUNDS_MS, METRICS_NUM_BUCKETS,
};
use crate::services::scheduler::SchedulerState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; METRICS_NUM_BUCKETS - 1],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_build_info(&mut output, site_id);
    write_cycle_metrics(&mut output, site_id, &summary);
    write_device_metrics(&mut output, site_id, &summary);
    write_update_metrics(&mut output, site_id, &summary);

    output
}

fn write_build_info(output: &mut String, site: &str) {
    let _ = writeln!(output, "# HELP location_sync_build_info Build metadata");
    let _ = writeln!(output, "# TYPE location_sync_build_info gauge");
    let _ = writeln!(
        output,
        "location_sync_build_info{{site=\"{site}\",version=\"{}\",git_hash=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
    );
}

fn write_cycle_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "location_sync_cycles_total",
        "Total sync cycles run",
        MetricType::Counter,
        site,
        summary.cycles_total,
    );
    write_metric(
        output,
        "location_sync_cycles_aborted_total",
        "Sync cycles aborted by a fatal error",
        MetricType::Counter,
        site,
        summary.cycles_aborted,
    );
    write_metric(
        output,
        "location_sync_consecutive_failed_cycles",
        "Aborted cycles since the last successful one",
        MetricType::Gauge,
        site,
        summary.consecutive_failed_cycles,
    );

    write_histogram(
        output,
        "location_sync_cycle_duration_ms",
        "Sync cycle duration in milliseconds",
        site,
        &summary.cycle_duration_buckets,
        &METRICS_DURATION_BOUNDS_MS,
        summary.cycle_duration_sum_ms,
    );
    write_metric(
        output,
        "location_sync_cycle_duration_p99_ms",
        "99th percentile cycle duration",
        MetricType::Gauge,
        site,
        summary.cycle_duration_p99_ms,
    );
    write_metric(
        output,
        "location_sync_last_cycle_finished_seconds",
        "Unix time the last cycle finished",
        MetricType::Gauge,
        site,
        summary.last_cycle_finished_unix,
    );
}

fn write_device_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "location_sync_mappings_resolved_total",
        "Valid device mappings resolved",
        MetricType::Counter,
        site,
        summary.mappings_resolved_total,
    );
    write_metric(
        output,
        "location_sync_records_rejected_total",
        "Mapping records dropped as missing or placeholder",
        MetricType::Counter,
        site,
        summary.records_rejected_total,
    );
    write_metric(
        output,
        "location_sync_devices_checked_total",
        "Devices compared across both platforms",
        MetricType::Counter,
        site,
        summary.devices_checked_total,
    );
    write_metric(
        output,
        "location_sync_last_cycle_devices_checked",
        "Devices compared in the last completed cycle",
        MetricType::Gauge,
        site,
        summary.last_cycle_devices_checked,
    );
    write_metric(
        output,
        "location_sync_unmatched_total",
        "Mapped devices missing from one of the platforms",
        MetricType::Counter,
        site,
        summary.unmatched_total,
    );
    write_metric(
        output,
        "location_sync_secondary_fetch_failures_total",
        "Per-device secondary location reads that failed",
        MetricType::Counter,
        site,
        summary.secondary_fetch_failures_total,
    );
    write_metric(
        output,
        "location_sync_discrepancies_total",
        "Devices found outside tolerance",
        MetricType::Counter,
        site,
        summary.discrepancies_total,
    );
}

fn write_update_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "location_sync_updates_succeeded_total",
        "Corrections accepted by the secondary platform",
        MetricType::Counter,
        site,
        summary.updates_succeeded_total,
    );
    write_metric(
        output,
        "location_sync_updates_failed_total",
        "Corrections that failed",
        MetricType::Counter,
        site,
        summary.updates_failed_total,
    );
    write_metric(
        output,
        "location_sync_updates_skipped_total",
        "Corrections skipped in dry-run mode",
        MetricType::Counter,
        site,
        summary.updates_skipped_total,
    );
}

/// Health document: scheduler state plus failure streak
fn format_health(metrics: &Metrics, state: SchedulerState) -> String {
    let consecutive = metrics.consecutive_failed_cycles();
    let status = if consecutive == 0 { "ok" } else { "degraded" };
    serde_json::json!({
        "status": status,
        "state": state.as_str(),
        "cycles_total": metrics.cycles_total(),
        "consecutive_failed_cycles": consecutive,
        "last_error": metrics.last_cycle_error(),
    })
    .to_string()
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
    state_rx: watch::Receiver<SchedulerState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let reply = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => response(
            StatusCode::OK,
            PROMETHEUS_CONTENT_TYPE,
            format_prometheus_metrics(&metrics, &site_id),
        ),
        (&Method::GET, "/health") => {
            let state = *state_rx.borrow();
            response(StatusCode::OK, "application/json", format_health(&metrics, state))
        }
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(reply)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    state_rx: watch::Receiver<SchedulerState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();
                        let state_rx = state_rx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), site_id.clone(), state_rx.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
