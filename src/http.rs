use crate::collectors::{CollectError, Collector};
use crate::metrics::Metrics;
use crate::state::{format_metric, unix_seconds, ProcessInfo, Snapshot};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

pub const DEFAULT_HEALTHZ_PATH: &str = "/healthz";

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub collector: Arc<Collector>,
    pub process: Arc<ProcessInfo>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub snapshot: Snapshot,
    pub failed: Vec<&'static str>,
}

pub fn build_router(healthz_path: &str, state: HttpAppState) -> Router {
    Router::new()
        .route(healthz_path, get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// Failed metrics are logged, listed in `errors` and reported as `0.00`;
// they never stop the remaining collectors.
pub fn build_report(collector: &Collector, process: &ProcessInfo, now: SystemTime) -> Report {
    let mut errors = Vec::new();
    let mut failed = Vec::new();

    let cpu = take("cpu", collector.cpu_usage(), &mut errors, &mut failed);
    let memory = take("memory", collector.memory_usage(), &mut errors, &mut failed);
    let disk = take("disk", collector.disk_usage(), &mut errors, &mut failed);
    let (load1, load5, load15) =
        take("load", collector.load_averages(), &mut errors, &mut failed);

    let snapshot = Snapshot {
        time: unix_seconds(now),
        status: 0,
        version: process.version().to_string(),
        uptime: format_metric(process.uptime_minutes(now)),
        cpu: format_metric(cpu),
        memory: format_metric(memory),
        disk: format_metric(disk),
        load1: format_metric(load1),
        load5: format_metric(load5),
        load15: format_metric(load15),
        errors,
    };

    Report { snapshot, failed }
}

fn take<T: Default>(
    metric: &'static str,
    result: Result<T, CollectError>,
    errors: &mut Vec<String>,
    failed: &mut Vec<&'static str>,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!(target = metric, error = %err, "healthz metrics check failed");
            errors.push(format!("{metric}: {err}"));
            failed.push(metric);
            T::default()
        }
    }
}

async fn healthz(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_healthz_request();
    let collector = state.collector.clone();
    let process = state.process.clone();
    // procfs reads and statvfs can block on a stuck mount
    let report = match tokio::task::spawn_blocking(move || {
        build_report(&collector, &process, SystemTime::now())
    })
    .await
    {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "healthz collection task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("healthz collection failed: {err}"),
            )
                .into_response();
        }
    };
    for metric in &report.failed {
        state.metrics.inc_collect_error(metric);
    }

    let s = &report.snapshot;
    info!(
        uptime = %s.uptime,
        version = %s.version,
        cpu = %s.cpu,
        memory = %s.memory,
        disk = %s.disk,
        load1 = %s.load1,
        load5 = %s.load5,
        load15 = %s.load15,
        errors = s.errors.len(),
        "responding to healthz"
    );

    (StatusCode::OK, Json(report.snapshot)).into_response()
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.update_uptime(&state.process);
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}
