use std::fmt;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// One served request, as published to log subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLog {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency: Duration,
}

impl fmt::Display for RequestLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} │ {:>7} │ {} {}", self.status, format_latency(self.latency), self.method, self.path)
    }
}

/// Short human latency: `850µs`, `12ms`, `1.20s`.
pub fn format_latency(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1_000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", micros / 1_000)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

pub(crate) async fn record(State(tx): State<broadcast::Sender<RequestLog>>, req: Request, next: Next) -> Response {
    let t0 = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path_and_query().map(|p| p.as_str().to_string()).unwrap_or_else(|| req.uri().path().to_string());

    let resp = next.run(req).await;

    let latency = t0.elapsed();
    let status = resp.status().as_u16();
    metrics::counter!("http_requests_total", 1u64, "method" => method.clone(), "status" => status.to_string());
    metrics::histogram!("http_request_ms", latency.as_secs_f64() * 1000.0);
    debug!(%method, %path, status, latency_us = latency.as_micros() as u64, "http: served");
    // no subscribers is fine
    let _ = tx.send(RequestLog { method, path, status, latency });
    resp
}
