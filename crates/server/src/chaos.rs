use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use imock_api::ApiError;
use tracing::debug;

use crate::config::ChaosConfig;
use crate::routes::HttpError;

/// Delay every request and fail some before they reach a handler.
pub(crate) async fn inject(State(cfg): State<ChaosConfig>, req: Request, next: Next) -> Response {
    let roll = cfg.roll(&mut rand::rng());
    metrics::histogram!("chaos_delay_ms", roll.delay.as_millis() as f64);
    tokio::time::sleep(roll.delay).await;

    if let Some(status) = roll.fault {
        metrics::counter!("chaos_injected_total", 1u64, "status" => status.to_string());
        debug!(status, path = %req.uri().path(), "chaos: injected failure");
        return HttpError::from(ApiError::ChaosInjected { status }).into_response();
    }
    next.run(req).await
}
