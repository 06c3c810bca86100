//! HTTP trigger.
//!
//! A single catch-all handler: any request, on any path and method, runs one
//! chained pipeline and answers `200 OK` or `500` with the error text. The
//! request itself is never inspected. Scheduled invocations (Cloud Scheduler,
//! cron + curl) are the intended callers.

use crate::error::Result;
use crate::pipeline::Pipeline;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Router whose fallback runs one chained pipeline per request.
pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
    Router::new().fallback(trigger_handler).with_state(pipeline)
}

async fn trigger_handler(State(pipeline): State<Arc<Pipeline>>) -> (StatusCode, String) {
    match pipeline.run_chained().await {
        Ok(report) => {
            info!(
                run_ts = %report.run_ts,
                raw = report.raw_count,
                filtered = report.filtered_count,
                "Triggered run succeeded"
            );
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) => {
            error!(error = %e, "Pipeline error");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve the trigger on `addr` until Ctrl-C.
pub async fn serve(pipeline: Arc<Pipeline>, addr: &str) -> Result<()> {
    let app = build_router(pipeline);
    let listener = TcpListener::bind(addr).await?;
    info!("Pipeline trigger listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("HTTP server shutting down...");
        })
        .await?;
    Ok(())
}
