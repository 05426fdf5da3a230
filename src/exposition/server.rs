//! Scrape endpoint: every GET runs one collection pass and answers with the rendered text.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::{encode, ExpositionError, CONTENT_TYPE};
use crate::collectors::{CollectError, ProcessMetricsCollector, ProcessSource};

/// Failure of a single scrape. Answered with 500; the server keeps serving.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Exposition(#[from] ExpositionError),
    #[error("collection task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        error!(error = %self, "scrape failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("scrape failed: {self}\n"),
        )
            .into_response()
    }
}

pub fn router<S>(collector: Arc<ProcessMetricsCollector<S>>, metrics_path: &str) -> Router
where
    S: ProcessSource + 'static,
{
    Router::new()
        .route(metrics_path, get(metrics_handler::<S>))
        .with_state(collector)
}

async fn metrics_handler<S>(
    State(collector): State<Arc<ProcessMetricsCollector<S>>>,
) -> Result<Response, ScrapeError>
where
    S: ProcessSource + 'static,
{
    let descriptors = collector.describe();
    // Process enumeration is blocking filesystem work.
    let observations = tokio::task::spawn_blocking(move || collector.collect()).await??;
    let body = encode(descriptors, &observations)?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}

/// Serve until Ctrl-C, then drain in-flight scrapes.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
