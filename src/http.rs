use std::time::Duration;
use tracing::Span;

use axum::extract::DefaultBodyLimit;
use axum::http::{self, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_prometheus::PrometheusMetricLayer;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::ingest::handler;
use crate::metrics;

/// Station API routes, without the metrics endpoint.
pub fn router(state: AppState) -> Router {
    let body_limit = state.cfg.ingest.max_payload_bytes;
    Router::new()
        .route("/api/station", post(handler::station))
        .route("/api/health", get(handler::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serves until a shutdown signal, then waits for in-flight sink writes.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let (prom_layer, prom_handle) = PrometheusMetricLayer::pair();
    let cfg = state.cfg.clone();
    let writes = state.writes.clone();

    let app = router(state)
        .route(
            "/metrics",
            get(move || async move {
                let mut body = prom_handle.render();
                body.push_str(&metrics::render());
                body
            }),
        )
        .layer(prom_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &http::Request<_>| {
                    tracing::info_span!(
                      "http_request",
                      method = %req.method(),
                      path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                      status = %res.status(),
                      latency_ms = %latency.as_millis(),
                      "response"
                    )
                })
                .on_failure(|error: _, latency: Duration, _span: &Span| {
                    tracing::warn!(%error, latency_ms = %latency.as_millis(), "request_failed");
                }),
        );

    let listener: TcpListener = TcpListener::bind((cfg.http.host.as_str(), cfg.http.port))
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind {}: {e}", cfg.http.bind()))?;
    let local = listener.local_addr()?;
    println!("listening on {local}");
    tracing::info!(addr = %local, "station gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    writes.close();
    let drain = Duration::from_millis(cfg.ingest.shutdown_drain_ms);
    if tokio::time::timeout(drain, writes.wait()).await.is_err() {
        tracing::warn!(
            pending = writes.len(),
            drain_ms = cfg.ingest.shutdown_drain_ms,
            "gave up waiting for influx writes"
        );
    }
    tracing::info!("station gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
