use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::task::TaskTracker;

use crate::app::AppState;
use crate::domain::Point;
use crate::ingest::translate::{translate, TranslateError};
use crate::ingest::types::{HealthStatus, StationAck, StationPayload};
use crate::metrics;
use crate::sink::PointSink;

#[derive(Serialize, Debug)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<TranslateError> for ApiError {
    fn from(err: TranslateError) -> Self {
        Self {
            error: err.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

/// POST /api/station
pub async fn station(
    State(st): State<AppState>,
    Json(payload): Json<StationPayload>,
) -> Result<Json<StationAck>, ApiError> {
    let event = event_label(payload.event_id.as_ref());
    tracing::debug!(
        event_id = %event,
        device_id = %payload.device_id,
        readings = payload.tags.len(),
        "received station payload"
    );

    let points = translate(&payload)?;
    metrics::PAYLOADS_RECEIVED.inc();
    spawn_write(&st.writes, st.sink.clone(), points, event);

    Ok(Json(StationAck {
        event_id: payload.event_id,
    }))
}

/// GET /api/health
pub async fn health() -> Json<HealthStatus> {
    tracing::debug!("received health check request");
    Json(HealthStatus { status: "OK" })
}

/// Writes the points in a detached task; the outcome is only logged.
fn spawn_write(
    writes: &TaskTracker,
    sink: Arc<dyn PointSink>,
    points: Vec<Point>,
    event: String,
) {
    writes.spawn(async move {
        let count = points.len();
        match sink.write(points).await {
            Ok(()) => {
                metrics::POINTS_WRITTEN.inc_by(count as u64);
                tracing::debug!(event_id = %event, points = count, "wrote event to influx");
            }
            Err(e) => {
                metrics::SINK_FAILURES.inc();
                tracing::error!(event_id = %event, points = count, error = %e, "failed to write event to influx");
            }
        }
    });
}

fn event_label(event_id: Option<&serde_json::Value>) -> String {
    match event_id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}
