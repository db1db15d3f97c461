use axum::async_trait;

use crate::domain::Point;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Destination for the points of one request.
///
/// A single `write` call is one write session: every point is enqueued in
/// order and the session is flushed before the future resolves.
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write(&self, points: Vec<Point>) -> Result<(), SinkError>;
}
