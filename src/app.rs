use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::config::StationCfg;
use crate::sink::PointSink;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<StationCfg>,
    pub sink: Arc<dyn PointSink>,
    /// Detached sink writes, awaited on shutdown.
    pub writes: TaskTracker,
}

impl AppState {
    pub fn new(cfg: Arc<StationCfg>, sink: Arc<dyn PointSink>) -> Self {
        Self {
            cfg,
            sink,
            writes: TaskTracker::new(),
        }
    }
}
