//! Application state for the API server.

use std::sync::Arc;
use std::time::Duration;

use quill_coordinator::{QuillConfig, WriterApp};

/// Shared application state for the API server.
pub struct AppState {
    /// Session factory shared by every request
    pub app: Arc<WriterApp>,

    /// Deadline for one streamed session
    pub session_timeout: Option<Duration>,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(app: WriterApp) -> Self {
        let session_timeout = app
            .orchestration()
            .session_timeout_secs
            .map(Duration::from_secs);
        Self {
            app: Arc::new(app),
            session_timeout,
            start_time: std::time::Instant::now(),
        }
    }

    /// Build the writer app from configuration.
    pub async fn from_config(config: &QuillConfig) -> anyhow::Result<Self> {
        Ok(Self::new(WriterApp::from_config(config).await?))
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
