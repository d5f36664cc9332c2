use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::MemoryEngine;

pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// TTL Worker - background task that removes expired documents
/// from the collections of an in-memory engine
#[derive(Debug)]
pub struct TtlWorker {
    engine: Arc<MemoryEngine>,
    interval_secs: u64,
}

impl TtlWorker {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs.max(1);
        self
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Run the cleanup loop until the task is dropped or aborted
    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting TTL Worker (interval: {}s)", self.interval_secs);
        loop {
            tokio::time::sleep(Duration::from_secs(self.interval_secs)).await;
            self.sweep().await;
        }
    }

    /// Purge once, returning how many documents were deleted
    pub async fn sweep(&self) -> usize {
        if !self.engine.has_ttl_collections() {
            return 0;
        }

        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || engine.purge_expired(Utc::now())).await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!("TTL cleanup: deleted {} expired documents", count);
                }
                count
            }
            Err(e) => {
                tracing::warn!("TTL cleanup task failed: {}", e);
                0
            }
        }
    }
}
