//! Sync progress tracking

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// Sync stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Listener not running, or waiting for the next tick
    Idle,
    /// Fetching blocks from the node
    Fetching,
    /// Applying block contents
    Processing,
    /// Undoing orphaned blocks after a reorg
    RollingBack,
    /// Cursor caught up with the tip
    Synced,
}

impl SyncStage {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Fetching => "Fetching Blocks",
            Self::Processing => "Processing Blocks",
            Self::RollingBack => "Rolling Back",
            Self::Synced => "Synced",
        }
    }
}

/// Sync progress shared between the listener and observers
#[derive(Debug, Clone)]
pub struct SyncProgress {
    inner: Arc<RwLock<ProgressInner>>,
}

#[derive(Debug, Clone)]
struct ProgressInner {
    current_height: Option<u64>,
    target_height: u64,
    start_height: u64,
    stage: SyncStage,
    start_time: Option<Instant>,
    blocks_per_second: f64,
    rollbacks: u64,
}

impl SyncProgress {
    /// Create new progress tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ProgressInner {
                current_height: None,
                target_height: 0,
                start_height: 0,
                stage: SyncStage::Idle,
                start_time: None,
                blocks_per_second: 0.0,
                rollbacks: 0,
            })),
        }
    }

    /// Start measuring throughput from the current height
    pub fn start(&self) {
        let mut inner = self.inner.write();
        inner.start_time = Some(Instant::now());
        inner.start_height = inner.current_height.map(|h| h + 1).unwrap_or(0);
        inner.blocks_per_second = 0.0;
    }

    /// Update current height
    pub fn set_current(&self, height: Option<u64>) {
        let mut inner = self.inner.write();
        inner.current_height = height;

        if let (Some(start), Some(current)) = (inner.start_time, height) {
            let elapsed = start.elapsed().as_secs_f64();
            let synced = (current + 1).saturating_sub(inner.start_height);
            if synced > 0 && elapsed > 0.0 {
                inner.blocks_per_second = synced as f64 / elapsed;
            }
        }
    }

    /// Set target height
    pub fn set_target(&self, height: u64) {
        self.inner.write().target_height = height;
    }

    /// Set stage
    pub fn set_stage(&self, stage: SyncStage) {
        self.inner.write().stage = stage;
    }

    /// Count a completed rollback
    pub fn record_rollback(&self) {
        self.inner.write().rollbacks += 1;
    }

    /// Get current height
    pub fn current_height(&self) -> Option<u64> {
        self.inner.read().current_height
    }

    /// Get target height
    pub fn target_height(&self) -> u64 {
        self.inner.read().target_height
    }

    /// Get current stage
    pub fn stage(&self) -> SyncStage {
        self.inner.read().stage
    }

    /// Get blocks per second
    pub fn blocks_per_second(&self) -> f64 {
        self.inner.read().blocks_per_second
    }

    /// Rollbacks since creation
    pub fn rollbacks(&self) -> u64 {
        self.inner.read().rollbacks
    }

    /// Get progress percentage
    pub fn percentage(&self) -> f64 {
        let inner = self.inner.read();
        let current = match inner.current_height {
            Some(h) => h,
            None => return 0.0,
        };
        if current >= inner.target_height {
            return 100.0;
        }
        if inner.target_height == 0 {
            return 0.0;
        }
        (current as f64 / inner.target_height as f64) * 100.0
    }

    /// One-line summary for logs and the harness
    pub fn summary(&self) -> String {
        let inner = self.inner.read();
        let current = inner
            .current_height
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}: {}/{} ({:.1} blocks/s)",
            inner.stage.name(),
            current,
            inner.target_height,
            inner.blocks_per_second
        )
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let progress = SyncProgress::new();
        assert_eq!(progress.percentage(), 0.0);

        progress.set_target(200);
        progress.set_current(Some(50));
        assert_eq!(progress.percentage(), 25.0);

        progress.set_current(Some(200));
        assert_eq!(progress.percentage(), 100.0);
    }

    #[test]
    fn test_summary() {
        let progress = SyncProgress::new();
        progress.set_stage(SyncStage::Fetching);
        progress.set_target(12);
        progress.set_current(Some(9));
        assert!(progress.summary().starts_with("Fetching Blocks: 9/12"));
    }
}
