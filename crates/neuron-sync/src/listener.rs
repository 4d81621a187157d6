//! Block listener: the polling loop that keeps the cursor at the chain tip

use crate::aggregator::BalanceAggregator;
use crate::node::NodeClient;
use crate::notifier::ChangeNotifier;
use crate::processor::BlockProcessor;
use crate::progress::{SyncProgress, SyncStage};
use crate::queue::{QueueState, SyncQueue};
use crate::store::SyncStores;
use crate::tip::ChainTipTracker;
use crate::{CancelToken, Error, Result, SyncConfig};
use neuron_core::{LockHash, LockUtils};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not polling
    Stopped,
    /// Inside `start()`
    Running,
}

/// Callback fired once when `stop()` has drained the queue
pub type DrainCallback = Box<dyn FnOnce() + Send>;

/// Polls the tip and drains `[cursor + 1, tip]` through a [`SyncQueue`]
pub struct BlockListener {
    processor: Arc<BlockProcessor>,
    tip: ChainTipTracker,
    config: SyncConfig,
    progress: SyncProgress,
    queue: Mutex<Arc<SyncQueue>>,
    state: Mutex<ListenerState>,
    stop: Mutex<CancelToken>,
    paused: AtomicBool,
    rollback_gate: tokio::sync::Mutex<()>,
}

impl BlockListener {
    /// Wire a listener to its node, stores and channels
    pub fn new(
        node: Arc<dyn NodeClient>,
        stores: SyncStores,
        notifier: ChangeNotifier,
        tip: ChainTipTracker,
        lock_utils: LockUtils,
        config: SyncConfig,
    ) -> Result<Self> {
        let aggregator = Arc::new(BalanceAggregator::new(
            stores.cells.clone(),
            stores.addresses.clone(),
            lock_utils,
            notifier,
        ));
        let processor = Arc::new(BlockProcessor::new(
            node,
            stores.cells,
            stores.sync_state,
            aggregator,
            &config,
        )?);

        let progress = SyncProgress::new();
        progress.set_current(processor.cursor());
        let queue = Arc::new(SyncQueue::new(processor.clone(), progress.clone(), &config));

        Ok(Self {
            processor,
            tip,
            config,
            progress,
            queue: Mutex::new(queue),
            state: Mutex::new(ListenerState::Stopped),
            stop: Mutex::new(CancelToken::new()),
            paused: AtomicBool::new(false),
            rollback_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// State of the active queue
    pub fn queue_state(&self) -> QueueState {
        self.queue.lock().state()
    }

    /// Shared progress
    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    /// Block processor
    pub fn processor(&self) -> &Arc<BlockProcessor> {
        &self.processor
    }

    /// Whether consumption is suspended
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Run the polling loop for `lock_hashes` until `stop()` or a fatal error
    ///
    /// Returns `Ok(())` after `stop()`. Fatal errors (decode failures,
    /// invariant violations, storage failures) halt the loop and are returned.
    pub async fn start(&self, lock_hashes: HashSet<LockHash>) -> Result<()> {
        let stop = {
            let mut state = self.state.lock();
            if *state == ListenerState::Running {
                warn!("Block listener already running");
                return Ok(());
            }
            *state = ListenerState::Running;
            let token = CancelToken::new();
            *self.stop.lock() = token.clone();
            token
        };

        info!(lock_hashes = lock_hashes.len(), cursor = ?self.processor.cursor(), "Block listener started");
        self.processor.set_lock_hashes(lock_hashes);
        self.progress.start();

        let result = self.run(&stop).await;

        *self.state.lock() = ListenerState::Stopped;
        self.progress.set_stage(SyncStage::Idle);
        result
    }

    async fn run(&self, stop: &CancelToken) -> Result<()> {
        let interval = self.config.poll_interval();

        loop {
            if stop.is_cancelled() {
                return Ok(());
            }

            match self.tick(stop).await {
                Ok(()) => {}
                Err(Error::Cancelled) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    warn!(cursor = ?self.processor.cursor(), "Sync tick failed, retrying next tick: {}", e);
                }
                Err(e) => {
                    error!(cursor = ?self.processor.cursor(), "Sync halted: {}", e);
                    return Err(e);
                }
            }

            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One pass: fill the queue from the cursor to the tip, then wait for it
    /// to drain or for the next interval, whichever comes first
    async fn tick(&self, stop: &CancelToken) -> Result<()> {
        let queue = self.active_queue(stop)?;

        if queue.state() == QueueState::Idle {
            if let Some(e) = queue.take_outcome() {
                return self.handle_outcome(e, stop).await;
            }

            let tip = match self.tip.latest() {
                Some(tip) => tip,
                None => {
                    debug!("No chain tip observed yet");
                    return Ok(());
                }
            };
            let start = self.processor.next_height();
            self.progress.set_target(tip);
            if start > tip {
                self.progress.set_stage(SyncStage::Synced);
                return Ok(());
            }
            if !queue.fill(start, tip) {
                return Ok(());
            }
            queue.process();
        }

        let drained = tokio::select! {
            _ = stop.cancelled() => return Err(Error::Cancelled),
            drained = queue.wait_drained() => drained,
            _ = tokio::time::sleep(self.config.poll_interval()) => return Ok(()),
        };

        match drained {
            Ok(()) => {
                if self.processor.next_height() > self.progress.target_height() {
                    self.progress.set_stage(SyncStage::Synced);
                }
                Ok(())
            }
            Err(e) => self.handle_outcome(e, stop).await,
        }
    }

    async fn handle_outcome(&self, e: Error, stop: &CancelToken) -> Result<()> {
        match e {
            Error::ReorgDetected { height } => self.handle_reorg(height, stop).await,
            other => Err(other),
        }
    }

    /// Roll back under the rollback gate; `stop()` waits for the gate, so a
    /// rollback either finishes before it returns or never writes
    async fn handle_reorg(&self, mismatch: u64, stop: &CancelToken) -> Result<()> {
        let _gate = self.rollback_gate.lock().await;
        if stop.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.progress.set_stage(SyncStage::RollingBack);

        let fork = tokio::select! {
            _ = stop.cancelled() => {
                debug!(mismatch, "Rollback abandoned by stop");
                return Err(Error::Cancelled);
            }
            fork = self.processor.find_fork_point(mismatch) => fork?,
        };
        if stop.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.processor.rollback_to(fork)?;

        self.progress.record_rollback();
        self.progress.set_current(self.processor.cursor());
        warn!(mismatch, fork, "Rolled back orphaned blocks");
        Ok(())
    }

    /// Current queue, replacing a killed one unless `stop` has fired
    fn active_queue(&self, stop: &CancelToken) -> Result<Arc<SyncQueue>> {
        let mut queue = self.queue.lock();
        if stop.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if queue.state() == QueueState::Killed {
            let fresh = SyncQueue::new(self.processor.clone(), self.progress.clone(), &self.config);
            if self.is_paused() {
                fresh.pause();
            }
            *queue = Arc::new(fresh);
        }
        Ok(queue.clone())
    }

    /// Replace the tracked lock-hash set; takes effect from the next block
    pub fn set_lock_hashes(&self, lock_hashes: HashSet<LockHash>) {
        info!(lock_hashes = lock_hashes.len(), "Tracked lock hashes replaced");
        self.processor.set_lock_hashes(lock_hashes);
    }

    /// Suspend block consumption
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.queue.lock().pause();
    }

    /// Continue block consumption
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.queue.lock().resume();
    }

    /// Kill the active queue and stop polling
    ///
    /// No cell state is written after this returns. `on_drain` fires exactly
    /// once, after the queue has been killed.
    pub async fn stop(&self, on_drain: Option<DrainCallback>) {
        self.stop.lock().cancel();

        let queue = self.queue.lock().clone();
        queue.kill().await;
        drop(self.rollback_gate.lock().await);

        if let Some(callback) = on_drain {
            callback();
        }
        *self.state.lock() = ListenerState::Stopped;
        self.progress.set_stage(SyncStage::Idle);
        info!(cursor = ?self.processor.cursor(), "Block listener stopped");
    }
}
