//! Sync queue: drains a contiguous block range in ascending order
//!
//! Blocks are applied one at a time; fetches for the next few heights run
//! ahead of processing. The queue is a long-lived object: after draining it
//! returns to `Idle` and can be refilled, and once killed it is replaced.

use crate::processor::BlockProcessor;
use crate::progress::{SyncProgress, SyncStage};
use crate::{CancelToken, Error, Result, SyncConfig};
use neuron_core::Block;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Queue lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No worker; may be filled
    Idle,
    /// Worker draining tasks
    Running,
    /// Kill requested, waiting for in-flight work
    Draining,
    /// Terminal; the owner must create a new queue
    Killed,
}

/// One block to process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTask {
    /// Height
    pub block_number: u64,
    /// Failed fetch attempts so far
    pub attempts: u32,
}

/// Pending block-processing tasks for one range
pub struct SyncQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    processor: Arc<BlockProcessor>,
    progress: SyncProgress,
    lookahead: usize,
    max_attempts: u32,
    retry_backoff: Duration,
    state: Mutex<QueueState>,
    tasks: Mutex<VecDeque<SyncTask>>,
    outcome: Mutex<Option<Error>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancelToken,
    paused: watch::Sender<bool>,
    drained: watch::Sender<bool>,
}

impl SyncQueue {
    /// Empty idle queue
    pub fn new(processor: Arc<BlockProcessor>, progress: SyncProgress, config: &SyncConfig) -> Self {
        let (paused, _) = watch::channel(false);
        let (drained, _) = watch::channel(true);
        Self {
            inner: Arc::new(QueueInner {
                processor,
                progress,
                lookahead: config.fetch_lookahead,
                max_attempts: config.max_fetch_attempts.max(1),
                retry_backoff: config.retry_backoff(),
                state: Mutex::new(QueueState::Idle),
                tasks: Mutex::new(VecDeque::new()),
                outcome: Mutex::new(None),
                worker: Mutex::new(None),
                cancel: CancelToken::new(),
                paused,
                drained,
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> QueueState {
        *self.inner.state.lock()
    }

    /// Remaining tasks
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Whether no tasks remain
    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Snapshot of remaining tasks
    pub fn tasks(&self) -> Vec<SyncTask> {
        self.inner.tasks.lock().iter().copied().collect()
    }

    /// Queue tasks for `[start, end]`
    ///
    /// Returns `false` without queueing anything if `start > end` or the
    /// queue is not idle.
    pub fn fill(&self, start: u64, end: u64) -> bool {
        if start > end {
            return false;
        }
        if self.state() != QueueState::Idle {
            warn!(start, end, state = ?self.state(), "Refusing to fill a busy queue");
            return false;
        }

        let mut tasks = self.inner.tasks.lock();
        tasks.clear();
        tasks.extend((start..=end).map(|block_number| SyncTask {
            block_number,
            attempts: 0,
        }));
        self.inner.drained.send_replace(false);
        info!(start, end, "Queued block range");
        true
    }

    /// Start draining (`Idle -> Running`)
    pub fn process(&self) {
        let mut state = self.inner.state.lock();
        if *state != QueueState::Idle {
            return;
        }
        if self.inner.tasks.lock().is_empty() {
            self.inner.drained.send_replace(true);
            return;
        }
        *state = QueueState::Running;

        // Handle is stored before the state lock drops so `kill` always finds it
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run().await });
        *self.inner.worker.lock() = Some(handle);
    }

    /// Suspend consumption; tasks are kept
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    /// Continue consumption
    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    /// Whether consumption is suspended
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Stop for good
    ///
    /// Waits for the worker to finish any block it is applying; a fetch still
    /// in flight is abandoned. No cell state is written after this returns.
    pub async fn kill(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == QueueState::Killed {
                return;
            }
            *state = QueueState::Draining;
        }
        self.inner.cancel.cancel();

        let worker = self.inner.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!("Sync queue worker ended abnormally: {}", e);
            }
        }

        let abandoned = {
            let mut tasks = self.inner.tasks.lock();
            let n = tasks.len();
            tasks.clear();
            n
        };
        *self.inner.state.lock() = QueueState::Killed;
        self.inner.drained.send_replace(true);
        info!(abandoned, "Sync queue killed");
    }

    /// Wait until the queue is empty; yields the error that stopped it, if any
    pub async fn wait_drained(&self) -> Result<()> {
        let mut rx = self.inner.drained.subscribe();
        rx.wait_for(|drained| *drained)
            .await
            .map_err(|_| Error::Cancelled)?;
        match self.take_outcome() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Error that stopped the last drain, if nobody has collected it yet
    pub fn take_outcome(&self) -> Option<Error> {
        self.inner.outcome.lock().take()
    }
}

impl QueueInner {
    async fn run(self: Arc<Self>) {
        let mut prefetch = BTreeMap::new();
        let result = self.drain(&mut prefetch).await;
        for (_, handle) in prefetch {
            handle.abort();
        }

        self.tasks.lock().clear();
        {
            let mut state = self.state.lock();
            if *state == QueueState::Running {
                *state = QueueState::Idle;
            }
        }
        match result {
            Ok(()) => debug!("Sync queue drained"),
            Err(Error::Cancelled) => debug!("Sync queue cancelled"),
            Err(e) => *self.outcome.lock() = Some(e),
        }
        self.drained.send_replace(true);
    }

    async fn drain(&self, prefetch: &mut BTreeMap<u64, JoinHandle<Result<Block>>>) -> Result<()> {
        let mut paused = self.paused.subscribe();

        loop {
            while *paused.borrow_and_update() {
                debug!("Sync queue paused");
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    changed = paused.changed() => changed.map_err(|_| Error::Cancelled)?,
                }
            }
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let window: Vec<u64> = self
                .tasks
                .lock()
                .iter()
                .take(self.lookahead + 1)
                .map(|t| t.block_number)
                .collect();
            let height = match window.first() {
                Some(h) => *h,
                None => return Ok(()),
            };
            for h in window {
                prefetch.entry(h).or_insert_with(|| self.spawn_fetch(h));
            }

            let handle = match prefetch.remove(&height) {
                Some(handle) => handle,
                None => self.spawn_fetch(height),
            };

            self.progress.set_stage(SyncStage::Fetching);
            let abort = handle.abort_handle();
            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => {
                    abort.abort();
                    return Err(Error::Cancelled);
                }
                joined = handle => joined
                    .unwrap_or_else(|e| Err(Error::Fetch(format!("fetch task failed: {}", e)))),
            };

            match fetched {
                Ok(block) => {
                    if self.cancel.is_cancelled() {
                        debug!(height, "Discarding block fetched after kill");
                        return Err(Error::Cancelled);
                    }
                    self.progress.set_stage(SyncStage::Processing);
                    self.processor.apply_block(&block)?;
                    self.tasks.lock().pop_front();
                    self.progress.set_current(Some(height));
                }
                Err(e) if e.is_retryable() => {
                    let attempts = match self.tasks.lock().front_mut() {
                        Some(task) => {
                            task.attempts += 1;
                            task.attempts
                        }
                        None => self.max_attempts,
                    };
                    if attempts >= self.max_attempts {
                        warn!(height, attempts, "Giving up on block until next tick: {}", e);
                        return Err(e);
                    }

                    let backoff = self.retry_backoff * 2u32.saturating_pow(attempts - 1);
                    warn!(height, attempts, "Block fetch failed, retrying in {:?}: {}", backoff, e);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn spawn_fetch(&self, height: u64) -> JoinHandle<Result<Block>> {
        let processor = self.processor.clone();
        tokio::spawn(async move { processor.fetch_block(height).await })
    }
}
