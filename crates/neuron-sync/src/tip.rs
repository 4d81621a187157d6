//! Chain tip observation

use crate::node::NodeClient;
use crate::CancelToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Continuously-updated best height of the node
///
/// Heights only move forward: a published value that is not strictly greater
/// than the current one is dropped, so stale responses cannot rewind it.
#[derive(Debug, Clone)]
pub struct ChainTipTracker {
    tx: Arc<watch::Sender<Option<u64>>>,
}

impl ChainTipTracker {
    /// Tracker with no height observed yet
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Offer a new height; returns whether it was accepted
    pub fn publish(&self, height: u64) -> bool {
        self.tx.send_if_modified(|current| match current {
            Some(existing) if *existing >= height => false,
            _ => {
                *current = Some(height);
                true
            }
        })
    }

    /// Latest accepted height
    pub fn latest(&self) -> Option<u64> {
        *self.tx.borrow()
    }

    /// Subscribe to accepted heights
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.tx.subscribe()
    }
}

impl Default for ChainTipTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task feeding a [`ChainTipTracker`] from `get_tip_header`
pub struct TipPoller;

impl TipPoller {
    /// Poll once immediately, then every `interval` until `cancel` fires
    pub fn spawn(
        node: Arc<dyn NodeClient>,
        tracker: ChainTipTracker,
        interval: Duration,
        cancel: CancelToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match node.get_tip_header().await {
                    Ok(header) => {
                        if tracker.publish(header.number) {
                            debug!(height = header.number, "New chain tip");
                        }
                    }
                    Err(e) => warn!("Tip poll failed: {}", e),
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("Tip poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockNode;

    #[test]
    fn test_only_increasing_heights_published() {
        let tracker = ChainTipTracker::new();
        assert_eq!(tracker.latest(), None);
        assert!(tracker.publish(10));
        assert!(!tracker.publish(10));
        assert!(!tracker.publish(7));
        assert!(tracker.publish(12));
        assert_eq!(tracker.latest(), Some(12));
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let tracker = ChainTipTracker::new();
        let mut rx = tracker.subscribe();
        tracker.publish(5);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(5));
    }

    #[tokio::test]
    async fn test_poller_feeds_tracker() {
        let node = Arc::new(MockNode::with_height(8));
        let tracker = ChainTipTracker::new();
        let cancel = CancelToken::new();
        let mut rx = tracker.subscribe();

        let handle = TipPoller::spawn(
            node.clone(),
            tracker.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );
        rx.changed().await.unwrap();
        assert_eq!(tracker.latest(), Some(8));

        node.push_block(Vec::new());
        rx.changed().await.unwrap();
        assert_eq!(tracker.latest(), Some(9));

        cancel.cancel();
        handle.await.unwrap();
    }
}
