//! Address-change notification channel
//!
//! A broadcast of an opaque "updated" signal. Slow subscribers lag and miss
//! intermediate signals rather than applying backpressure; a lagged receiver
//! still sees that something changed.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Emits a signal after each persisted address update batch
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<()>,
}

impl ChangeNotifier {
    /// Create a channel with no subscribers
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal that the address collection changed
    pub fn notify(&self) {
        // No subscribers is fine.
        let _ = self.tx.send(());
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let notifier = ChangeNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        notifier.notify();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn test_notify_without_subscribers() {
        let notifier = ChangeNotifier::new();
        notifier.notify();
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
