//! Chart data update events
//!
//! Provides the update event emitted once per synchronization attempt and the
//! [`UpdateNotifier`] that delivers it to subscribers.
//!
//! Each subscriber owns an unbounded channel, so a slow subscriber never
//! causes events to be dropped or coalesced for itself or anyone else.
//! Dropping the [`Subscription`] (or calling [`Subscription::unsubscribe`])
//! removes the subscriber before the next emit.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::ScoreInformation;

/// Outcome of one synchronization attempt
#[derive(Debug, Clone)]
pub struct ChartDataUpdated {
    /// Attempt sequence number (monotonic per service)
    pub attempt: u64,
    /// Committed snapshot on success, `None` on failure
    pub staves: Option<Arc<ScoreInformation>>,
    pub is_success: bool,
    /// Failure reason (always `None` on success)
    pub error_message: Option<String>,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
}

impl ChartDataUpdated {
    pub fn success(attempt: u64, staves: Arc<ScoreInformation>) -> Self {
        Self {
            attempt,
            staves: Some(staves),
            is_success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(attempt: u64, error_message: impl Into<String>) -> Self {
        Self {
            attempt,
            staves: None,
            is_success: false,
            error_message: Some(error_message.into()),
            timestamp: Utc::now(),
        }
    }
}

type Subscribers = Vec<(u64, mpsc::UnboundedSender<ChartDataUpdated>)>;

#[derive(Default)]
struct NotifierInner {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl NotifierInner {
    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        // Critical sections never panic mid-update, so a poisoned list is still consistent
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        self.subscribers().retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Observer registry for [`ChartDataUpdated`] events
#[derive(Clone, Default)]
pub struct UpdateNotifier {
    inner: Arc<NotifierInner>,
}

impl UpdateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    ///
    /// Only events emitted after this call are delivered.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers().push((id, tx));
        debug!(subscription = id, "Chart data subscriber registered");

        Subscription {
            id,
            rx,
            notifier: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every live subscriber
    ///
    /// Returns the number of subscribers that received it. Subscribers whose
    /// receiver is gone are pruned.
    pub fn emit(&self, event: ChartDataUpdated) -> usize {
        let mut subscribers = self.inner.subscribers();
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

/// Disposal handle and event stream for one subscriber
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ChartDataUpdated>,
    notifier: Weak<NotifierInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the notifier has been dropped and all queued events
    /// are consumed.
    pub async fn recv(&mut self) -> Option<ChartDataUpdated> {
        self.rx.recv().await
    }

    /// Take a queued event without waiting
    pub fn try_recv(&mut self) -> Option<ChartDataUpdated> {
        self.rx.try_recv().ok()
    }

    /// Remove this subscriber; equivalent to dropping the handle
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.notifier.upgrade() {
            inner.remove(self.id);
            debug!(subscription = self.id, "Chart data subscriber removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_every_event() {
        let notifier = UpdateNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        for attempt in 1..=50 {
            assert_eq!(notifier.emit(ChartDataUpdated::failure(attempt, "down")), 2);
        }

        for attempt in 1..=50 {
            assert_eq!(first.recv().await.unwrap().attempt, attempt);
            assert_eq!(second.recv().await.unwrap().attempt, attempt);
        }
        assert!(first.try_recv().is_none());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let notifier = UpdateNotifier::new();
        let sub = notifier.subscribe();
        let other = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        drop(sub);
        assert_eq!(notifier.subscriber_count(), 1);

        other.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.emit(ChartDataUpdated::failure(1, "x")), 0);
    }

    #[test]
    fn test_subscription_ids_are_distinct() {
        let notifier = UpdateNotifier::new();
        let a = notifier.subscribe();
        let b = notifier.subscribe();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_recv_ends_when_notifier_dropped() {
        let notifier = UpdateNotifier::new();
        let mut sub = notifier.subscribe();
        notifier.emit(ChartDataUpdated::success(1, Arc::new(ScoreInformation::default())));
        drop(notifier);

        let event = sub.recv().await.unwrap();
        assert!(event.is_success);
        assert!(event.error_message.is_none());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let notifier = UpdateNotifier::new();
        notifier.emit(ChartDataUpdated::failure(1, "early"));
        let mut late = notifier.subscribe();
        assert!(late.try_recv().is_none());
    }
}
