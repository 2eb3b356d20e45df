//! Correlates a client's sync request with the reply that eventually answers it.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use hubline_core::{Envelope, MessageId};
use thiserror::Error;
use tokio::sync::oneshot;

/// Returned by [`SyncCorrelator::wait`] when no reply arrives before the deadline.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("sync request timed out waiting for a reply")]
pub struct SyncTimeout;

struct Pending {
    reply_tx: oneshot::Sender<Envelope>,
    deadline: Instant,
}

/// Tracks in-flight sync requests for one connection.
///
/// One instance lives per logged-in client, owned by its connection worker.
/// `register` and `deliver` each touch only their own shard of the map and
/// never call into each other while holding a guard.
#[derive(Default)]
pub struct SyncCorrelator {
    pending: DashMap<MessageId, Pending>,
}

impl SyncCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request, returning the receiver half the caller awaits.
    pub fn register(&self, id: MessageId, timeout: Duration) -> oneshot::Receiver<Envelope> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(
            id,
            Pending {
                reply_tx,
                deadline: Instant::now() + timeout,
            },
        );
        reply_rx
    }

    /// Delivers a reply to its matching pending request.
    ///
    /// Returns `true` if a registered, still-waiting request was found and
    /// notified. A `false` result (stale or unknown `message_id`) is not an
    /// error: the original requester may have already timed out.
    pub fn deliver(&self, id: MessageId, envelope: Envelope) -> bool {
        self.pending
            .remove(&id)
            .is_some_and(|(_, pending)| pending.reply_tx.send(envelope).is_ok())
    }

    /// Awaits a previously [`register`](Self::register)ed reply up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTimeout`] if the deadline elapses, or the sender is
    /// dropped (e.g. by [`sweep`](Self::sweep)) before a reply arrives.
    pub async fn wait(
        &self,
        id: MessageId,
        timeout: Duration,
        receiver: oneshot::Receiver<Envelope>,
    ) -> Result<Envelope, SyncTimeout> {
        let result = tokio::time::timeout(timeout, receiver).await;
        self.pending.remove(&id);
        match result {
            Ok(Ok(envelope)) => Ok(envelope),
            _ => Err(SyncTimeout),
        }
    }

    /// Drops every registration whose deadline has passed.
    ///
    /// Dropping the sender resolves any in-progress `wait` with an error
    /// immediately rather than leaving it to the `timeout` future alone.
    pub fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| *entry.key())
            .collect();
        for id in expired {
            self.pending.remove(&id);
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_before_wait_resolves_it() {
        let correlator = SyncCorrelator::new();
        let id = MessageId::new();
        let rx = correlator.register(id, Duration::from_secs(5));

        let mut reply = Envelope::new();
        reply.message_id = MessageId::new();
        assert!(correlator.deliver(id, reply.clone()));

        let received = correlator.wait(id, Duration::from_secs(5), rx).await.unwrap();
        assert_eq!(received.message_id, reply.message_id);
    }

    #[tokio::test]
    async fn wait_times_out_without_a_reply() {
        let correlator = SyncCorrelator::new();
        let id = MessageId::new();
        let rx = correlator.register(id, Duration::from_millis(20));

        let result = correlator.wait(id, Duration::from_millis(20), rx).await;
        assert_eq!(result, Err(SyncTimeout));
    }

    #[test]
    fn deliver_to_unknown_id_is_a_noop() {
        let correlator = SyncCorrelator::new();
        assert!(!correlator.deliver(MessageId::new(), Envelope::new()));
    }

    #[test]
    fn sweep_drops_expired_registrations() {
        let correlator = SyncCorrelator::new();
        let id = MessageId::new();
        let _rx = correlator.register(id, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(correlator.pending_count(), 1);
        correlator.sweep();
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn sweep_wakes_a_waiting_caller() {
        let correlator = std::sync::Arc::new(SyncCorrelator::new());
        let id = MessageId::new();
        let rx = correlator.register(id, Duration::from_secs(30));

        let waiter = {
            let correlator = std::sync::Arc::clone(&correlator);
            tokio::spawn(async move { correlator.wait(id, Duration::from_secs(30), rx).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        // Force expiry regardless of the registered timeout and sweep it away.
        correlator
            .pending
            .entry(id)
            .and_modify(|p| p.deadline = Instant::now());
        correlator.sweep();

        let result = waiter.await.unwrap();
        assert_eq!(result, Err(SyncTimeout));
    }
}
