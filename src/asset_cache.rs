//! C5 - Asset Cache: the dedup map and negative cache of permanent failures, plus the
//! reservation mechanism that makes fetches at-most-once under contention (§4.5 step 8,
//! §5, §9).
//!
//! The cache itself never performs I/O: `reserve` hands the caller either a settled
//! result or an exclusive `Reservation` to fill in. Racing callers for the same URL each
//! get a fresh subscription on a `watch` channel, which sidesteps the missed-wakeup race
//! a bare `Notify` has between checking cache state and awaiting a signal.

use dashmap::DashMap;
use tokio::sync::watch;

/// Outcome of a settled asset fetch, as recorded in the cache.
#[derive(Debug, Clone)]
pub enum AssetOutcome {
    Stored(String),
    Failed,
}

enum Slot {
    Pending(watch::Sender<Option<AssetOutcome>>),
    Settled(AssetOutcome),
}

pub struct AssetCache {
    slots: DashMap<String, Slot>,
}

/// What [`AssetCache::reserve`] hands back to the caller.
pub enum Reservation {
    /// The URL was already settled; here is the result.
    Settled(AssetOutcome),
    /// This caller is the first to ask for `url`: it owns the fetch and must call
    /// [`AssetCache::settle`] when done. Other concurrent callers receive
    /// [`Reservation::Await`] instead.
    Owned,
    /// Another caller already owns this fetch; await this receiver for the result.
    Await(watch::Receiver<Option<AssetOutcome>>),
}

impl Reservation {
    /// Blocks until the owner settles the URL, for the `Await` case. No-op-ish for the
    /// other variants (callers should match on those directly).
    pub async fn wait(mut receiver: watch::Receiver<Option<AssetOutcome>>) -> AssetOutcome {
        loop {
            if let Some(outcome) = receiver.borrow().clone() {
                return outcome;
            }
            if receiver.changed().await.is_err() {
                return AssetOutcome::Failed;
            }
        }
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetCache {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Returns the settled outcome, an ownership grant, or a waiter for `url`. Exactly
    /// one caller per URL ever receives `Owned`.
    pub fn reserve(&self, url: &str) -> Reservation {
        match self.slots.entry(url.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => match entry.get() {
                Slot::Settled(outcome) => Reservation::Settled(outcome.clone()),
                Slot::Pending(sender) => Reservation::Await(sender.subscribe()),
            },
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (sender, _) = watch::channel(None);
                entry.insert(Slot::Pending(sender));
                Reservation::Owned
            }
        }
    }

    /// Publishes the final outcome for a URL this caller owns the reservation for, and
    /// wakes any waiters subscribed to it.
    pub fn settle(&self, url: &str, outcome: AssetOutcome) {
        if let Some(entry) = self.slots.get(url)
            && let Slot::Pending(sender) = &*entry
        {
            let _ = sender.send(Some(outcome.clone()));
        }
        self.slots.insert(url.to_string(), Slot::Settled(outcome));
    }

    /// Number of distinct URLs with a positive (stored) outcome.
    pub fn stored_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|e| matches!(&*e, Slot::Settled(AssetOutcome::Stored(_))))
            .count()
    }

    /// Snapshot of `url -> local_path` for every successfully stored asset.
    pub fn snapshot_stored(&self) -> Vec<(String, String)> {
        self.slots
            .iter()
            .filter_map(|e| match &*e {
                Slot::Settled(AssetOutcome::Stored(path)) => Some((e.key().clone(), path.clone())),
                _ => None,
            })
            .collect()
    }

    /// Snapshot of every URL with a negative (permanently failed) outcome.
    pub fn snapshot_failed(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(|e| match &*e {
                Slot::Settled(AssetOutcome::Failed) => Some(e.key().clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_caller_owns_second_awaits() {
        let cache = AssetCache::new();
        assert!(matches!(cache.reserve("u"), Reservation::Owned));
        assert!(matches!(cache.reserve("u"), Reservation::Await(_)));
    }

    #[test]
    fn settled_outcome_is_returned_to_later_callers() {
        let cache = AssetCache::new();
        assert!(matches!(cache.reserve("u"), Reservation::Owned));
        cache.settle("u", AssetOutcome::Stored("images/x.png".into()));
        match cache.reserve("u") {
            Reservation::Settled(AssetOutcome::Stored(p)) => assert_eq!(p, "images/x.png"),
            _ => panic!("expected settled outcome"),
        }
    }

    #[test]
    fn failed_outcome_is_negative_cached() {
        let cache = AssetCache::new();
        assert!(matches!(cache.reserve("u"), Reservation::Owned));
        cache.settle("u", AssetOutcome::Failed);
        assert!(matches!(cache.reserve("u"), Reservation::Settled(AssetOutcome::Failed)));
        assert_eq!(cache.snapshot_failed(), vec!["u".to_string()]);
    }

    #[tokio::test]
    async fn waiter_is_woken_on_settle() {
        let cache = Arc::new(AssetCache::new());
        assert!(matches!(cache.reserve("u"), Reservation::Owned));

        let receiver = match cache.reserve("u") {
            Reservation::Await(r) => r,
            _ => panic!("expected Await"),
        };

        let waiter = tokio::spawn(async move { Reservation::wait(receiver).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cache.settle("u", AssetOutcome::Stored("images/y.png".into()));

        match waiter.await.unwrap() {
            AssetOutcome::Stored(p) => assert_eq!(p, "images/y.png"),
            AssetOutcome::Failed => panic!("expected stored outcome"),
        }
    }
}
