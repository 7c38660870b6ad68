// Path: crates/gateway/src/idempotency.rs
//! Idempotency-key based request de-duplication.
//!
//! For a given caller and key, repeated submissions within the TTL return
//! the original terminal record without executing again, and concurrent
//! submissions coalesce: the first runs, the rest wait for its result.
//! The lookup happens-before execution, so a second call with the same
//! key never races the first.

use artifex_types::result::ExecutionResultRecord;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    caller: String,
    key: String,
}

enum Entry {
    /// A submission holds the key; waiters park on the notify.
    InFlight(Arc<Notify>),
    /// A terminal record, replayed until it expires.
    Done {
        record: Arc<ExecutionResultRecord>,
        at: Instant,
    },
}

/// What `begin` resolved to.
pub enum Begin {
    /// The key is ours; execute and call [`InFlightGuard::complete`].
    Fresh(InFlightGuard),
    /// A previous terminal record is still live; return it unchanged.
    Replay(Arc<ExecutionResultRecord>),
}

/// Holds an in-flight key. Dropping the guard without completing releases
/// the key and wakes waiters so a failed admission never wedges them.
pub struct InFlightGuard {
    map: Arc<DashMap<Key, Entry>>,
    key: Key,
    notify: Arc<Notify>,
    completed: bool,
}

impl InFlightGuard {
    /// Publishes the terminal record for this key and wakes waiters.
    pub fn complete(mut self, record: Arc<ExecutionResultRecord>) {
        self.map.insert(
            self.key.clone(),
            Entry::Done {
                record,
                at: Instant::now(),
            },
        );
        self.completed = true;
        self.notify.notify_waiters();
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.map.remove(&self.key);
            self.notify.notify_waiters();
        }
    }
}

/// The idempotency store: per-key entries scoped to caller identity.
pub struct IdempotencyStore {
    entries: Arc<DashMap<Key, Entry>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Claims the key or resolves a previous result.
    ///
    /// Concurrent submissions with the same key wait here until the first
    /// publishes its record (or releases the key on failure).
    pub async fn begin(&self, caller: &str, key: &str) -> Begin {
        let key = Key {
            caller: caller.to_string(),
            key: key.to_string(),
        };
        loop {
            let waiter = {
                match self.entries.entry(key.clone()) {
                    dashmap::mapref::entry::Entry::Vacant(vacant) => {
                        let notify = Arc::new(Notify::new());
                        vacant.insert(Entry::InFlight(notify.clone()));
                        return Begin::Fresh(InFlightGuard {
                            map: self.entries.clone(),
                            key,
                            notify,
                            completed: false,
                        });
                    }
                    dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                        match occupied.get() {
                            Entry::Done { record, at } => {
                                if at.elapsed() < self.ttl {
                                    return Begin::Replay(record.clone());
                                }
                                // Expired; this submission takes over.
                                let notify = Arc::new(Notify::new());
                                occupied.insert(Entry::InFlight(notify.clone()));
                                return Begin::Fresh(InFlightGuard {
                                    map: self.entries.clone(),
                                    key,
                                    notify,
                                    completed: false,
                                });
                            }
                            Entry::InFlight(notify) => notify.clone(),
                        }
                    }
                }
            };
            // Register interest before re-checking the entry; a completion
            // that lands between the check above and the await below would
            // otherwise be a lost wakeup.
            let notified = waiter.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let still_in_flight = matches!(
                self.entries.get(&key).as_deref(),
                Some(Entry::InFlight(_))
            );
            if still_in_flight {
                notified.await;
            }
        }
    }

    /// Drops expired entries; called opportunistically by the gateway.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| match entry {
            Entry::InFlight(_) => true,
            Entry::Done { at, .. } => at.elapsed() < ttl,
        });
    }

    /// Number of live entries, for tests and gauges.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str) -> Arc<ExecutionResultRecord> {
        Arc::new(ExecutionResultRecord {
            request_id: id.to_string(),
            success: true,
            output: None,
            gas_used: Some(1),
            duration_ms: 1,
            logs: None,
            gas_profile: None,
            trace: None,
            error: None,
            error_type: None,
            warning: None,
            executed_at: Utc::now(),
            executor_node: None,
        })
    }

    #[tokio::test]
    async fn replay_within_ttl() {
        let store = IdempotencyStore::new(Duration::from_secs(300));
        let Begin::Fresh(guard) = store.begin("caller", "key-12345678").await else {
            panic!("expected fresh");
        };
        guard.complete(record("r1"));

        let Begin::Replay(replayed) = store.begin("caller", "key-12345678").await else {
            panic!("expected replay");
        };
        assert_eq!(replayed.request_id, "r1");
    }

    #[tokio::test]
    async fn keys_are_scoped_to_the_caller() {
        let store = IdempotencyStore::new(Duration::from_secs(300));
        let Begin::Fresh(guard) = store.begin("alice", "shared-key-1").await else {
            panic!("expected fresh");
        };
        guard.complete(record("alice-r"));

        assert!(matches!(
            store.begin("bob", "shared-key-1").await,
            Begin::Fresh(_)
        ));
    }

    #[tokio::test]
    async fn concurrent_submissions_coalesce() {
        let store = Arc::new(IdempotencyStore::new(Duration::from_secs(300)));
        let Begin::Fresh(guard) = store.begin("caller", "key-12345678").await else {
            panic!("expected fresh");
        };

        let store2 = store.clone();
        let waiter = tokio::spawn(async move { store2.begin("caller", "key-12345678").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.complete(record("first"));

        match waiter.await.unwrap() {
            Begin::Replay(replayed) => assert_eq!(replayed.request_id, "first"),
            Begin::Fresh(_) => panic!("waiter must receive the first result"),
        }
    }

    #[tokio::test]
    async fn dropped_guard_releases_the_key() {
        let store = IdempotencyStore::new(Duration::from_secs(300));
        {
            let Begin::Fresh(_guard) = store.begin("caller", "key-12345678").await else {
                panic!("expected fresh");
            };
            // Dropped without completing: admission failed.
        }
        assert!(matches!(
            store.begin("caller", "key-12345678").await,
            Begin::Fresh(_)
        ));
    }

    #[tokio::test]
    async fn expired_entries_are_reclaimed() {
        let store = IdempotencyStore::new(Duration::from_millis(10));
        let Begin::Fresh(guard) = store.begin("caller", "key-12345678").await else {
            panic!("expected fresh");
        };
        guard.complete(record("r1"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(
            store.begin("caller", "key-12345678").await,
            Begin::Fresh(_)
        ));
        store.sweep();
        assert_eq!(store.len(), 1, "only the new in-flight entry remains");
    }
}
