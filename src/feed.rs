//! Shared bounded multi-key feed: one writer, many blocking readers.
//!
//! All state sits behind one mutex. Writers broadcast on a condvar after the
//! lock is released so every reader role observes every update.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Condvar, LockResult, Mutex, MutexGuard};
use std::time::Duration;

use crate::history::BoundedHistory;
use crate::logging::{obj, v_str, warn, Domain};
use crate::observation::Observation;

pub const DEFAULT_CAPACITY: usize = 100;

/// When `wait_for_update` considers the feed updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePolicy {
    /// Wake once the write count passes the value seen at call entry.
    #[default]
    NewWrite,
    /// Wake whenever any write has ever happened. After the first push every
    /// wait returns immediately; kept for parity with the legacy simulator.
    AnyWrite,
}

impl WakePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "new_write" | "new" => Some(WakePolicy::NewWrite),
            "any_write" | "any" | "legacy" => Some(WakePolicy::AnyWrite),
            _ => None,
        }
    }

    fn satisfied(&self, state: &FeedState, seen_writes: u64) -> bool {
        if state.shutdown {
            return true;
        }
        match self {
            WakePolicy::NewWrite => state.total_writes > seen_writes,
            WakePolicy::AnyWrite => state.total_writes > 0,
        }
    }
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FeedStats {
    pub writes: u64,
    pub reads: u64,
}

impl FeedStats {
    pub fn read_write_ratio(&self) -> f64 {
        if self.writes == 0 {
            0.0
        } else {
            self.reads as f64 / self.writes as f64
        }
    }
}

#[derive(Debug, Default)]
struct FeedState {
    histories: BTreeMap<String, BoundedHistory>,
    total_writes: u64,
    total_reads: u64,
    shutdown: bool,
}

/// Unwrap a poisoned lock result, logging `lock_poisoned` instead of propagating the panic.
pub(crate) fn recover<G>(result: LockResult<G>, lock_name: &'static str) -> G {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn(
                Domain::Feed,
                "lock_poisoned",
                obj(&[("lock", v_str(lock_name)), ("msg", v_str("recovering inner state"))]),
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn lock_recover<'a, T>(
    mutex: &'a Mutex<T>,
    lock_name: &'static str,
) -> MutexGuard<'a, T> {
    recover(mutex.lock(), lock_name)
}

#[derive(Debug)]
pub struct SharedFeed {
    capacity: usize,
    policy: WakePolicy,
    state: Mutex<FeedState>,
    updated: Condvar,
}

impl Default for SharedFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SharedFeed {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, WakePolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: WakePolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(FeedState::default()),
            updated: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> WakePolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        lock_recover(&self.state, "feed_state")
    }

    /// Append to the key's history, creating it on first use, then wake every waiter.
    pub fn push(&self, obs: Observation) {
        {
            let mut state = self.lock();
            let capacity = self.capacity;
            state
                .histories
                .entry(obs.key.clone())
                .or_insert_with(|| BoundedHistory::new(capacity))
                .append(obs);
            state.total_writes += 1;
        }
        self.updated.notify_all();
    }

    /// Most recent tick for `key`, if any.
    pub fn latest(&self, key: &str) -> Option<Observation> {
        let mut state = self.lock();
        let found = state.histories.get(key).and_then(|h| h.latest()).cloned();
        if found.is_some() {
            state.total_reads += 1;
        }
        found
    }

    /// Up to `count` most recent ticks for `key`, oldest first.
    ///
    /// The copy is taken entirely under the lock, so a window never reflects a
    /// half-applied push.
    pub fn window(&self, key: &str, count: usize) -> Vec<Observation> {
        let mut state = self.lock();
        let Some(history) = state.histories.get(key) else {
            return Vec::new();
        };
        let out = history.tail_slice(count);
        state.total_reads += 1;
        out
    }

    /// Keys observed so far, in sorted order.
    pub fn list_keys(&self) -> Vec<String> {
        self.lock().histories.keys().cloned().collect()
    }

    /// Block until the wake policy is satisfied, shutdown is signaled, or
    /// `timeout` elapses. Returns `false` only on timeout.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let seen = state.total_writes;
        let policy = self.policy;
        let waited = self
            .updated
            .wait_timeout_while(state, timeout, |s| !policy.satisfied(s, seen));
        let (_state, result) = recover(waited, "feed_state");
        !result.timed_out()
    }

    /// Idempotent. Wakes every blocked waiter; later waits return at once.
    pub fn shutdown_now(&self) {
        let first = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.shutdown, true)
        };
        self.updated.notify_all();
        if first {
            crate::logging::info(Domain::Feed, "shutdown", obj(&[]));
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn stats(&self) -> FeedStats {
        let state = self.lock();
        FeedStats {
            writes: state.total_writes,
            reads: state.total_reads,
        }
    }
}
