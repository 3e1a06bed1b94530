//! Per-key execution slots.
//!
//! One FIFO-fair async mutex per `(user_id, tool)` serializes dispatches
//! for that key. Entries are created on first use and removed when the last
//! interested dispatch leaves, so idle keys cost nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, MutexGuard};

use super::DispatchOutcome;
use crate::db::Params;
use crate::upstream::Tool;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub user_id: String,
    pub tool: Tool,
}

/// Last successful run under a slot, kept for coalescing.
struct LastRun {
    seq: u64,
    params: Params,
    outcome: DispatchOutcome,
}

#[derive(Default)]
pub(crate) struct SlotState {
    last: Option<LastRun>,
}

#[derive(Default)]
struct SlotShared {
    lock: Mutex<SlotState>,
    completed: AtomicU64,
}

struct Slot {
    shared: Arc<SlotShared>,
    users: usize,
}

#[derive(Default)]
pub(crate) struct SlotRegistry {
    slots: DashMap<DispatchKey, Slot>,
}

impl SlotRegistry {
    /// Register interest in a key. The slot lives at least as long as the
    /// returned ticket.
    pub(crate) fn enter(&self, key: DispatchKey) -> SlotTicket<'_> {
        let shared = {
            let mut slot = self.slots.entry(key.clone()).or_insert_with(|| Slot {
                shared: Arc::new(SlotShared::default()),
                users: 0,
            });
            slot.users += 1;
            slot.shared.clone()
        };
        let arrival = shared.completed.load(Ordering::SeqCst);
        SlotTicket {
            registry: self,
            key,
            shared,
            arrival,
        }
    }

    /// Number of keys with at least one active or waiting dispatch.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn leave(&self, key: &DispatchKey) {
        if let Entry::Occupied(mut entry) = self.slots.entry(key.clone()) {
            entry.get_mut().users -= 1;
            if entry.get().users == 0 {
                entry.remove();
            }
        }
    }
}

pub(crate) struct SlotTicket<'a> {
    registry: &'a SlotRegistry,
    key: DispatchKey,
    shared: Arc<SlotShared>,
    arrival: u64,
}

impl SlotTicket<'_> {
    /// Wait for exclusive use of the slot.
    pub(crate) async fn acquire(&self) -> SlotGuard<'_> {
        SlotGuard {
            state: self.shared.lock.lock().await,
            completed: &self.shared.completed,
            arrival: self.arrival,
        }
    }
}

impl Drop for SlotTicket<'_> {
    fn drop(&mut self) {
        self.registry.leave(&self.key);
    }
}

pub(crate) struct SlotGuard<'a> {
    state: MutexGuard<'a, SlotState>,
    completed: &'a AtomicU64,
    arrival: u64,
}

impl SlotGuard<'_> {
    /// Outcome of a successful run with identical request params that
    /// finished while this dispatch was queued.
    pub(crate) fn coalesced(&self, params: &Params) -> Option<DispatchOutcome> {
        self.state
            .last
            .as_ref()
            .filter(|last| last.seq > self.arrival && last.params == *params)
            .map(|last| last.outcome.clone())
    }

    /// Mark a run as finished; successful outcomes become reusable.
    pub(crate) fn complete(&mut self, params: &Params, outcome: Option<&DispatchOutcome>) {
        let seq = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.last = outcome.map(|outcome| LastRun {
            seq,
            params: params.clone(),
            outcome: outcome.clone(),
        });
    }
}
