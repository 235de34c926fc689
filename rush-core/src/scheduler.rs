//! Cooperative tick scheduler.
//!
//! Every timed behavior in the crate (phase timers, sweeps, per-encounter
//! clocks, population steps) is an entry in one [`TickScheduler`]. The host
//! advances the clock once per external tick and drains the due entries.
//!
//! Entries carry a payload `T` instead of a closure: the owner matches on the
//! payload to run the callback, which keeps all shared state behind one
//! `&mut` borrow.
//!
//! Ordering within one tick is (fire tick, registration sequence). A periodic
//! entry keeps its registration sequence across re-arms, so handlers always
//! run in registration order.
//!
//! Cancellation is lazy: the heap may hold stale entries, which are skipped
//! when popped. [`TickScheduler::cancel`] is idempotent.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::types::Tick;

/// Cancellation token for a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

// ---------------------------------------------------------------------------
// Heap ordering
// ---------------------------------------------------------------------------

/// Heap key. Ordering: (`fire_at` ASC, `seq` ASC); wrapped in `Reverse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueKey {
    fire_at: Tick,
    seq: u64,
    id: u64,
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    task: T,
    fire_at: Tick,
    period: Option<Tick>,
}

// ---------------------------------------------------------------------------
// TickScheduler
// ---------------------------------------------------------------------------

/// Priority queue of `{next-fire-tick, payload, cancellation token}` entries.
#[derive(Debug, Clone)]
pub struct TickScheduler<T> {
    queue: BinaryHeap<Reverse<QueueKey>>,
    slots: HashMap<u64, Slot<T>>,
    now: Tick,
    next_id: u64,
}

impl<T: Clone> TickScheduler<T> {
    /// Create an empty scheduler at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            slots: HashMap::new(),
            now: 0,
            next_id: 0,
        }
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Fire `task` once, `delay` ticks from now. A zero delay fires during the
    /// current drain.
    pub fn schedule_once(&mut self, delay: Tick, task: T) -> TaskHandle {
        self.insert(delay, None, task)
    }

    /// Fire `task` every `period` ticks (minimum 1), first after `delay` ticks.
    pub fn schedule_repeating(&mut self, delay: Tick, period: Tick, task: T) -> TaskHandle {
        self.insert(delay, Some(period.max(1)), task)
    }

    fn insert(&mut self, delay: Tick, period: Option<Tick>, task: T) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        let fire_at = self.now.saturating_add(delay);
        self.slots.insert(id, Slot { task, fire_at, period });
        self.queue.push(Reverse(QueueKey { fire_at, seq: id, id }));
        TaskHandle(id)
    }

    /// Cancel an entry. Returns `true` if it was still scheduled; cancelling
    /// twice, or after a one-shot fired, is a no-op.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.slots.remove(&handle.0).is_some()
    }

    /// Cancel every entry whose payload matches `predicate`. Returns how many.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !predicate(&slot.task));
        before - self.slots.len()
    }

    /// Cancel everything.
    pub fn cancel_all(&mut self) {
        self.slots.clear();
        self.queue.clear();
    }

    /// Whether the entry is still scheduled.
    #[must_use]
    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.slots.contains_key(&handle.0)
    }

    /// Next fire tick of a scheduled entry.
    #[must_use]
    pub fn next_fire(&self, handle: TaskHandle) -> Option<Tick> {
        self.slots.get(&handle.0).map(|slot| slot.fire_at)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no entry is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Advance the clock by one tick and return the new tick.
    pub fn advance(&mut self) -> Tick {
        self.now += 1;
        self.now
    }

    /// Pop the next entry due at or before the current tick.
    ///
    /// Periodic entries are re-armed before being returned, so a handler may
    /// cancel its own entry. Entries cancelled while a drain is in progress
    /// are never returned.
    pub fn pop_due(&mut self) -> Option<(TaskHandle, T)> {
        loop {
            let Reverse(key) = *self.queue.peek()?;
            if key.fire_at > self.now {
                return None;
            }
            self.queue.pop();

            let Some(slot) = self.slots.get_mut(&key.id) else {
                continue; // cancelled
            };
            if slot.fire_at != key.fire_at {
                continue; // superseded by a re-arm
            }

            let handle = TaskHandle(key.id);
            match slot.period {
                Some(period) => {
                    let next = slot.fire_at.saturating_add(period).max(self.now + 1);
                    slot.fire_at = next;
                    let task = slot.task.clone();
                    self.queue.push(Reverse(QueueKey { fire_at: next, ..key }));
                    return Some((handle, task));
                }
                None => {
                    let slot = self.slots.remove(&key.id)?;
                    return Some((handle, slot.task));
                }
            }
        }
    }

    /// Advance one tick and collect every due payload in firing order.
    ///
    /// Convenience for callers that do not schedule or cancel while handling.
    pub fn tick(&mut self) -> Vec<(TaskHandle, T)> {
        self.advance();
        std::iter::from_fn(|| self.pop_due()).collect()
    }
}

impl<T: Clone> Default for TickScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
