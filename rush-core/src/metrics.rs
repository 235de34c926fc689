//! Runtime counters and tick-budget monitoring.
//!
//! Counters are `AtomicU64` so a host can read them from another thread
//! (dashboard export) while the tick thread increments them. The tick
//! budget monitor keeps a ring of recent tick timings behind a
//! `parking_lot::Mutex`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Lock-free counters for gameplay events.
#[derive(Debug, Default)]
pub struct RushCounters {
    /// Rounds that entered Active.
    pub rounds_started: AtomicU64,
    /// Rounds that reached their end.
    pub rounds_completed: AtomicU64,
    /// Containers placed, initial population and respawns alike.
    pub containers_placed: AtomicU64,
    /// Containers emptied by participants.
    pub containers_consumed: AtomicU64,
    /// Rescue NPCs placed.
    pub npcs_placed: AtomicU64,
    /// Rescue encounters started.
    pub encounters_started: AtomicU64,
    /// Rescue encounters won.
    pub encounters_won: AtomicU64,
    /// Rescue encounters failed or abandoned.
    pub encounters_lost: AtomicU64,
    /// Punishments applied or extended.
    pub punishments_applied: AtomicU64,
    /// Privileged encounters spawned.
    pub privileged_spawned: AtomicU64,
    /// Privileged spawn requests suppressed by the cap.
    pub privileged_suppressed: AtomicU64,
    /// Sum of positive point awards.
    pub points_awarded: AtomicU64,
    /// Record store calls that failed.
    pub store_failures: AtomicU64,
    /// External ticks processed.
    pub ticks: AtomicU64,
}

impl RushCounters {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `counter`.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to `counter`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            rounds_started: load(&self.rounds_started),
            rounds_completed: load(&self.rounds_completed),
            containers_placed: load(&self.containers_placed),
            containers_consumed: load(&self.containers_consumed),
            npcs_placed: load(&self.npcs_placed),
            encounters_started: load(&self.encounters_started),
            encounters_won: load(&self.encounters_won),
            encounters_lost: load(&self.encounters_lost),
            punishments_applied: load(&self.punishments_applied),
            privileged_spawned: load(&self.privileged_spawned),
            privileged_suppressed: load(&self.privileged_suppressed),
            points_awarded: load(&self.points_awarded),
            store_failures: load(&self.store_failures),
            ticks: load(&self.ticks),
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Rounds that entered Active.
    pub rounds_started: u64,
    /// Rounds that reached their end.
    pub rounds_completed: u64,
    /// Containers placed.
    pub containers_placed: u64,
    /// Containers emptied.
    pub containers_consumed: u64,
    /// Rescue NPCs placed.
    pub npcs_placed: u64,
    /// Encounters started.
    pub encounters_started: u64,
    /// Encounters won.
    pub encounters_won: u64,
    /// Encounters lost.
    pub encounters_lost: u64,
    /// Punishments applied.
    pub punishments_applied: u64,
    /// Privileged encounters spawned.
    pub privileged_spawned: u64,
    /// Privileged requests suppressed.
    pub privileged_suppressed: u64,
    /// Positive points awarded.
    pub points_awarded: u64,
    /// Failed store calls.
    pub store_failures: u64,
    /// Ticks processed.
    pub ticks: u64,
}

impl CounterSnapshot {
    /// Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 14] = [
            ("rounds_started", "Rounds that entered Active", self.rounds_started),
            ("rounds_completed", "Rounds that ended", self.rounds_completed),
            ("containers_placed", "Containers placed", self.containers_placed),
            ("containers_consumed", "Containers emptied", self.containers_consumed),
            ("npcs_placed", "Rescue NPCs placed", self.npcs_placed),
            ("encounters_started", "Rescue encounters started", self.encounters_started),
            ("encounters_won", "Rescue encounters won", self.encounters_won),
            ("encounters_lost", "Rescue encounters lost", self.encounters_lost),
            ("punishments_applied", "Punishments applied or extended", self.punishments_applied),
            ("privileged_spawned", "Privileged encounters spawned", self.privileged_spawned),
            ("privileged_suppressed", "Privileged spawns suppressed by the cap", self.privileged_suppressed),
            ("points_awarded", "Positive points awarded", self.points_awarded),
            ("store_failures", "Record store failures", self.store_failures),
            ("ticks", "Ticks processed", self.ticks),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            let _ = writeln!(out, "# HELP rush_{name}_total {help}");
            let _ = writeln!(out, "# TYPE rush_{name}_total counter");
            let _ = writeln!(out, "rush_{name}_total {value}");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tick Budget Monitor
// ---------------------------------------------------------------------------

const HISTORY: usize = 256;

/// Tracks time spent per tick against a budget.
#[derive(Debug)]
pub struct TickBudgetMonitor {
    budget_ms: f64,
    history: Mutex<TickHistory>,
}

#[derive(Debug)]
struct TickHistory {
    timings: Vec<f64>,
    write_idx: usize,
    count: u64,
    last_over_budget: bool,
}

impl TickBudgetMonitor {
    /// Monitor with `budget_ms` milliseconds per tick.
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(TickHistory {
                timings: vec![0.0; HISTORY],
                write_idx: 0,
                count: 0,
                last_over_budget: false,
            }),
        }
    }

    /// Start timing a tick; the guard records on drop.
    pub fn begin_tick(&self) -> TickGuard<'_> {
        TickGuard { monitor: self, start: Instant::now() }
    }

    /// Record a timing in milliseconds.
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % HISTORY;
        h.count += 1;
        h.last_over_budget = ms > self.budget_ms;
    }

    /// Whether the most recent tick ran over budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.history.lock().last_over_budget
    }

    /// Ticks recorded.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.history.lock().count
    }

    /// Percentiles over the retained history.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn percentiles(&self) -> TickPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(HISTORY);
        if n == 0 {
            return TickPercentiles::default();
        }
        let mut sorted = h.timings[..n].to_vec();
        sorted.sort_by(f64::total_cmp);
        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        TickPercentiles {
            p50: at(0.5),
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[n - 1],
            over_budget_ratio: sorted.iter().filter(|t| **t > self.budget_ms).count() as f64 / n as f64,
        }
    }

    /// Budget in milliseconds.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}

/// Records elapsed time into its monitor when dropped.
#[derive(Debug)]
pub struct TickGuard<'a> {
    monitor: &'a TickBudgetMonitor,
    start: Instant,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Tick timing percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Slowest tick.
    pub max: f64,
    /// Share of ticks over budget, 0.0 to 1.0.
    pub over_budget_ratio: f64,
}

/// Span names used with `tracing::span!`.
pub mod spans {
    /// One external tick.
    pub const TICK: &str = "rush::tick";
    /// Round start (distribution, population kick-off).
    pub const ROUND_START: &str = "rush::round::start";
    /// Round end (persist, teardown).
    pub const ROUND_END: &str = "rush::round::end";
    /// Respawn sweep.
    pub const RESPAWN_SWEEP: &str = "rush::respawn::sweep";
    /// Profile flush.
    pub const PERSIST_FLUSH: &str = "rush::persist::flush";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let c = RushCounters::new();
        RushCounters::bump(&c.rounds_started);
        RushCounters::add(&c.points_awarded, 40);
        let s = c.snapshot();
        assert_eq!(s.rounds_started, 1);
        assert_eq!(s.points_awarded, 40);
        let text = s.to_prometheus();
        assert!(text.contains("rush_points_awarded_total 40"));
        assert!(text.contains("# TYPE rush_ticks_total counter"));
    }

    #[test]
    fn percentiles_track_budget() {
        let m = TickBudgetMonitor::new(1.0);
        for ms in [0.2, 0.4, 0.6, 3.0] {
            m.record(ms);
        }
        assert!(m.is_over_budget());
        let p = m.percentiles();
        assert!((p.max - 3.0).abs() < f64::EPSILON);
        assert!((p.over_budget_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(m.tick_count(), 4);
    }

    #[test]
    fn empty_monitor_is_zero() {
        let m = TickBudgetMonitor::new(1.0);
        assert_eq!(m.percentiles(), TickPercentiles::default());
        {
            let _g = m.begin_tick();
        }
        assert_eq!(m.tick_count(), 1);
    }
}
