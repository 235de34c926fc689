//! Rush Benchmark Suite
//!
//! Targets at 20 ticks per second (50ms budget per tick):
//!   idle_tick_active_round ............ < 50μs
//!   population_step ................... < 200μs
//!   dispatch_consume_event ............ < 5μs
//!   full_round_simulation_2min ........ informational

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use rush_core::config::RushConfig;
use rush_core::notify::NullNotifier;
use rush_core::persistence::MemoryStore;
use rush_core::scheduler::TickScheduler;
use rush_core::sim::FlatWorld;
use rush_core::{Orchestrator, Phase};
use rush_host::bridge::EntityRegistry;
use rush_host::hooks;
use rush_host::systems::dispatch;

type Orch = Orchestrator<FlatWorld, MemoryStore>;

fn bench_config(duration_minutes: u64) -> RushConfig {
    let mut config = RushConfig::default();
    config.general.seed = Some(7);
    config.round.countdown_seconds = 1;
    config.round.duration_minutes = duration_minutes;
    config.round.map_radius = 64;
    config
}

/// An orchestrator with `players` participants, ticked into Active.
fn active_round(players: u64, duration_minutes: u64) -> (Orch, EntityRegistry) {
    let mut orch = Orchestrator::new(bench_config(duration_minutes), FlatWorld::new(), MemoryStore::new(), NullNotifier);
    let mut registry = EntityRegistry::new();
    for uid in 1..=players {
        let name = format!("bench{uid}");
        let id = registry.player(uid);
        orch.env_mut().add_participant_with_id(id, &name);
        let _ = dispatch(&mut orch, &mut registry, hooks::on_join(uid, name));
    }
    while orch.current_phase() != Phase::Active {
        orch.tick();
    }
    (orch, registry)
}

/// Benchmark: raw scheduler throughput, 1000 repeating entries.
fn bench_scheduler(c: &mut Criterion) {
    let mut scheduler: TickScheduler<u32> = TickScheduler::new();
    for i in 0..1000u32 {
        scheduler.schedule_repeating(u64::from(i % 20), 20, i);
    }

    c.bench_function("scheduler_tick_1000_entries", |b| {
        b.iter(|| {
            let fired = scheduler.tick();
            black_box(fired);
        });
    });
}

/// Benchmark: one tick while population runs (target: < 200μs).
fn bench_population_step(c: &mut Criterion) {
    c.bench_function("population_step", |b| {
        b.iter_batched(
            || active_round(8, 20).0,
            |mut orch| {
                orch.tick();
                black_box(orch.status());
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark: steady-state tick after population (target: < 50μs).
fn bench_idle_tick(c: &mut Criterion) {
    let (mut orch, _) = active_round(16, 600);
    orch.run_ticks(2_000);

    c.bench_function("idle_tick_active_round", |b| {
        b.iter(|| {
            black_box(orch.tick());
        });
    });
}

/// Benchmark: one host event through the bridge (target: < 5μs).
fn bench_dispatch(c: &mut Criterion) {
    let (mut orch, mut registry) = active_round(16, 600);

    c.bench_function("dispatch_consume_event", |b| {
        b.iter(|| {
            let result = dispatch(&mut orch, &mut registry, hooks::on_item_consume(black_box(3), "BREAD"));
            let _ = black_box(result);
        });
    });
}

/// Benchmark: a complete two-minute round at 20 tps.
fn bench_full_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_round");
    group.sample_size(10);
    group.bench_function("full_round_simulation_2min", |b| {
        b.iter(|| {
            let (mut orch, mut registry) = active_round(12, 2);
            while orch.current_phase() == Phase::Active {
                orch.tick();
                if orch.now() % 20 == 0 {
                    let uid = orch.now() / 20 % 12 + 1;
                    let _ = dispatch(&mut orch, &mut registry, hooks::on_item_consume(uid, "COOKIE"));
                }
            }
            black_box(orch.status());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_scheduler,
    bench_population_step,
    bench_idle_tick,
    bench_dispatch,
    bench_full_round,
);
criterion_main!(benches);
