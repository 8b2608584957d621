//! End-to-end scheduling behaviour driven the way the main loop drives it:
//! advance the clock, collect, run.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tick_scheduler::{Scheduler, TaskId, TaskOwner, TickCounter, TickSource};

fn noop() -> anyhow::Result<()> {
    Ok(())
}

/// Advances `clock` up to and including `target`, recording which ids were
/// collected at each tick.
fn drive(clock: &TickCounter, scheduler: &Scheduler, target: u64) -> Vec<(u64, Vec<TaskId>, Vec<TaskId>)> {
    let mut seen = Vec::new();
    while clock.current_tick() < target {
        let tick = clock.advance();
        let due = scheduler.collect(tick);
        if !due.is_empty() {
            seen.push((tick, due.sync_ids(), due.async_ids()));
        }
    }
    seen
}

#[test]
fn test_plugin_scenario_from_tick_100() {
    let clock = Arc::new(TickCounter::starting_at(100));
    let scheduler = Scheduler::new(clock.clone());

    let sync_id = scheduler.run_task_later("P1", noop, 5);
    let timer_id = scheduler.run_task_timer_async("P2", noop, 10, 10);

    let seen = drive(&clock, &scheduler, 115);
    assert_eq!(
        seen,
        vec![
            (105, vec![sync_id], vec![]),
            (110, vec![], vec![timer_id]),
        ]
    );

    // Cancel at tick 115, between the 110 and 120 firings.
    assert!(scheduler.cancel_task(timer_id));

    let seen = drive(&clock, &scheduler, 130);
    assert!(seen.is_empty(), "nothing should fire after cancellation: {:?}", seen);
    assert!(!scheduler.is_pending(timer_id));
}

#[test]
fn test_periodic_task_fires_every_period_until_cancelled() {
    let clock = Arc::new(TickCounter::starting_at(100));
    let scheduler = Scheduler::new(clock.clone());
    let timer_id = scheduler.run_task_timer_async("P2", noop, 10, 10);

    let seen = drive(&clock, &scheduler, 130);
    let fired: Vec<u64> = seen.iter().map(|(tick, _, _)| *tick).collect();
    assert_eq!(fired, vec![110, 120, 130]);
    assert!(seen.iter().all(|(_, sync, asynchronous)| sync.is_empty() && asynchronous == &vec![timer_id]));
}

#[test]
fn test_cancellation_only_suppresses_next_firing_window() {
    let clock = Arc::new(TickCounter::new());
    let scheduler = Scheduler::new(clock.clone());
    let id = scheduler.run_task_timer("P", noop, 3, 3);

    let seen = drive(&clock, &scheduler, 4);
    assert_eq!(seen, vec![(3, vec![id], vec![])]);

    scheduler.cancel_task(id);
    assert!(drive(&clock, &scheduler, 20).is_empty());
}

#[test]
fn test_task_never_collected_early() {
    for delay in 1..=12i64 {
        let clock = Arc::new(TickCounter::starting_at(40));
        let scheduler = Scheduler::new(clock.clone());
        let id = scheduler.run_task_later("P", noop, delay);

        let seen = drive(&clock, &scheduler, 60);
        assert_eq!(seen, vec![(40 + delay as u64, vec![id], vec![])], "delay {}", delay);
    }
}

#[test]
fn test_zero_and_negative_delay_match_delay_one() {
    let clock = Arc::new(TickCounter::starting_at(7));
    let scheduler = Scheduler::new(clock.clone());
    let one = scheduler.run_task_later("P", noop, 1);
    let zero = scheduler.run_task_later("P", noop, 0);
    let negative = scheduler.run_task_later("P", noop, -3);
    let immediate = scheduler.run_task("P", noop);

    let seen = drive(&clock, &scheduler, 10);
    assert_eq!(seen, vec![(8, vec![one, zero, negative, immediate], vec![])]);
}

#[test]
fn test_owner_cancellation_regardless_of_registration_order() {
    let clock = Arc::new(TickCounter::new());
    let scheduler = Scheduler::new(clock.clone());

    let mut survivors = Vec::new();
    for i in 0..20 {
        let owner = if i % 3 == 0 { "unloading" } else { "staying" };
        let id = scheduler.run_task_later(owner, noop, 2);
        if owner == "staying" {
            survivors.push(id);
        }
    }

    scheduler.cancel_tasks_for_owner(&TaskOwner::new("unloading"));
    let seen = drive(&clock, &scheduler, 3);
    assert_eq!(seen, vec![(2, survivors, vec![])]);
}

#[test]
fn test_consecutive_ids_are_distinct() {
    let clock = Arc::new(TickCounter::new());
    let scheduler = Scheduler::new(clock);
    let ids: HashSet<TaskId> = (0..10_000).map(|_| scheduler.run_task_async("P", noop)).collect();
    assert_eq!(ids.len(), 10_000);
}

#[test]
fn test_concurrent_registration_and_collection() {
    let clock = Arc::new(TickCounter::new());
    let scheduler = Arc::new(Scheduler::new(clock.clone()));
    let executed = Arc::new(AtomicUsize::new(0));

    let registrars: Vec<_> = (0..4)
        .map(|worker| {
            let scheduler = scheduler.clone();
            let executed = executed.clone();
            thread::spawn(move || {
                let owner = format!("plugin-{}", worker);
                (0..250)
                    .map(|i| {
                        let executed = executed.clone();
                        scheduler.run_task_later(
                            owner.clone(),
                            move || {
                                executed.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            },
                            (i % 5) + 1,
                        )
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all_ids = HashSet::new();
    for registrar in registrars {
        for id in registrar.join().expect("registrar panicked") {
            assert!(all_ids.insert(id));
        }
    }

    // Registration raced with nothing advancing the clock, so every task is
    // due within the next five ticks.
    for _ in 0..5 {
        let tick = clock.advance();
        for task in scheduler.collect(tick).sync_tasks {
            task.run().expect("task should succeed");
        }
    }

    assert_eq!(executed.load(Ordering::SeqCst), 1000);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_cancellation_racing_collection_is_all_or_nothing_per_firing() {
    let clock = Arc::new(TickCounter::new());
    let scheduler = Arc::new(Scheduler::new(clock.clone()));
    let ids: Vec<TaskId> = (0..500)
        .map(|_| scheduler.run_task_timer("P", noop, 1, 1))
        .collect();

    let canceller = {
        let scheduler = scheduler.clone();
        let ids = ids.clone();
        thread::spawn(move || {
            for id in ids {
                scheduler.cancel_task(id);
            }
        })
    };

    let mut fired_per_id = std::collections::HashMap::<TaskId, usize>::new();
    for _ in 0..3 {
        let tick = clock.advance();
        for task in scheduler.collect(tick).sync_tasks {
            *fired_per_id.entry(task.id()).or_default() += 1;
        }
    }
    canceller.join().expect("canceller panicked");

    // Drain whatever is left; every task must end up gone once its
    // cancellation has been observed.
    for _ in 0..3 {
        let tick = clock.advance();
        for task in scheduler.collect(tick).sync_tasks {
            *fired_per_id.entry(task.id()).or_default() += 1;
        }
    }
    assert_eq!(scheduler.pending_count(), 0);
    assert!(fired_per_id.values().all(|count| *count <= 3));
}
