//! End-to-end exploration scenarios through the scripted simulator.

use mcmini::checker::{Callbacks, CheckerConfig, ClassicDpor, ExplorationReport, Violation};
use mcmini::coordinator::{default_registry, Coordinator};
use mcmini::model::ProgramState;
use mcmini::sim::{SimOp, SimProcessSource, SimProgram};

fn explore(scripts: Vec<Vec<SimOp>>, config: CheckerConfig) -> ExplorationReport {
    let source = SimProcessSource::new(SimProgram::new(scripts));
    let mut coordinator = Coordinator::new(
        ProgramState::with_main_thread(),
        default_registry(),
        Box::new(source),
    )
    .expect("simulated process spawns");
    ClassicDpor::new(config)
        .verify(&mut coordinator, &mut Callbacks::none())
        .expect("exploration completes")
}

#[test]
fn two_locks_reverse_order_deadlocks() {
    // T1 locks m0 then m1; T2 locks m1 then m0.
    let report = explore(
        vec![
            vec![
                SimOp::MutexInit(0),
                SimOp::MutexInit(1),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![
                SimOp::MutexLock(0),
                SimOp::MutexLock(1),
                SimOp::MutexUnlock(1),
                SimOp::MutexUnlock(0),
            ],
            vec![
                SimOp::MutexLock(1),
                SimOp::MutexLock(0),
                SimOp::MutexUnlock(0),
                SimOp::MutexUnlock(1),
            ],
        ],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert!(report.deadlock_count() >= 1, "deadlock must be found");
    assert!(
        report.traces_explored <= 6,
        "classic DPOR explores at most 6 distinct traces, got {}",
        report.traces_explored
    );
}

#[test]
fn first_deadlock_stops_exploration() {
    let report = explore(
        vec![
            vec![
                SimOp::MutexInit(0),
                SimOp::MutexInit(1),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![
                SimOp::MutexLock(0),
                SimOp::MutexLock(1),
                SimOp::MutexUnlock(1),
                SimOp::MutexUnlock(0),
            ],
            vec![
                SimOp::MutexLock(1),
                SimOp::MutexLock(0),
                SimOp::MutexUnlock(0),
                SimOp::MutexUnlock(1),
            ],
        ],
        CheckerConfig::new().first_deadlock(true),
    );

    assert_eq!(report.deadlock_count(), 1);
    assert!(!report.completed, "the search stops at the first deadlock");
}

#[test]
fn reader_writer_sections_do_not_deadlock() {
    // One reader and one writer taking the same guard mutex, one pass
    // each.
    let report = explore(
        vec![
            vec![
                SimOp::MutexInit(0),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![SimOp::MutexLock(0), SimOp::MutexUnlock(0)],
            vec![SimOp::MutexLock(0), SimOp::MutexUnlock(0)],
        ],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert_eq!(report.deadlock_count(), 0);
    assert!(report.traces_explored >= 1);
}

#[test]
fn producer_consumer_semaphore_is_one_trace() {
    // Counting semaphore initialized to 0: the consumer's wait cannot
    // execute before the post, so DPOR sees a single equivalence class.
    let report = explore(
        vec![
            vec![
                SimOp::SemInit(0, 0),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![SimOp::SemPost(0)],
            vec![SimOp::SemWait(0)],
        ],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert_eq!(report.deadlock_count(), 0);
    assert_eq!(
        report.traces_explored, 1,
        "expected exactly one trace, got {}",
        report.traces_explored
    );
}

#[test]
fn unbalanced_unlock_is_undefined_behavior() {
    // T1 locks m; T2 unlocks it. Whatever the schedule, the unlock runs
    // on a mutex its executor does not hold.
    let report = explore(
        vec![
            vec![
                SimOp::MutexInit(0),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![SimOp::MutexLock(0), SimOp::MutexUnlock(0)],
            vec![SimOp::MutexUnlock(0)],
        ],
        CheckerConfig::new(),
    );

    assert!(report.undefined_behavior_count() >= 1);
    assert!(
        !report.completed,
        "the default configuration halts on undefined behavior"
    );
    let ub = report
        .violations
        .iter()
        .find_map(|v| match v {
            Violation::UndefinedBehavior { message, .. } => Some(message.clone()),
            _ => None,
        })
        .expect("an undefined-behavior violation");
    assert!(ub.contains("unlock"), "report names the unlock: {ub}");
}

#[test]
fn double_init_is_admitted() {
    let report = explore(
        vec![vec![SimOp::MutexInit(0), SimOp::MutexInit(0)]],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert!(!report.has_violations());
    assert_eq!(report.traces_explored, 1);
}

#[test]
fn signal_with_no_waiters_is_a_noop() {
    let report = explore(
        vec![vec![
            SimOp::CondInit(0),
            SimOp::CondSignal(0),
            SimOp::CondDestroy(0),
        ]],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert!(!report.has_violations());
    assert_eq!(report.traces_explored, 1);
}

#[test]
fn lost_wakeup_deadlocks_in_some_schedule() {
    // Consumer waits on a condition variable without a predicate;
    // producer signals once. Schedules where the signal precedes the
    // enqueue lose the wakeup and the consumer sleeps forever.
    let report = explore(
        vec![
            vec![
                SimOp::MutexInit(0),
                SimOp::CondInit(0),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![
                SimOp::MutexLock(0),
                SimOp::CondWait { cond: 0, mutex: 0 },
                SimOp::MutexUnlock(0),
            ],
            vec![
                SimOp::MutexLock(0),
                SimOp::CondSignal(0),
                SimOp::MutexUnlock(0),
            ],
        ],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert!(
        report.deadlock_count() >= 1,
        "the lost wakeup must surface as a deadlock"
    );
    assert!(
        report.traces_explored > report.deadlock_count() as u64,
        "schedules where the enqueue wins complete normally"
    );
}

#[test]
fn semaphore_handoff_chain_completes() {
    // Two workers chained by semaphores; the order is fully determined.
    let report = explore(
        vec![
            vec![
                SimOp::SemInit(0, 0),
                SimOp::SemInit(1, 0),
                SimOp::Spawn(1),
                SimOp::Spawn(2),
                SimOp::Join(1),
                SimOp::Join(2),
            ],
            vec![SimOp::SemPost(0), SimOp::SemWait(1)],
            vec![SimOp::SemWait(0), SimOp::SemPost(1)],
        ],
        CheckerConfig::new(),
    );

    assert!(report.completed);
    assert_eq!(report.deadlock_count(), 0);
}

#[test]
fn depth_bound_reports_starvation_when_asked() {
    let report = explore(
        vec![
            vec![SimOp::Spawn(1), SimOp::Join(1)],
            vec![
                SimOp::MutexInit(0),
                SimOp::MutexLock(0),
                SimOp::MutexUnlock(0),
                SimOp::MutexLock(0),
                SimOp::MutexUnlock(0),
            ],
        ],
        CheckerConfig::new()
            .max_depth_per_thread(Some(3))
            .check_forward_progress(true),
    );

    assert!(report.completed);
    assert_eq!(report.deadlock_count(), 0, "a depth cut is not a deadlock");
    assert!(
        report
            .violations
            .iter()
            .any(|v| matches!(v, Violation::Starvation { .. })),
        "the capped worker is flagged as possibly starved"
    );
}

#[test]
fn cancellation_stops_between_steps() {
    let config = CheckerConfig::new();
    config
        .cancel_flag()
        .store(true, std::sync::atomic::Ordering::Relaxed);
    let report = explore(
        vec![vec![SimOp::MutexInit(0), SimOp::MutexLock(0)]],
        config,
    );

    assert!(!report.completed);
    assert_eq!(report.traces_explored, 0);
}
