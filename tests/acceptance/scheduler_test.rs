//! Scheduler acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Periodic tasks run at exactly their requested virtual times
//! - Condition waits are re-evaluated at least every `max_idle`
//! - Finished tasks free their slots for tasks spawned later
//! - Configuration loaded from TOML shapes the run loop

use super::common::{frozen_clock, FlagSource};
use orbit_common::config::{KernelConfig, ReactorConfig};
use orbit_common::time::TimePoint;
use orbit_runtime::{Scheduler, SchedulerBuilder, Spawner, Task};
use orbit_sim::Reactor;
use orbit_time::Clock;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

type Trace = Rc<RefCell<Vec<(u64, &'static str)>>>;

fn periodic(clock: Arc<dyn Clock>, name: &'static str, period: Duration, trace: Trace) -> Task {
    Task::new(move |cx| async move {
        loop {
            trace.borrow_mut().push((clock.now().as_millis(), name));
            cx.delay(period).await;
        }
    })
}

#[test]
fn test_periodic_tasks_interleave() {
    let (clock, dyn_clock) = frozen_clock();
    let trace = Trace::default();
    let mut scheduler = Scheduler::with_capacity(Arc::clone(&dyn_clock), 4);
    scheduler
        .add_task(periodic(
            Arc::clone(&dyn_clock),
            "fast",
            Duration::from_millis(10),
            Rc::clone(&trace),
        ))
        .unwrap();
    scheduler
        .add_task(periodic(
            Arc::clone(&dyn_clock),
            "slow",
            Duration::from_millis(25),
            Rc::clone(&trace),
        ))
        .unwrap();

    scheduler.run_until(TimePoint::from_millis(100)).unwrap();

    let mut expected: Vec<(u64, &str)> = Vec::new();
    for ms in (0..100).step_by(10) {
        expected.push((ms, "fast"));
        if ms % 50 == 0 {
            expected.push((ms, "slow"));
        }
        if ms % 50 == 20 {
            expected.push((ms + 5, "slow"));
        }
    }
    assert_eq!(*trace.borrow(), expected);
    assert_eq!(clock.now(), TimePoint::from_millis(100));
    assert_eq!(scheduler.queue_size(), 2);
}

#[test]
fn test_condition_wait_sees_interrupt_flag() {
    let (clock, dyn_clock) = frozen_clock();
    let reactor = Reactor::new(&clock, &ReactorConfig::default()).unwrap();
    let source = FlagSource::new(7, Duration::from_millis(10));
    reactor.add_generator(source.clone());

    let woke_at = Rc::new(RefCell::new(None));
    let mut scheduler = SchedulerBuilder::new(Arc::clone(&dyn_clock))
        .capacity(2)
        .max_idle(Duration::from_millis(1))
        .build();
    {
        let flag = source.flag();
        let clock = Arc::clone(&dyn_clock);
        let woke_at = Rc::clone(&woke_at);
        scheduler
            .add_task(Task::new(move |cx| async move {
                cx.wait_for(move || flag.load(Ordering::SeqCst)).await;
                *woke_at.borrow_mut() = Some(clock.now());
            }))
            .unwrap();
    }

    let passes = scheduler.run_until(TimePoint::from_secs(1)).unwrap();

    assert_eq!(*woke_at.borrow(), Some(TimePoint::from_millis(10)));
    assert_eq!(source.fired_at(), vec![TimePoint::from_millis(10)]);
    assert_eq!(passes, 11);
    assert_eq!(clock.now(), TimePoint::from_millis(10));
    reactor.shutdown();
}

fn worker(clock: Arc<dyn Clock>, trace: Trace) -> Task {
    Task::new(move |cx| async move {
        trace.borrow_mut().push((clock.now().as_millis(), "start"));
        cx.delay(Duration::from_millis(5)).await;
        trace.borrow_mut().push((clock.now().as_millis(), "done"));
    })
}

fn supervisor(clock: Arc<dyn Clock>, spawner: Spawner, workers: u32, trace: Trace) -> Task {
    Task::new(move |cx| async move {
        for _ in 0..workers {
            spawner.spawn(worker(Arc::clone(&clock), Rc::clone(&trace)));
            cx.delay(Duration::from_millis(10)).await;
        }
    })
}

#[test]
fn test_completed_tasks_free_slots() {
    let (clock, dyn_clock) = frozen_clock();
    let trace = Trace::default();
    let mut scheduler = Scheduler::with_capacity(Arc::clone(&dyn_clock), 2);
    let spawner = scheduler.spawner();
    scheduler
        .add_task(supervisor(
            Arc::clone(&dyn_clock),
            spawner,
            10,
            Rc::clone(&trace),
        ))
        .unwrap();

    scheduler.run_until(TimePoint::from_secs(1)).unwrap();

    let expected: Vec<(u64, &str)> = (0..10)
        .flat_map(|i| [(i * 10, "start"), (i * 10 + 5, "done")])
        .collect();
    assert_eq!(*trace.borrow(), expected);
    assert!(scheduler.is_idle());
    assert_eq!(clock.now(), TimePoint::from_millis(100));
}

#[test]
fn test_configured_idle_bound() {
    let config = KernelConfig::from_toml(
        r#"
[scheduler]
capacity = 2
max_idle = "250ms"
"#,
    )
    .unwrap();
    let (clock, dyn_clock) = frozen_clock();
    let mut scheduler = Scheduler::new(dyn_clock, &config.scheduler);
    scheduler
        .add_task(Task::new(|cx| async move {
            cx.wait_for(|| false).await;
        }))
        .unwrap();

    let passes = scheduler.run_until(TimePoint::from_secs(1)).unwrap();

    assert_eq!(scheduler.capacity(), 2);
    assert_eq!(passes, 4);
    assert_eq!(clock.now(), TimePoint::from_secs(1));
    assert_eq!(scheduler.queue_size(), 1);
}
