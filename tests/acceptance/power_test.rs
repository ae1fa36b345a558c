//! Peripheral power acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A port shared by several tasks is powered once and released once
//! - Power transitions are recorded in the simulation log at the virtual
//!   time they happen
//! - Handles cloned into spawned tasks keep the port powered

use super::common::{frozen_clock, function_calls, logger_in, read_events, CountingDevice};
use orbit_common::time::TimePoint;
use orbit_hal::Peripheral;
use orbit_runtime::{Scheduler, Task};
use orbit_sim::Interceptor;
use orbit_time::Clock;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

type Port = Peripheral<Interceptor<CountingDevice>>;

fn hold(port: Arc<Port>, from: TimePoint, until: TimePoint) -> Task {
    Task::new(move |cx| async move {
        cx.until(from).await;
        let handle = port.access();
        cx.until(until).await;
        drop(handle);
    })
}

#[test]
fn test_shared_port_powered_once() {
    let dir = tempfile::tempdir().unwrap();
    let logger = logger_in(&dir, "power.log");
    let (clock, dyn_clock) = frozen_clock();
    let port = Peripheral::new(Interceptor::new(
        CountingDevice::default(),
        Arc::clone(&dyn_clock),
        Arc::clone(&logger),
    ));

    let ref_counts = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = Scheduler::with_capacity(Arc::clone(&dyn_clock), 4);
    scheduler
        .add_task(hold(
            Arc::clone(&port),
            TimePoint::ZERO,
            TimePoint::from_millis(30),
        ))
        .unwrap();
    scheduler
        .add_task(hold(
            Arc::clone(&port),
            TimePoint::from_millis(10),
            TimePoint::from_millis(50),
        ))
        .unwrap();
    {
        let port = Arc::clone(&port);
        let ref_counts = Rc::clone(&ref_counts);
        scheduler
            .add_task(Task::new(move |cx| async move {
                for ms in [20, 40, 60] {
                    cx.until(TimePoint::from_millis(ms)).await;
                    ref_counts.borrow_mut().push(port.ref_count());
                }
            }))
            .unwrap();
    }

    scheduler.run_until(TimePoint::from_secs(1)).unwrap();

    assert_eq!(*ref_counts.borrow(), vec![2, 1, 0]);
    assert_eq!(port.device().inner().enables(), 1);
    assert_eq!(port.device().inner().disables(), 1);
    assert!(!port.is_enabled());
    assert_eq!(clock.now(), TimePoint::from_millis(60));

    let calls = function_calls(&read_events(&logger));
    assert_eq!(
        calls,
        vec![(0, "enable".to_string()), (50_000, "disable".to_string())]
    );
}

#[test]
fn test_cloned_handle_outlives_parent() {
    let dir = tempfile::tempdir().unwrap();
    let logger = logger_in(&dir, "clone.log");
    let (_clock, dyn_clock) = frozen_clock();
    let port = Peripheral::new(Interceptor::new(
        CountingDevice::default(),
        Arc::clone(&dyn_clock),
        Arc::clone(&logger),
    ));

    let mut scheduler = Scheduler::with_capacity(Arc::clone(&dyn_clock), 2);
    let spawner = scheduler.spawner();
    {
        let port = Arc::clone(&port);
        scheduler
            .add_task(Task::new(move |_cx| async move {
                let handle = port.access();
                let child_handle = handle.clone();
                spawner.spawn(Task::new(move |cx| async move {
                    cx.delay(Duration::from_millis(20)).await;
                    drop(child_handle);
                }));
                drop(handle);
            }))
            .unwrap();
    }

    scheduler.run_until(TimePoint::from_secs(1)).unwrap();

    assert_eq!(port.ref_count(), 0);
    assert_eq!(port.device().inner().enables(), 1);
    assert_eq!(port.device().inner().disables(), 1);
    let calls = function_calls(&read_events(&logger));
    assert_eq!(
        calls,
        vec![(0, "enable".to_string()), (20_000, "disable".to_string())]
    );
}
