//! Simulated interrupt acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - The system tick stays in step with tasks sleeping on the virtual clock
//! - Every interrupt is recorded once, in time order
//! - Driver calls and interrupts share one log, ordered by virtual time

use super::common::{frozen_clock, function_calls, interrupts, logger_in, read_events, CountingDevice};
use orbit_common::config::ReactorConfig;
use orbit_common::time::TimePoint;
use orbit_hal::{Peripheral, SysTick};
use orbit_runtime::{Scheduler, Task};
use orbit_sim::{EventKind, FakeSysTick, Interceptor, Reactor};
use orbit_time::Clock;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_systick_tracks_sleeping_task() {
    let dir = tempfile::tempdir().unwrap();
    let logger = logger_in(&dir, "systick.log");
    let (clock, dyn_clock) = frozen_clock();
    let reactor =
        Reactor::with_logger(&clock, &ReactorConfig::default(), Some(Arc::clone(&logger)))
            .unwrap();
    let systick = Arc::new(FakeSysTick::new());
    reactor.add_generator(systick.clone());

    let samples = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = Scheduler::with_capacity(dyn_clock, 1);
    {
        let systick = Arc::clone(&systick);
        let samples = Rc::clone(&samples);
        scheduler
            .add_task(Task::new(move |cx| async move {
                for _ in 0..3 {
                    cx.delay(Duration::from_millis(10)).await;
                    samples.borrow_mut().push(systick.current_time_micros());
                }
            }))
            .unwrap();
    }

    scheduler.run_until(TimePoint::from_secs(1)).unwrap();

    assert_eq!(*samples.borrow(), vec![10_000, 20_000, 30_000]);
    assert_eq!(clock.now(), TimePoint::from_millis(30));
    assert_eq!(reactor.interrupts_fired(), 30);
    reactor.shutdown();

    let irqs = interrupts(&read_events(&logger));
    let expected: Vec<(u64, u32)> = (1..=30).map(|k| (k * 1000, FakeSysTick::IRQ)).collect();
    assert_eq!(irqs, expected);
}

#[test]
fn test_driver_calls_interleave_with_interrupts() {
    let dir = tempfile::tempdir().unwrap();
    let logger = logger_in(&dir, "mixed.log");
    let (clock, dyn_clock) = frozen_clock();
    let reactor =
        Reactor::with_logger(&clock, &ReactorConfig::default(), Some(Arc::clone(&logger)))
            .unwrap();
    reactor.add_generator(Arc::new(FakeSysTick::new()));

    let port = Peripheral::new(Interceptor::new(
        CountingDevice::default(),
        Arc::clone(&dyn_clock),
        Arc::clone(&logger),
    ));
    let mut scheduler = Scheduler::with_capacity(dyn_clock, 1);
    {
        let port = Arc::clone(&port);
        scheduler
            .add_task(Task::new(move |cx| async move {
                cx.until(TimePoint::from_micros(2500)).await;
                let handle = port.access();
                cx.until(TimePoint::from_micros(4500)).await;
                drop(handle);
            }))
            .unwrap();
    }

    scheduler.run_until(TimePoint::from_secs(1)).unwrap();
    reactor.shutdown();

    let events = read_events(&logger);
    let sequence: Vec<(u64, String)> = events
        .iter()
        .map(|event| match &event.kind {
            EventKind::Function { name, .. } => (event.timestamp_us, name.clone()),
            EventKind::Irq { name, .. } => (event.timestamp_us, name.clone()),
        })
        .collect();
    assert_eq!(
        sequence,
        vec![
            (1000, "SysTick".to_string()),
            (2000, "SysTick".to_string()),
            (2500, "enable".to_string()),
            (3000, "SysTick".to_string()),
            (4000, "SysTick".to_string()),
            (4500, "disable".to_string()),
        ]
    );
    assert_eq!(function_calls(&events).len(), 2);
    assert!(events
        .windows(2)
        .all(|pair| pair[0].timestamp_us <= pair[1].timestamp_us));
}
