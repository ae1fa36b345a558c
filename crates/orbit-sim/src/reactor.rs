//! Simulated interrupt controller.
//!
//! The reactor keeps its generators ordered by next fire time and fires them
//! from a dedicated thread. It also registers with the virtual clock as a
//! [`Clockable`]:
//! - `update_time` stops the clock at the earliest pending interrupt
//! - `run` hands the adopted time to the interrupt thread and blocks until
//!   everything due by then has fired
//!
//! Stepping a frozen clock therefore fires every interrupt at its exact time
//! and in order, regardless of thread scheduling on the host.
//!
//! Lock order: clock advance lock, then reactor state, then clock time base.
//! Interrupt handlers run with the reactor state unlocked.

use crate::irq::IrqGenerator;
use crate::logger::SimLogger;
use orbit_common::config::ReactorConfig;
use orbit_common::error::{fatal, KernelError, KernelResult};
use orbit_common::time::TimePoint;
use orbit_time::{Clock, Clockable, ClockableId, VirtualClock};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shortest interval a generator may request. Shorter requests are raised
/// to this so virtual time always moves forward.
pub const MIN_INTERRUPT_INTERVAL: Duration = Duration::from_micros(1);

/// Shortest real-time wait between polls of a scaled clock.
const MIN_POLL_WAIT: Duration = Duration::from_micros(100);

struct EventTiming {
    id: u64,
    next_fire: TimePoint,
    generator: Arc<dyn IrqGenerator>,
}

#[derive(Default)]
struct ReactorState {
    timings: Vec<EventTiming>,
    next_id: u64,
    stop_requested: bool,
    exited: bool,
    /// Latest time a clock step asked the thread to process.
    requested_through: Option<TimePoint>,
    /// Everything due at or before this time has fired.
    processed_through: TimePoint,
    fired: u64,
}

impl ReactorState {
    fn reorder_timings(&mut self) {
        self.timings.sort_by_key(|t| t.next_fire);
    }
}

#[derive(Default)]
struct CoreState {
    pending: bool,
    shutdown: bool,
}

/// Pending-interrupt latch for the simulated core.
#[derive(Default)]
struct CoreSignal {
    state: Mutex<CoreState>,
    cv: Condvar,
}

impl CoreSignal {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        self.lock().pending = true;
        self.cv.notify_all();
    }

    fn release(&self) {
        self.lock().shutdown = true;
        self.cv.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = self.lock();
        let blocked = |s: &mut CoreState| !s.pending && !s.shutdown;
        let mut guard = match timeout {
            None => self
                .cv
                .wait_while(guard, blocked)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.cv
                    .wait_timeout_while(guard, timeout, blocked)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        std::mem::take(&mut guard.pending)
    }
}

struct ReactorShared {
    clock: Arc<VirtualClock>,
    state: Mutex<ReactorState>,
    /// Wakes the interrupt thread.
    work: Condvar,
    /// Wakes clock steps waiting for the thread to catch up.
    caught_up: Condvar,
    core: CoreSignal,
    logger: Option<Arc<SimLogger>>,
    poll_interval: Duration,
}

impl ReactorShared {
    fn lock_state(&self) -> MutexGuard<'_, ReactorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Real time to wait between polls: the poll interval in simulated time.
    fn poll_wait(&self) -> Duration {
        match self.clock.scale() {
            Some(scale) => self.poll_interval.div_f64(scale).max(MIN_POLL_WAIT),
            None => self.poll_interval,
        }
    }

    fn generation_loop(&self) {
        let mut state = self.lock_state();
        loop {
            let wait = self.poll_wait();
            state = self
                .work
                .wait_timeout_while(state, wait, |s| {
                    !s.stop_requested && s.requested_through.is_none()
                })
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            if state.stop_requested {
                break;
            }
            state.requested_through = None;
            drop(state);

            self.generate_irqs_once();
            state = self.lock_state();
        }
    }

    /// Fire every generator that is due, then reschedule them.
    fn generate_irqs_once(&self) {
        let now = self.clock.now();
        let due: Vec<(u64, Arc<dyn IrqGenerator>)> = self
            .lock_state()
            .timings
            .iter()
            .take_while(|t| t.next_fire <= now)
            .map(|t| (t.id, Arc::clone(&t.generator)))
            .collect();

        for (_, generator) in &due {
            self.core.wake();
            if let Some(logger) = &self.logger {
                if let Err(e) = logger.log_irq(now, generator.irq(), generator.irq_name()) {
                    warn!(irq = generator.irq(), "Failed to log interrupt: {e}");
                }
            }
            generator.generate_interrupt(now);
        }

        let after = self.clock.now();
        let mut state = self.lock_state();
        for (id, generator) in &due {
            let interval = clamp_interval(generator.as_ref(), after);
            if let Some(timing) = state.timings.iter_mut().find(|t| t.id == *id) {
                timing.next_fire = after + interval;
            }
        }
        state.reorder_timings();
        state.fired += due.len() as u64;
        state.processed_through = state.processed_through.max(now);
        drop(state);
        self.caught_up.notify_all();
    }
}

fn clamp_interval(generator: &dyn IrqGenerator, now: TimePoint) -> Duration {
    let interval = generator.next_interrupt_in(now);
    if interval < MIN_INTERRUPT_INTERVAL {
        warn!(
            irq = generator.irq(),
            requested_ns = interval.as_nanos() as u64,
            "Interrupt interval below minimum, clamping"
        );
        MIN_INTERRUPT_INTERVAL
    } else {
        interval
    }
}

impl Clockable for ReactorShared {
    fn update_time(&self, proposed: TimePoint) -> TimePoint {
        let state = self.lock_state();
        match state.timings.first() {
            Some(timing) if timing.next_fire < proposed => timing.next_fire,
            _ => proposed,
        }
    }

    fn run(&self, current: TimePoint) {
        let mut state = self.lock_state();
        state.requested_through = Some(
            state
                .requested_through
                .map_or(current, |requested| requested.max(current)),
        );
        self.work.notify_all();
        while state.processed_through < current && !state.stop_requested && !state.exited {
            state = self
                .caught_up
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Marks the reactor as gone when its thread exits, even by panic, so clock
/// steps and core waits never block on a dead thread.
struct ExitGuard<'a>(&'a ReactorShared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.lock_state().exited = true;
        self.0.caught_up.notify_all();
        self.0.core.release();
    }
}

/// Interrupt controller for simulated boards.
pub struct Reactor {
    shared: Arc<ReactorShared>,
    registration: ClockableId,
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Start a reactor on `clock`.
    ///
    /// # Errors
    ///
    /// [`KernelError::ReactorThread`] if the interrupt thread cannot be
    /// spawned.
    pub fn new(clock: &Arc<VirtualClock>, config: &ReactorConfig) -> KernelResult<Self> {
        Self::with_logger(clock, config, None)
    }

    /// Start a reactor that records every fired interrupt to `logger`.
    ///
    /// # Errors
    ///
    /// [`KernelError::ReactorThread`] if the interrupt thread cannot be
    /// spawned.
    pub fn with_logger(
        clock: &Arc<VirtualClock>,
        config: &ReactorConfig,
        logger: Option<Arc<SimLogger>>,
    ) -> KernelResult<Self> {
        let shared = Arc::new(ReactorShared {
            clock: Arc::clone(clock),
            state: Mutex::new(ReactorState {
                processed_through: clock.now(),
                ..ReactorState::default()
            }),
            work: Condvar::new(),
            caught_up: Condvar::new(),
            core: CoreSignal::default(),
            logger,
            poll_interval: config.poll_interval,
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("orbit-reactor".into())
            .spawn(move || {
                let _guard = ExitGuard(&thread_shared);
                thread_shared.generation_loop();
            })
            .map_err(|e| KernelError::ReactorThread(format!("cannot spawn: {e}")))?;

        let weak = Arc::downgrade(&shared);
        let clockable: Weak<dyn Clockable> = weak;
        let registration = clock.register_clockable(clockable);

        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Reactor started"
        );

        Ok(Self {
            shared,
            registration,
            thread: Some(thread),
        })
    }

    /// Register an interrupt source. Its first interrupt is scheduled one
    /// interval from now.
    pub fn add_generator(&self, generator: Arc<dyn IrqGenerator>) {
        let now = self.shared.clock.now();
        let next_fire = now + clamp_interval(generator.as_ref(), now);
        {
            let mut state = self.shared.lock_state();
            let id = state.next_id;
            state.next_id += 1;
            debug!(
                irq = generator.irq(),
                name = generator.irq_name(),
                %next_fire,
                "Interrupt generator added"
            );
            state.timings.push(EventTiming {
                id,
                next_fire,
                generator,
            });
            state.reorder_timings();
        }
        self.shared.work.notify_all();
    }

    /// Number of registered generators.
    pub fn generator_count(&self) -> usize {
        self.shared.lock_state().timings.len()
    }

    /// Earliest pending interrupt.
    pub fn next_fire_time(&self) -> Option<TimePoint> {
        self.shared.lock_state().timings.first().map(|t| t.next_fire)
    }

    /// Interrupts fired so far.
    pub fn interrupts_fired(&self) -> u64 {
        self.shared.lock_state().fired
    }

    /// Block the calling (simulated core) thread until an interrupt fires.
    ///
    /// An interrupt that fired since the last wait is not lost: the call
    /// returns at once. Returns `false` if the reactor shut down instead.
    pub fn wait_for_interrupt(&self) -> bool {
        self.shared.core.wait(None)
    }

    /// Like [`Reactor::wait_for_interrupt`], giving up after `timeout` of real
    /// time.
    pub fn wait_for_interrupt_timeout(&self, timeout: Duration) -> bool {
        self.shared.core.wait(Some(timeout))
    }

    /// Stop the interrupt thread and detach from the clock.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        self.shared.clock.deregister_clockable(self.registration);
        self.shared.lock_state().stop_requested = true;
        self.shared.work.notify_all();
        self.shared.caught_up.notify_all();
        self.shared.core.release();

        if handle.join().is_err() {
            let err = KernelError::ReactorThread("interrupt thread panicked".into());
            if thread::panicking() {
                error!("{err}");
            } else {
                fatal(err);
            }
        }
        info!(fired = self.interrupts_fired(), "Reactor stopped");
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("Reactor")
            .field("generators", &state.timings.len())
            .field("fired", &state.fired)
            .field("processed_through", &state.processed_through)
            .field("running", &self.thread.is_some())
            .finish()
    }
}
