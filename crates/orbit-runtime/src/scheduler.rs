//! Fixed-capacity cooperative scheduler.
//!
//! The scheduler owns a slot table of [`Task`]s sized once at construction.
//! Each pass walks the slots in index order and resumes every task whose
//! wake time has arrived:
//! 1. Admit tasks spawned since the last pass
//! 2. Resume each ready task, freeing its slot if it completed
//! 3. Admit tasks spawned by that resumption
//! 4. Report the earliest time any task may be ready again
//!
//! There is no priority and no preemption. A task that yields with zero
//! delay runs on every pass.

use crate::task::Task;
use orbit_common::config::SchedulerConfig;
use orbit_common::error::{KernelError, KernelResult};
use orbit_common::time::TimePoint;
use orbit_hal::rcc::{Rcc, RccNoop};
use orbit_time::Clock;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Default upper bound on how long the scheduler sleeps between passes.
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(5);

/// Outcome of one pass over the slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Tasks resumed during the pass.
    pub resumed: usize,
    /// Tasks that completed during the pass.
    pub completed: usize,
    /// Earliest instant any live task may be ready, capped at `now + max_idle`.
    pub next_wakeup: TimePoint,
}

/// Queue for tasks created by running tasks.
///
/// Cloned into task bodies. Spawned tasks are moved into the slot table
/// right after the spawning task's resumption returns.
#[derive(Clone, Default)]
pub struct Spawner {
    pending: Rc<RefCell<VecDeque<Task>>>,
}

impl Spawner {
    /// Queue a task for admission.
    pub fn spawn(&self, task: Task) {
        self.pending.borrow_mut().push_back(task);
    }

    /// Number of tasks waiting for admission.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Cooperative scheduler.
pub struct Scheduler {
    /// Time source for readiness checks and idle sleeps.
    clock: Arc<dyn Clock>,
    /// Core clock tree control.
    rcc: Arc<dyn Rcc>,
    /// Slot table. Invalid tasks mark free slots.
    slots: Box<[Task]>,
    /// Tasks spawned but not yet admitted.
    spawner: Spawner,
    /// Longest sleep between passes.
    max_idle: Duration,
}

impl Scheduler {
    /// Create a scheduler from configuration.
    pub fn new(clock: Arc<dyn Clock>, config: &SchedulerConfig) -> Self {
        Self::with_parts(clock, Arc::new(RccNoop::new()), config.capacity, config.max_idle)
    }

    /// Create a scheduler with `capacity` slots and default settings.
    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self::with_parts(clock, Arc::new(RccNoop::new()), capacity, DEFAULT_MAX_IDLE)
    }

    fn with_parts(
        clock: Arc<dyn Clock>,
        rcc: Arc<dyn Rcc>,
        capacity: usize,
        max_idle: Duration,
    ) -> Self {
        let slots: Vec<Task> = std::iter::repeat_with(Task::default).take(capacity).collect();
        Self {
            clock,
            rcc,
            slots: slots.into_boxed_slice(),
            spawner: Spawner::default(),
            max_idle,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Longest sleep between passes.
    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    /// The scheduler's time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// A spawner feeding this scheduler.
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    /// Move a task into the first free slot.
    ///
    /// # Errors
    ///
    /// [`KernelError::SchedulerFull`] if every slot holds a live task.
    pub fn add_task(&mut self, task: Task) -> KernelResult<usize> {
        let Some(index) = self.slots.iter().position(|slot| !slot.is_valid()) else {
            return Err(KernelError::SchedulerFull {
                capacity: self.capacity(),
            });
        };
        self.slots[index] = task;
        debug!(slot = index, "Task admitted");
        Ok(index)
    }

    /// Take a task out of its slot, freeing the slot.
    ///
    /// Returns `None` if the index is out of range or the slot is empty.
    pub fn remove_task(&mut self, index: usize) -> Option<Task> {
        let slot = self.slots.get_mut(index)?;
        let task = std::mem::take(slot);
        if task.is_valid() {
            debug!(slot = index, "Task removed");
            Some(task)
        } else {
            None
        }
    }

    /// The task in a slot. Empty slots hold an invalid task.
    pub fn task(&self, index: usize) -> Option<&Task> {
        self.slots.get(index)
    }

    /// Number of live tasks.
    pub fn queue_size(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_valid()).count()
    }

    /// Whether there is nothing left to run.
    pub fn is_idle(&self) -> bool {
        self.queue_size() == 0 && self.spawner.pending() == 0
    }

    /// Run one pass over the slot table.
    ///
    /// # Errors
    ///
    /// [`KernelError::SchedulerFull`] if a spawned task finds no free slot.
    /// [`KernelError::InvalidResume`] is never expected here since the pass
    /// only resumes live tasks.
    pub fn run_tasks_once(&mut self) -> KernelResult<PassReport> {
        self.admit_spawned()?;

        let mut resumed = 0;
        let mut completed = 0;
        for index in 0..self.slots.len() {
            let now = self.clock.now();
            let task = &mut self.slots[index];
            if !task.is_valid() || !task.is_ready(now) {
                continue;
            }

            trace!(slot = index, %now, "Resuming task");
            task.resume(self.clock.as_ref())?;
            resumed += 1;

            if task.is_complete() {
                self.slots[index] = Task::default();
                completed += 1;
                debug!(slot = index, %now, "Task completed");
            }

            self.admit_spawned()?;
        }

        let idle_cap = self.clock.now() + self.max_idle;
        let next_wakeup = self
            .slots
            .iter()
            .filter(|slot| slot.is_valid())
            .map(Task::next_wake_time)
            .fold(idle_cap, TimePoint::min);

        Ok(PassReport {
            resumed,
            completed,
            next_wakeup,
        })
    }

    /// Run passes until `stop` is set, sleeping on the clock between them.
    ///
    /// The clock tree is put into its energy-efficient speed first.
    ///
    /// # Errors
    ///
    /// Any error from [`Scheduler::run_tasks_once`].
    pub fn run(&mut self, stop: &AtomicBool) -> KernelResult<()> {
        info!(capacity = self.capacity(), "Entering scheduler loop");
        self.rcc.set_clock_to_energy_efficient_speed();

        let mut passes: u64 = 0;
        while !stop.load(Ordering::Acquire) {
            let report = self.run_tasks_once()?;
            passes += 1;
            self.clock.sleep_until(report.next_wakeup);
        }

        info!(passes, tasks = self.queue_size(), "Scheduler loop exited");
        Ok(())
    }

    /// Run passes until the clock reaches `deadline` or no task remains.
    ///
    /// Returns the number of passes. With a frozen clock and a task that
    /// yields with zero delay, time never moves and this does not return.
    ///
    /// # Errors
    ///
    /// Any error from [`Scheduler::run_tasks_once`].
    pub fn run_until(&mut self, deadline: TimePoint) -> KernelResult<u64> {
        info!(%deadline, capacity = self.capacity(), "Running scheduler until deadline");
        self.rcc.set_clock_to_energy_efficient_speed();

        let mut passes: u64 = 0;
        while self.clock.now() < deadline && !self.is_idle() {
            let report = self.run_tasks_once()?;
            passes += 1;
            if self.is_idle() {
                break;
            }
            self.clock.sleep_until(report.next_wakeup.min(deadline));
        }

        info!(passes, now = %self.clock.now(), tasks = self.queue_size(), "Scheduler run finished");
        Ok(passes)
    }

    fn admit_spawned(&mut self) -> KernelResult<()> {
        loop {
            let next = self.spawner.pending.borrow_mut().pop_front();
            let Some(task) = next else {
                return Ok(());
            };
            self.add_task(task)?;
        }
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for (index, task) in self.slots.iter().enumerate() {
            if task.is_valid() {
                writeln!(f, "  {index}: {}", task.state_description())?;
            } else {
                writeln!(f, "  {index}: empty")?;
            }
        }
        writeln!(f, "]")
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("capacity", &self.capacity())
            .field("queue_size", &self.queue_size())
            .field("max_idle", &self.max_idle)
            .field("spawner", &self.spawner)
            .finish()
    }
}

/// Builder for configuring the scheduler.
pub struct SchedulerBuilder {
    clock: Arc<dyn Clock>,
    rcc: Option<Arc<dyn Rcc>>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Create a new builder around a clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rcc: None,
            config: SchedulerConfig::default(),
        }
    }

    /// Set the number of slots.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the longest sleep between passes.
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.config.max_idle = max_idle;
        self
    }

    /// Set the clock tree control.
    pub fn rcc(mut self, rcc: Arc<dyn Rcc>) -> Self {
        self.rcc = Some(rcc);
        self
    }

    /// Set the full scheduler configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> Scheduler {
        let rcc = self.rcc.unwrap_or_else(|| Arc::new(RccNoop::new()));
        Scheduler::with_parts(self.clock, rcc, self.config.capacity, self.config.max_idle)
    }
}
