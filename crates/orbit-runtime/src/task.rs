//! Suspendable control loops.
//!
//! A [`Task`] wraps an `async` body. The body receives a [`TaskContext`] and
//! suspends by awaiting one of its wake requests:
//!
//! ```ignore
//! let task = Task::new(|cx| async move {
//!     loop {
//!         sample_sensor();
//!         cx.delay(Duration::from_millis(100)).await;
//!     }
//! });
//! ```
//!
//! Tasks are polled with a no-op waker. Nothing wakes a task from the
//! outside; the scheduler decides readiness from the request the body left
//! behind when it last suspended.

use orbit_common::error::{KernelError, KernelResult};
use orbit_common::time::TimePoint;
use orbit_time::Clock;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// Readiness predicate for condition waits.
pub type ReadyCondition = Box<dyn Fn() -> bool>;

/// What a suspended body asked for.
pub enum WakeRequest {
    /// Resume once this much time has passed since the suspension.
    Delay(Duration),
    /// Resume at or after this instant.
    At(TimePoint),
    /// Resume once the predicate holds.
    When(ReadyCondition),
}

impl fmt::Debug for WakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delay(d) => f.debug_tuple("Delay").field(d).finish(),
            Self::At(t) => f.debug_tuple("At").field(t).finish(),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

type RequestSlot = Rc<RefCell<Option<WakeRequest>>>;

/// Handle a task body uses to suspend itself.
///
/// Bound to the task it was created for; a spawned task gets its own.
#[derive(Default)]
pub struct TaskContext {
    request: RequestSlot,
}

impl TaskContext {
    /// Suspend for at least `duration`, measured from the moment of
    /// suspension.
    pub fn delay(&self, duration: Duration) -> Suspend {
        self.suspend(WakeRequest::Delay(duration))
    }

    /// Suspend until `wake_time`.
    pub fn until(&self, wake_time: TimePoint) -> Suspend {
        self.suspend(WakeRequest::At(wake_time))
    }

    /// Give the other tasks a turn. The task is ready again on the next pass.
    pub fn yield_now(&self) -> Suspend {
        self.delay(Duration::ZERO)
    }

    /// Suspend until `condition` returns true.
    ///
    /// The condition is polled once per scheduler pass.
    pub fn wait_for<F>(&self, condition: F) -> Suspend
    where
        F: Fn() -> bool + 'static,
    {
        self.suspend(WakeRequest::When(Box::new(condition)))
    }

    fn suspend(&self, request: WakeRequest) -> Suspend {
        Suspend {
            request: Some(request),
            slot: Rc::clone(&self.request),
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("pending", &self.request.borrow().is_some())
            .finish()
    }
}

/// Suspension point. Pending on the first poll, ready on the next.
#[must_use = "futures do nothing unless you `.await` them"]
#[derive(Debug)]
pub struct Suspend {
    request: Option<WakeRequest>,
    slot: RequestSlot,
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        match self.request.take() {
            Some(request) => {
                *self.slot.borrow_mut() = Some(request);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

/// When a suspended task becomes ready.
enum Wake {
    At(TimePoint),
    When(ReadyCondition),
}

/// Lifecycle of a [`Task`].
enum TaskState {
    NotStarted,
    Suspended(Wake),
    Completed,
    Invalid,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Suspended(Wake::At(t)) => write!(f, "suspended until {t}"),
            Self::Suspended(Wake::When(_)) => write!(f, "waiting on condition"),
            Self::Completed => write!(f, "completed"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// A suspendable control loop.
///
/// Exclusively owned: moved into the scheduler, never copied. A default
/// task is invalid and marks an empty scheduler slot.
pub struct Task {
    body: Option<Pin<Box<dyn Future<Output = ()>>>>,
    request: RequestSlot,
    state: TaskState,
}

impl Task {
    /// Build a task from its body.
    ///
    /// The body does not start running until the first [`Task::resume`].
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let cx = TaskContext::default();
        let request = Rc::clone(&cx.request);
        Self {
            body: Some(Box::pin(body(cx))),
            request,
            state: TaskState::NotStarted,
        }
    }

    /// Whether this task was built from a body.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self.state, TaskState::Invalid)
    }

    /// Whether the body has returned.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, TaskState::Completed)
    }

    /// Whether the task wants to run at `now`.
    #[must_use]
    pub fn is_ready(&self, now: TimePoint) -> bool {
        match &self.state {
            TaskState::NotStarted => true,
            TaskState::Suspended(Wake::At(t)) => now >= *t,
            TaskState::Suspended(Wake::When(condition)) => condition(),
            TaskState::Completed | TaskState::Invalid => false,
        }
    }

    /// Instant requested at the last suspension.
    ///
    /// [`TimePoint::ZERO`] before the first resumption; [`TimePoint::MAX`]
    /// for condition waits and for tasks that will never run again.
    #[must_use]
    pub fn next_wake_time(&self) -> TimePoint {
        match &self.state {
            TaskState::NotStarted => TimePoint::ZERO,
            TaskState::Suspended(Wake::At(t)) => *t,
            TaskState::Suspended(Wake::When(_))
            | TaskState::Completed
            | TaskState::Invalid => TimePoint::MAX,
        }
    }

    /// Run the body until it next suspends or returns.
    ///
    /// Relative delays are resolved against `clock` once the body has
    /// suspended. A body that suspends without a request (by awaiting some
    /// other future) is ready again immediately.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidResume`] if the task is invalid or complete.
    pub fn resume(&mut self, clock: &dyn Clock) -> KernelResult<()> {
        let poll = match (&self.state, self.body.as_mut()) {
            (TaskState::NotStarted | TaskState::Suspended(_), Some(body)) => {
                let mut cx = Context::from_waker(Waker::noop());
                body.as_mut().poll(&mut cx)
            }
            _ => {
                return Err(KernelError::InvalidResume {
                    state: self.state.to_string(),
                })
            }
        };

        match poll {
            Poll::Ready(()) => {
                self.body = None;
                self.request.borrow_mut().take();
                self.state = TaskState::Completed;
            }
            Poll::Pending => {
                let wake = match self.request.borrow_mut().take() {
                    Some(WakeRequest::Delay(d)) => Wake::At(clock.now() + d),
                    Some(WakeRequest::At(t)) => Wake::At(t),
                    Some(WakeRequest::When(condition)) => Wake::When(condition),
                    None => Wake::At(clock.now()),
                };
                self.state = TaskState::Suspended(wake);
            }
        }
        Ok(())
    }

    /// Human-readable lifecycle state.
    #[must_use]
    pub fn state_description(&self) -> String {
        self.state.to_string()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self {
            body: None,
            request: RequestSlot::default(),
            state: TaskState::Invalid,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &format_args!("{}", self.state))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_time::VirtualClock;
    use std::cell::Cell;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_default_task_is_invalid() {
        let clock = VirtualClock::frozen();
        let mut task = Task::default();

        assert!(!task.is_valid());
        assert!(!task.is_complete());
        assert!(!task.is_ready(TimePoint::MAX));
        assert_eq!(task.next_wake_time(), TimePoint::MAX);
        assert!(matches!(
            task.resume(&clock),
            Err(KernelError::InvalidResume { .. })
        ));
    }

    #[test]
    fn test_body_runs_lazily() {
        let clock = VirtualClock::frozen();
        let runs = counter();
        let r = Rc::clone(&runs);
        let mut task = Task::new(|_cx| async move {
            r.set(r.get() + 1);
        });

        assert!(task.is_valid());
        assert_eq!(runs.get(), 0);
        assert_eq!(task.next_wake_time(), TimePoint::ZERO);
        assert!(task.is_ready(TimePoint::ZERO));

        task.resume(&clock).unwrap();
        assert_eq!(runs.get(), 1);
        assert!(task.is_complete());
        assert!(task.is_valid());
    }

    #[test]
    fn test_resume_after_completion_fails() {
        let clock = VirtualClock::frozen();
        let mut task = Task::new(|_cx| async {});
        task.resume(&clock).unwrap();

        let err = task.resume(&clock).unwrap_err();
        assert_eq!(
            err,
            KernelError::InvalidResume {
                state: "completed".into()
            }
        );
    }

    #[test]
    fn test_delay_resolved_at_suspension() {
        let clock = VirtualClock::frozen();
        clock.increment_current_time_micros(7);

        let mut task = Task::new(|cx| async move {
            cx.delay(Duration::from_micros(10)).await;
        });
        task.resume(&clock).unwrap();

        assert_eq!(task.next_wake_time(), TimePoint::from_micros(17));
        assert!(!task.is_ready(TimePoint::from_micros(16)));
        assert!(task.is_ready(TimePoint::from_micros(17)));

        task.resume(&clock).unwrap();
        assert!(task.is_complete());
    }

    #[test]
    fn test_until_is_absolute() {
        let clock = VirtualClock::frozen();
        let mut task = Task::new(|cx| async move {
            loop {
                cx.until(TimePoint::from_millis(3)).await;
            }
        });
        task.resume(&clock).unwrap();
        assert_eq!(task.next_wake_time(), TimePoint::from_millis(3));

        clock.increment_current_time_millis(5);
        task.resume(&clock).unwrap();
        assert_eq!(task.next_wake_time(), TimePoint::from_millis(3));
    }

    #[test]
    fn test_yield_is_ready_immediately() {
        let clock = VirtualClock::frozen();
        let mut task = Task::new(|cx| async move {
            loop {
                cx.yield_now().await;
            }
        });
        task.resume(&clock).unwrap();

        assert_eq!(task.next_wake_time(), clock.now());
        assert!(task.is_ready(clock.now()));
    }

    #[test]
    fn test_wake_requests_stay_with_their_task() {
        let clock = VirtualClock::frozen();
        let mut short = Task::new(|cx| async move {
            cx.delay(Duration::from_millis(10)).await;
        });
        let mut long = Task::new(|cx| async move {
            cx.delay(Duration::from_millis(20)).await;
        });
        short.resume(&clock).unwrap();
        long.resume(&clock).unwrap();

        assert_eq!(short.next_wake_time(), TimePoint::from_millis(10));
        assert_eq!(long.next_wake_time(), TimePoint::from_millis(20));

        clock.increment_current_time_millis(10);
        short.resume(&clock).unwrap();
        assert!(short.is_complete());
        assert!(!long.is_ready(clock.now()));
        assert_eq!(long.next_wake_time(), TimePoint::from_millis(20));
    }

    #[test]
    fn test_condition_wait() {
        let clock = VirtualClock::frozen();
        let flag = Rc::new(Cell::new(false));
        let f = Rc::clone(&flag);
        let mut task = Task::new(|cx| async move {
            cx.wait_for(move || f.get()).await;
        });
        task.resume(&clock).unwrap();

        assert_eq!(task.next_wake_time(), TimePoint::MAX);
        assert!(!task.is_ready(TimePoint::MAX));

        flag.set(true);
        assert!(task.is_ready(TimePoint::ZERO));
        task.resume(&clock).unwrap();
        assert!(task.is_complete());
    }

    #[test]
    fn test_foreign_pending_is_ready_immediately() {
        struct PendingOnce(bool);

        impl Future for PendingOnce {
            type Output = ();

            fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
                if self.0 {
                    Poll::Ready(())
                } else {
                    self.0 = true;
                    Poll::Pending
                }
            }
        }

        let clock = VirtualClock::frozen();
        let mut task = Task::new(|_cx| PendingOnce(false));
        task.resume(&clock).unwrap();

        assert!(!task.is_complete());
        assert!(task.is_ready(clock.now()));
        task.resume(&clock).unwrap();
        assert!(task.is_complete());
    }

    #[test]
    fn test_dropping_task_drops_body_state() {
        let witness = Rc::new(());
        let held = Rc::clone(&witness);
        let clock = VirtualClock::frozen();

        let mut task = Task::new(|cx| async move {
            let _held = held;
            loop {
                cx.yield_now().await;
            }
        });
        task.resume(&clock).unwrap();
        assert_eq!(Rc::strong_count(&witness), 2);

        drop(task);
        assert_eq!(Rc::strong_count(&witness), 1);
    }

    #[test]
    fn test_state_description() {
        let clock = VirtualClock::frozen();
        let mut task = Task::new(|cx| async move {
            cx.delay(Duration::from_secs(1)).await;
        });
        assert_eq!(task.state_description(), "not started");

        task.resume(&clock).unwrap();
        assert_eq!(task.state_description(), "suspended until T+1.000000s");
        assert_eq!(Task::default().state_description(), "invalid");
    }
}
