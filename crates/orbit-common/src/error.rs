use crate::time::TimePoint;
use thiserror::Error;
use tracing::error;

/// Kernel error types.
///
/// Everything here is a programmer or capacity error. Control loops report
/// recoverable failures (a sensor that did not answer, a bus that timed out)
/// as ordinary data and never through this type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Every scheduler slot already holds a live task.
    #[error("scheduler full: all {capacity} task slots are in use")]
    SchedulerFull {
        /// Number of slots the scheduler was built with.
        capacity: usize,
    },

    /// A task was resumed after completion, or without a body.
    #[error("cannot resume a task in state {state}")]
    InvalidResume {
        /// State of the task at the time of the call.
        state: String,
    },

    /// A peripheral's live handle count would have gone negative.
    #[error("reference count underflow on peripheral {peripheral}")]
    RefcountUnderflow {
        /// Type name of the peripheral's device.
        peripheral: String,
    },

    /// Virtual time did not reach its target within the step budget.
    #[error("virtual clock did not converge on {target} after {steps} steps")]
    ClockDidNotConverge {
        /// Requested time.
        target: TimePoint,
        /// Steps taken before giving up.
        steps: usize,
    },

    /// The reactor's interrupt thread could not be started or joined.
    #[error("reactor thread error: {0}")]
    ReactorThread(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),

    /// A simulation log record could not be decoded.
    #[error("malformed simulation log record: {0}")]
    LogDecode(String),
}

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenience type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Halt on an unrecoverable kernel error.
///
/// On target this is where the board would record the fault and reset. Off
/// target we log the error and panic so the test or simulation stops at the
/// point of failure.
#[track_caller]
pub fn fatal(err: KernelError) -> ! {
    let location = std::panic::Location::caller();
    error!(
        file = location.file(),
        line = location.line(),
        "fatal kernel error: {err}"
    );
    panic!("fatal kernel error: {err}");
}
