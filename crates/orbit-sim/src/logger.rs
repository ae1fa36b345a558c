//! Binary simulation log.
//!
//! Every intercepted driver call and every fired interrupt is written as one
//! record: a little-endian `u32` byte length followed by the JSON encoding of
//! a [`SimEvent`]. [`SimLogReader`] walks a log back.

use orbit_common::config::SimulationConfig;
use orbit_common::error::{KernelError, KernelResult};
use orbit_common::time::TimePoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Largest record the reader accepts.
const MAX_RECORD_LEN: usize = 1 << 20;

/// Counter for unique default log file names.
static LOG_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One simulation log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Virtual time of the event in microseconds since the clock's epoch.
    pub timestamp_us: u64,
    /// What happened.
    pub kind: EventKind,
}

/// Payload of a [`SimEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A driver function was called.
    Function {
        /// Function name.
        name: String,
        /// Source file of the call.
        source_file: String,
        /// Line of the call.
        line_number: u32,
    },
    /// An interrupt fired.
    Irq {
        /// Interrupt number.
        irq_number: u32,
        /// Interrupt name.
        name: String,
    },
}

impl SimEvent {
    /// Event time as a [`TimePoint`].
    #[must_use]
    pub fn timestamp(&self) -> TimePoint {
        TimePoint::from_micros(self.timestamp_us)
    }
}

impl fmt::Display for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.timestamp())?;
        match &self.kind {
            EventKind::Function {
                name,
                source_file,
                line_number,
            } => write!(f, "{name} ({source_file}:{line_number})"),
            EventKind::Irq { irq_number, name } => write!(f, "irq {irq_number} ({name})"),
        }
    }
}

/// Writer side of the simulation log.
///
/// Shared by `Arc` between interceptors and the reactor.
#[derive(Debug)]
pub struct SimLogger {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    records: AtomicU64,
}

impl SimLogger {
    /// Create (or truncate) a log at `path`.
    ///
    /// # Errors
    ///
    /// [`KernelError::Io`] if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> KernelResult<Self> {
        let path = path.into();
        let file = File::create(&path)
            .map_err(|e| KernelError::Io(format!("cannot create {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Simulation log created");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            records: AtomicU64::new(0),
        })
    }

    /// Create a log with a unique name in the system temp directory.
    ///
    /// # Errors
    ///
    /// [`KernelError::Io`] if the file cannot be created.
    pub fn create_temp() -> KernelResult<Self> {
        let pid = std::process::id();
        let counter = LOG_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::create(std::env::temp_dir().join(format!("orbit_sim_{pid}_{counter}.log")))
    }

    /// Create the log named by the configuration, or a temp log if none is
    /// named.
    ///
    /// # Errors
    ///
    /// [`KernelError::Io`] if the file cannot be created.
    pub fn from_config(config: &SimulationConfig) -> KernelResult<Self> {
        match &config.log_file {
            Some(path) => Self::create(path),
            None => Self::create_temp(),
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// [`KernelError::Io`] on encoding or write failure.
    pub fn log(&self, event: &SimEvent) -> KernelResult<()> {
        let body = serde_json::to_vec(event)
            .map_err(|e| KernelError::Io(format!("cannot encode simulation event: {e}")))?;
        let len = u32::try_from(body.len())
            .map_err(|_| KernelError::Io(format!("record of {} bytes is too large", body.len())))?;

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&body)?;
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record a driver function call.
    ///
    /// # Errors
    ///
    /// See [`SimLogger::log`].
    pub fn log_fn(
        &self,
        now: TimePoint,
        name: &str,
        source_file: &str,
        line_number: u32,
    ) -> KernelResult<()> {
        self.log(&SimEvent {
            timestamp_us: now.as_micros(),
            kind: EventKind::Function {
                name: name.to_string(),
                source_file: source_file.to_string(),
                line_number,
            },
        })
    }

    /// Record a fired interrupt.
    ///
    /// # Errors
    ///
    /// See [`SimLogger::log`].
    pub fn log_irq(&self, now: TimePoint, irq_number: u32, name: &str) -> KernelResult<()> {
        self.log(&SimEvent {
            timestamp_us: now.as_micros(),
            kind: EventKind::Irq {
                irq_number,
                name: name.to_string(),
            },
        })
    }

    /// Push buffered records to the file.
    ///
    /// # Errors
    ///
    /// [`KernelError::Io`] on write failure.
    pub fn flush(&self) -> KernelResult<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.flush()?;
        Ok(())
    }
}

/// Reader side of the simulation log.
#[derive(Debug)]
pub struct SimLogReader<R> {
    reader: R,
    failed: bool,
}

impl SimLogReader<BufReader<File>> {
    /// Open a log file.
    ///
    /// # Errors
    ///
    /// [`KernelError::Io`] if the file cannot be opened.
    pub fn open(path: &Path) -> KernelResult<Self> {
        let file = File::open(path)
            .map_err(|e| KernelError::Io(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> SimLogReader<R> {
    /// Read records from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            failed: false,
        }
    }

    /// Read the next record, or `None` at a clean end of log.
    ///
    /// # Errors
    ///
    /// [`KernelError::LogDecode`] for truncated or malformed records,
    /// [`KernelError::Io`] for read failures.
    pub fn read_event(&mut self) -> KernelResult<Option<SimEvent>> {
        let Some(prefix) = self.read_prefix()? else {
            return Ok(None);
        };
        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_RECORD_LEN {
            return Err(KernelError::LogDecode(format!(
                "record length {len} exceeds {MAX_RECORD_LEN}"
            )));
        }

        let mut body = vec![0; len];
        self.reader.read_exact(&mut body).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                KernelError::LogDecode(format!("truncated record, expected {len} bytes"))
            }
            _ => KernelError::from(e),
        })?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| KernelError::LogDecode(e.to_string()))
    }

    fn read_prefix(&mut self) -> KernelResult<Option<[u8; 4]>> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(KernelError::LogDecode(
                        "truncated length prefix".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(prefix))
    }
}

impl<R: Read> Iterator for SimLogReader<R> {
    type Item = KernelResult<SimEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.read_event().transpose();
        if matches!(result, Some(Err(_))) {
            self.failed = true;
        }
        result
    }
}
