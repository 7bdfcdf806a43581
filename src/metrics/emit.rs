//! Periodic snapshot emission.
//!
//! An [`Emitter`] is a background tokio task that wakes every
//! `interval`, reads a metrics [`Source`] and hands the value to a sink:
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use layover::metrics::{Counter, Emitter, EmitterConfig, ReadMode};
//!
//! # async fn run() -> Result<(), layover::Error> {
//! let requests = Counter::new();
//! let emitter = Emitter::spawn(
//!     requests.clone(),
//!     EmitterConfig::new(Duration::from_secs(10), ReadMode::Reset),
//!     |e| println!("{} requests in the last 10s (at {})", e.value, e.timestamp),
//! )?;
//! // ...
//! emitter.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Read modes
//!
//! [`ReadMode::Peek`] leaves the source untouched. [`ReadMode::Reset`]
//! reads and clears in one critical section, so consecutive emissions
//! partition the recorded events: nothing is counted twice or dropped. A
//! reset emitter also clears the value for every other reader of the same
//! object, so attach at most one per object.
//!
//! # Sinks
//!
//! The sink runs on the emitter task. A sink that blocks delays the next
//! snapshot; no timeout is applied. A sink that panics is logged and the
//! emitter keeps ticking. A snapshot taken in reset mode cannot be put
//! back, so its value is written into the error event as `lost`.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Error;

/// A metrics object an [`Emitter`] can read.
pub trait Source: Send + Sync + 'static {
    type Snapshot: fmt::Debug + Send + 'static;

    /// Current value, without mutation.
    fn peek(&self) -> Self::Snapshot;

    /// Current value, atomically cleared.
    fn take(&self) -> Self::Snapshot;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadMode {
    #[default]
    Peek,
    Reset,
}

/// Emitter parameters, checked by [`Emitter::spawn`].
#[derive(Clone, Debug)]
pub struct EmitterConfig {
    /// Time between emissions. Must be non-zero.
    pub interval: Duration,
    pub mode: ReadMode,
    /// Cancelling this token stops the emitter at its next wakeup. Share a
    /// parent's child token to tie emitters to application shutdown.
    pub shutdown: CancellationToken,
}

impl EmitterConfig {
    pub fn new(interval: Duration, mode: ReadMode) -> Self {
        Self { interval, mode, shutdown: CancellationToken::new() }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("emitter interval must be non-zero"));
        }
        Ok(())
    }
}

/// One snapshot as delivered to a sink.
#[derive(Clone, Debug, PartialEq)]
pub struct Emission<T> {
    pub timestamp: DateTime<Utc>,
    pub value: T,
}

/// Handle to a running emitter task.
///
/// Dropping the handle does not stop the task; cancel it through
/// [`Emitter::cancel`], [`Emitter::shutdown`] or the configured token.
pub struct Emitter {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Emitter {
    /// Starts emitting `source` into `sink` on the current tokio runtime.
    pub fn spawn<S, F>(source: S, config: EmitterConfig, sink: F) -> Result<Self, Error>
    where
        S: Source,
        F: Fn(Emission<S::Snapshot>) + Send + 'static,
    {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let shutdown = config.shutdown.clone();
        let task = runtime.spawn(run(source, config, sink));
        Ok(Self { shutdown, task })
    }

    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the emitter and waits for its final emission.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("emitter task failed: {e}");
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("cancelled", &self.shutdown.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

async fn run<S, F>(source: S, config: EmitterConfig, sink: F)
where
    S: Source,
    F: Fn(Emission<S::Snapshot>),
{
    // First emission one interval from now, like a ticker.
    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval = ?config.interval, mode = ?config.mode, "emitter started");

    loop {
        tokio::select! {
            biased;

            () = config.shutdown.cancelled() => break,

            _ = ticker.tick() => emit(&source, config.mode, &sink),
        }
    }

    // Hand over whatever accumulated since the last tick.
    if config.mode == ReadMode::Reset {
        emit(&source, config.mode, &sink);
    }
    debug!("emitter stopped");
}

fn emit<S, F>(source: &S, mode: ReadMode, sink: &F)
where
    S: Source,
    F: Fn(Emission<S::Snapshot>),
{
    let value = match mode {
        ReadMode::Peek => source.peek(),
        ReadMode::Reset => source.take(),
    };
    // A drained value exists nowhere else once the sink has it.
    let lost = (mode == ReadMode::Reset).then(|| format!("{value:?}"));
    let emission = Emission { timestamp: Utc::now(), value };

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| sink(emission))) {
        let panic = panic_message(&*panic);
        match lost {
            Some(lost) => error!(mode = ?mode, panic, %lost, "emitter sink panicked"),
            None => error!(mode = ?mode, panic, "emitter sink panicked"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
