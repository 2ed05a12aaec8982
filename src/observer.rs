//! Diagnostics emitted by the tailer.
//!
//! The tailer never writes to a global logger itself. Everything worth
//! reporting becomes a [`TailEvent`] handed to the configured [`Observer`];
//! [`TracingObserver`] (the default) turns those into `tracing` records and
//! [`ChannelObserver`] forwards them to another thread, e.g. a UI.

use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

use crate::tailer::OverlapPolicy;

/// Why a tailer stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller stopped it.
    Requested,
    /// Stopped to apply a new attainer, interval or policy; a restart follows.
    Reconfigure,
    /// The stale limit was reached.
    Stale,
    /// The attainer failed and `force` was off.
    AttainerError,
    /// The parser failed and `force` was off.
    ParserError,
    /// The attainer returned something that is not text.
    ContractViolation,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Requested => "requested",
            StopReason::Reconfigure => "reconfiguring",
            StopReason::Stale => "stale data",
            StopReason::AttainerError => "attainer error",
            StopReason::ParserError => "parser error",
            StopReason::ContractViolation => "attainer returned non-text",
        })
    }
}

/// Something the tailer wants the outside world to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    Started {
        interval: Duration,
        policy: OverlapPolicy,
    },
    Stopped {
        reason: StopReason,
        iterations: Option<u64>,
    },
    /// `start` on a running tailer.
    AlreadyRunning,
    /// `stop` on a stopped tailer.
    AlreadyStopped,
    /// The new attainer is the one already installed.
    IdenticalAttainer,
    /// The new interval equals the current one.
    IdenticalInterval(Duration),
    IntervalChanged {
        from: Duration,
        to: Duration,
    },
    /// An unrecognized overlap policy was ignored; `kept` stays in force.
    UnknownPolicy {
        given: String,
        kept: OverlapPolicy,
    },
    /// A zero interval was ignored; `kept` stays in force.
    InvalidInterval {
        kept: Duration,
    },
    /// A synchronous tick was skipped because the previous one is running.
    TickSkipped,
    /// Per-tick summary, only emitted with `debug` enabled.
    Tick {
        iteration: u64,
        new_lines: usize,
        buffered: usize,
        stale_count: u32,
    },
    AttainerFailed {
        iteration: u64,
        error: String,
    },
    ParserFailed {
        iteration: u64,
        error: String,
    },
    StaleTermination {
        stale_count: u32,
    },
    /// The attainer returned non-text from a timer-driven tick.
    ContractViolation {
        error: String,
    },
}

impl fmt::Display for TailEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailEvent::Started { interval, policy } => {
                write!(f, "tailing every {}ms ({policy})", interval.as_millis())
            }
            TailEvent::Stopped { reason, iterations } => match iterations {
                Some(n) => write!(f, "stopped after {n} iterations: {reason}"),
                None => write!(f, "stopped: {reason}"),
            },
            TailEvent::AlreadyRunning => f.write_str("already running, doing nothing"),
            TailEvent::AlreadyStopped => f.write_str("already stopped, doing nothing"),
            TailEvent::IdenticalAttainer => {
                f.write_str("new attainer and old attainer are identical")
            }
            TailEvent::IdenticalInterval(interval) => write!(
                f,
                "the interval is already {}ms, changing nothing",
                interval.as_millis()
            ),
            TailEvent::IntervalChanged { from, to } => write!(
                f,
                "interval changed from {}ms to {}ms",
                from.as_millis(),
                to.as_millis()
            ),
            TailEvent::UnknownPolicy { given, kept } => {
                write!(f, "ignoring unknown overlap policy '{given}', keeping {kept}")
            }
            TailEvent::InvalidInterval { kept } => {
                write!(f, "ignoring zero interval, keeping {}ms", kept.as_millis())
            }
            TailEvent::TickSkipped => {
                f.write_str("previous iteration still in progress, skipping this one")
            }
            TailEvent::Tick {
                iteration,
                new_lines,
                buffered,
                stale_count,
            } => write!(
                f,
                "iteration {iteration}: {new_lines} new lines, {buffered} buffered, {stale_count} stale"
            ),
            TailEvent::AttainerFailed { iteration, error } => {
                write!(f, "error executing attainer (iteration {iteration}): {error}")
            }
            TailEvent::ParserFailed { iteration, error } => {
                write!(f, "error executing parser (iteration {iteration}): {error}")
            }
            TailEvent::StaleTermination { stale_count } => {
                write!(f, "terminating polling due to {stale_count} stale iterations")
            }
            TailEvent::ContractViolation { error } => f.write_str(error),
        }
    }
}

/// Receives every [`TailEvent`] a tailer emits.
///
/// Called from whichever thread runs the tick, never while the tailer holds
/// one of its locks, so observers may call back into the tailer.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &TailEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: &TailEvent) {
        match event {
            TailEvent::AttainerFailed { iteration, error } => {
                tracing::error!(iteration, error = %error, "error executing attainer");
            }
            TailEvent::ParserFailed { iteration, error } => {
                tracing::error!(iteration, error = %error, "error executing parser");
            }
            TailEvent::ContractViolation { error } => {
                tracing::error!(error = %error, "attainer contract violated");
            }
            TailEvent::AlreadyRunning
            | TailEvent::AlreadyStopped
            | TailEvent::IdenticalAttainer
            | TailEvent::IdenticalInterval(_)
            | TailEvent::UnknownPolicy { .. }
            | TailEvent::InvalidInterval { .. } => tracing::warn!("{event}"),
            TailEvent::Stopped {
                reason: StopReason::Reconfigure,
                ..
            } => tracing::debug!("{event}"),
            TailEvent::Started { .. }
            | TailEvent::Stopped { .. }
            | TailEvent::IntervalChanged { .. }
            | TailEvent::StaleTermination { .. } => tracing::info!("{event}"),
            TailEvent::TickSkipped => tracing::debug!("{event}"),
            TailEvent::Tick {
                iteration,
                new_lines,
                buffered,
                stale_count,
            } => tracing::debug!(iteration, new_lines, buffered, stale_count, "tick"),
        }
    }
}

/// Forwards events over an [`mpsc`] channel.
///
/// Sending never blocks; once the receiver is gone events are dropped.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: mpsc::Sender<TailEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<TailEvent>) -> Self {
        Self { tx }
    }

    /// An observer plus the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::Receiver<TailEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl Observer for ChannelObserver {
    fn notify(&self, event: &TailEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingObserver;
