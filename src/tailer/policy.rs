//! Scheduling knobs: the overlap policy and the stale limit.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Whether a tick may start while the previous one is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// No timer. Ticks only happen when the caller invokes `Tailer::tick`.
    Manual,
    /// A tick that fires while another is in progress is skipped.
    Synchronous,
    /// Ticks fire on schedule regardless of the previous one.
    #[default]
    Asynchronous,
}

impl OverlapPolicy {
    pub fn is_timer_driven(self) -> bool {
        !matches!(self, OverlapPolicy::Manual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlapPolicy::Manual => "manual",
            OverlapPolicy::Synchronous => "synchronous",
            OverlapPolicy::Asynchronous => "asynchronous",
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for a policy name that is not one of the three known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown overlap policy '{}' (expected manual, synchronous or asynchronous)",
            self.0
        )
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for OverlapPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(OverlapPolicy::Manual),
            "synchronous" | "sync" => Ok(OverlapPolicy::Synchronous),
            "asynchronous" | "async" => Ok(OverlapPolicy::Asynchronous),
            other => Err(UnknownPolicy(other.to_owned())),
        }
    }
}

/// How many consecutive no-growth ticks are tolerated before polling stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleLimit {
    #[default]
    Disabled,
    After(NonZeroU32),
}

impl StaleLimit {
    /// `0` disables the limit.
    pub fn from_count(count: u32) -> Self {
        NonZeroU32::new(count).map_or(StaleLimit::Disabled, StaleLimit::After)
    }

    /// Whether `stale_count` consecutive stale ticks should stop the tailer.
    pub fn is_reached(self, stale_count: u32) -> bool {
        match self {
            StaleLimit::Disabled => false,
            StaleLimit::After(limit) => stale_count >= limit.get(),
        }
    }

    pub fn get(self) -> Option<u32> {
        match self {
            StaleLimit::Disabled => None,
            StaleLimit::After(limit) => Some(limit.get()),
        }
    }
}

impl From<u32> for StaleLimit {
    fn from(count: u32) -> Self {
        StaleLimit::from_count(count)
    }
}
