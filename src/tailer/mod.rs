//! The tailer: a repeating attain → diff → parse loop.
//!
//! A [`Tailer`] polls its [`Attainer`] on an interval, diffs each snapshot
//! against the lines it has already seen, and hands the new ones to its
//! [`Parser`]. It stops on its own when the source stops growing for
//! `stale_limit` ticks, or when a capability fails and `force` is off.
//!
//! ## Threading
//!
//! The schedule is a tokio task that fires every `interval` and runs each
//! tick on the blocking pool, so attainers and parsers may block. Under
//! [`OverlapPolicy::Synchronous`] a tick that fires while another is still in
//! progress is skipped; under [`OverlapPolicy::Asynchronous`] ticks overlap
//! and only the buffer update is serialized. [`OverlapPolicy::Manual`] has no
//! timer at all and is driven by [`Tailer::tick`].
//!
//! Control state and the line buffer sit behind separate mutexes, always
//! taken in that order. Neither is held while the attainer, parser or
//! observer runs, so all three may call back into the tailer.

mod buffer;
mod policy;

pub use buffer::{Diff, LineBuffer};
pub use policy::{OverlapPolicy, StaleLimit, UnknownPolicy};

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::{TailError, TailResult};
use crate::observer::{Observer, StopReason, TailEvent, TracingObserver};
use crate::source::{Attainer, Lines, Parser};

/// Interval used when none (or a zero one) is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything needed to build a [`Tailer`].
///
/// `attainer` and `parser` are required; [`Tailer::new`] refuses a record
/// missing either. `method` is free-form on purpose: a name that is not a
/// known [`OverlapPolicy`] is ignored (the default is kept) and reported to
/// the observer as [`TailEvent::UnknownPolicy`] instead of failing
/// construction. A zero `interval` is handled the same way.
pub struct TailerConfig {
    pub attainer: Option<Arc<dyn Attainer>>,
    pub parser: Option<Arc<dyn Parser>>,
    pub interval: Duration,
    pub stale_limit: StaleLimit,
    pub force: bool,
    pub method: Option<String>,
    /// Leave the tailer stopped after construction.
    pub manual_init: bool,
    /// Emit a [`TailEvent::Tick`] for every tick.
    pub debug: bool,
    /// Defaults to [`TracingObserver`].
    pub observer: Option<Arc<dyn Observer>>,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            attainer: None,
            parser: None,
            interval: DEFAULT_INTERVAL,
            stale_limit: StaleLimit::Disabled,
            force: false,
            method: None,
            manual_init: false,
            debug: false,
            observer: None,
        }
    }
}

impl TailerConfig {
    pub fn new(attainer: impl Attainer + 'static, parser: impl Parser + 'static) -> Self {
        Self {
            attainer: Some(Arc::new(attainer)),
            parser: Some(Arc::new(parser)),
            ..Self::default()
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// `0` disables the limit.
    pub fn stale_limit(mut self, count: u32) -> Self {
        self.stale_limit = StaleLimit::from_count(count);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn policy(self, policy: OverlapPolicy) -> Self {
        self.method(policy.as_str())
    }

    pub fn manual_init(mut self, manual_init: bool) -> Self {
        self.manual_init = manual_init;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A batch of runtime changes for [`Tailer::reconfigure`]. `None` leaves a
/// setting as it is.
#[derive(Default)]
pub struct Reconfigure {
    pub attainer: Option<Arc<dyn Attainer>>,
    pub interval: Option<Duration>,
    pub stale_limit: Option<StaleLimit>,
    pub force: Option<bool>,
    pub policy: Option<OverlapPolicy>,
    pub debug: Option<bool>,
}

impl Reconfigure {
    pub fn attainer(mut self, attainer: Arc<dyn Attainer>) -> Self {
        self.attainer = Some(attainer);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn stale_limit(mut self, count: u32) -> Self {
        self.stale_limit = Some(StaleLimit::from_count(count));
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    pub fn policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// Which settings a [`Tailer::reconfigure`] call actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconfigured {
    pub attainer: bool,
    pub interval: bool,
    pub stale_limit: bool,
    pub force: bool,
    pub policy: bool,
    pub debug: bool,
    /// The schedule was stopped and started again to apply the change.
    pub restarted: bool,
}

impl Reconfigured {
    pub fn changed(&self) -> bool {
        self.attainer
            || self.interval
            || self.stale_limit
            || self.force
            || self.policy
            || self.debug
    }
}

// ---------------------------------------------------------------------------
// Tick results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stopped, or restarted while this tick was attaining.
    NotRunning,
    /// Synchronous policy and the previous tick has not finished.
    InProgress,
}

/// What a completed tick saw and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub iteration: u64,
    pub new_lines: Lines,
    pub stale_count: u32,
    /// Whether the parser was invoked.
    pub parsed: bool,
    /// Set when this tick stopped the tailer.
    pub stopped: Option<StopReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// The attainer failed; nothing was diffed or parsed. Under `force`
    /// the tick still counts towards the stale limit.
    AttainerFailed {
        iteration: u64,
        stopped: Option<StopReason>,
    },
    Completed(TickReport),
}

impl TickOutcome {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn stopped(&self) -> Option<StopReason> {
        match self {
            TickOutcome::Skipped(_) => None,
            TickOutcome::AttainerFailed { stopped, .. } => *stopped,
            TickOutcome::Completed(report) => report.stopped,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Settings {
    attainer: Arc<dyn Attainer>,
    parser: Arc<dyn Parser>,
    interval: Duration,
    stale_limit: StaleLimit,
    force: bool,
    policy: OverlapPolicy,
    debug: bool,
}

enum Schedule {
    Timer(JoinHandle<()>),
    /// Running without a timer; ticks come from [`Tailer::tick`].
    Manual,
}

struct Control {
    settings: Settings,
    schedule: Option<Schedule>,
    /// Bumped on every start so ticks from an older schedule can tell.
    generation: u64,
    iterations: Option<u64>,
}

impl Control {
    fn is_current(&self, generation: u64) -> bool {
        self.schedule.is_some() && self.generation == generation
    }

    fn halt(&mut self, reason: StopReason) -> TailEvent {
        if let Some(Schedule::Timer(handle)) = self.schedule.take() {
            handle.abort();
        }
        TailEvent::Stopped {
            reason,
            iterations: self.iterations,
        }
    }
}

struct Inner {
    control: Mutex<Control>,
    buffer: Mutex<LineBuffer>,
    in_flight: AtomicUsize,
    observer: Arc<dyn Observer>,
    runtime: Option<Handle>,
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buffer(&self) -> MutexGuard<'_, LineBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: &TailEvent) {
        self.observer.notify(event);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(Schedule::Timer(handle)) = control.schedule.take() {
            handle.abort();
        }
    }
}

/// Marks a tick as in progress until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    /// `None` when `exclusive` and another tick holds a marker.
    fn enter(counter: &'a AtomicUsize, exclusive: bool) -> Option<Self> {
        if exclusive {
            counter
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .ok()?;
        } else {
            counter.fetch_add(1, Ordering::AcqRel);
        }
        Some(InFlight(counter))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// Tailer
// ---------------------------------------------------------------------------

/// Handle to a running or stopped tailer. Clones share the same state.
///
/// The schedule only holds a weak reference: once every handle is dropped,
/// the timer task is aborted.
#[derive(Clone)]
pub struct Tailer {
    inner: Arc<Inner>,
}

impl fmt::Debug for Tailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let control = self.inner.control();
        f.debug_struct("Tailer")
            .field("running", &control.schedule.is_some())
            .field("iterations", &control.iterations)
            .field("interval", &control.settings.interval)
            .field("policy", &control.settings.policy)
            .field("stale_limit", &control.settings.stale_limit)
            .field("force", &control.settings.force)
            .finish_non_exhaustive()
    }
}

impl Tailer {
    /// Build a tailer and, unless `manual_init` is set, start it.
    ///
    /// Timer-driven policies need a tokio runtime; starting outside one fails
    /// with [`TailError::NoRuntime`].
    pub fn new(config: TailerConfig) -> TailResult<Self> {
        let attainer = config.attainer.ok_or(TailError::MissingAttainer)?;
        let parser = config.parser.ok_or(TailError::MissingParser)?;
        let observer = config
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver));

        let mut policy = OverlapPolicy::default();
        if let Some(method) = config.method {
            match method.parse() {
                Ok(parsed) => policy = parsed,
                Err(UnknownPolicy(given)) => {
                    observer.notify(&TailEvent::UnknownPolicy { given, kept: policy })
                }
            }
        }

        let interval = if config.interval.is_zero() {
            observer.notify(&TailEvent::InvalidInterval {
                kept: DEFAULT_INTERVAL,
            });
            DEFAULT_INTERVAL
        } else {
            config.interval
        };

        let settings = Settings {
            attainer,
            parser,
            interval,
            stale_limit: config.stale_limit,
            force: config.force,
            policy,
            debug: config.debug,
        };

        let tailer = Tailer {
            inner: Arc::new(Inner {
                control: Mutex::new(Control {
                    settings,
                    schedule: None,
                    generation: 0,
                    iterations: None,
                }),
                buffer: Mutex::new(LineBuffer::new()),
                in_flight: AtomicUsize::new(0),
                observer,
                runtime: Handle::try_current().ok(),
            }),
        };

        if !config.manual_init {
            tailer.start()?;
        }
        Ok(tailer)
    }

    // -- run control ---------------------------------------------------------

    /// Start ticking. Returns `Ok(false)` if already running.
    ///
    /// Resets the iteration and stale counters; the buffer is kept.
    pub fn start(&self) -> TailResult<bool> {
        let event = {
            let mut control = self.inner.control();
            if control.schedule.is_some() {
                None
            } else {
                Some(self.launch(&mut control)?)
            }
        };

        match event {
            Some(event) => {
                self.inner.notify(&event);
                Ok(true)
            }
            None => {
                self.inner.notify(&TailEvent::AlreadyRunning);
                Ok(false)
            }
        }
    }

    /// Cancel the schedule. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let event = {
            let mut control = self.inner.control();
            control
                .schedule
                .is_some()
                .then(|| control.halt(StopReason::Requested))
        };

        match event {
            Some(event) => {
                self.inner.notify(&event);
                true
            }
            None => {
                self.inner.notify(&TailEvent::AlreadyStopped);
                false
            }
        }
    }

    /// [`start`](Self::start) or [`stop`](Self::stop). Returns whether the
    /// run state changed.
    pub fn set_running(&self, running: bool) -> TailResult<bool> {
        if running {
            self.start()
        } else {
            Ok(self.stop())
        }
    }

    /// Swap the attainer, restarting if running. Installing the attainer that
    /// is already in place is a no-op.
    pub fn set_attainer(&self, attainer: Arc<dyn Attainer>) -> TailResult<bool> {
        self.reconfigure(Reconfigure::default().attainer(attainer))
            .map(|changed| changed.attainer)
    }

    /// Change the interval, restarting if running. An unchanged or zero
    /// interval is a no-op.
    pub fn set_interval(&self, interval: Duration) -> TailResult<bool> {
        self.reconfigure(Reconfigure::default().interval(interval))
            .map(|changed| changed.interval)
    }

    /// Takes effect from the next tick.
    pub fn set_force(&self, force: bool) {
        self.inner.control().settings.force = force;
    }

    /// `0` disables the limit. Takes effect from the next tick.
    pub fn set_stale_limit(&self, count: u32) {
        self.inner.control().settings.stale_limit = StaleLimit::from_count(count);
    }

    /// Apply several changes at once.
    ///
    /// Changes to the attainer, interval or policy need a fresh schedule: if
    /// the tailer is running it is stopped and started exactly once, all
    /// under the control lock, so no tick observes a half-applied update.
    /// Restarting keeps the buffer and resets the stale counter. When the new
    /// schedule cannot be launched ([`TailError::NoRuntime`]) nothing is
    /// changed and the current schedule keeps running.
    pub fn reconfigure(&self, update: Reconfigure) -> TailResult<Reconfigured> {
        let mut events = Vec::new();
        let mut changed = Reconfigured::default();

        {
            let mut control = self.inner.control();
            let mut settings = control.settings.clone();

            if let Some(attainer) = update.attainer {
                if Arc::ptr_eq(&settings.attainer, &attainer) {
                    events.push(TailEvent::IdenticalAttainer);
                } else {
                    settings.attainer = attainer;
                    changed.attainer = true;
                }
            }

            if let Some(interval) = update.interval {
                if interval.is_zero() {
                    events.push(TailEvent::InvalidInterval {
                        kept: settings.interval,
                    });
                } else if interval == settings.interval {
                    events.push(TailEvent::IdenticalInterval(interval));
                } else {
                    events.push(TailEvent::IntervalChanged {
                        from: settings.interval,
                        to: interval,
                    });
                    settings.interval = interval;
                    changed.interval = true;
                }
            }

            if let Some(policy) = update.policy.filter(|p| *p != settings.policy) {
                settings.policy = policy;
                changed.policy = true;
            }
            if let Some(limit) = update.stale_limit.filter(|l| *l != settings.stale_limit) {
                settings.stale_limit = limit;
                changed.stale_limit = true;
            }
            if let Some(force) = update.force.filter(|f| *f != settings.force) {
                settings.force = force;
                changed.force = true;
            }
            if let Some(debug) = update.debug.filter(|d| *d != settings.debug) {
                settings.debug = debug;
                changed.debug = true;
            }

            let restart = control.schedule.is_some()
                && (changed.attainer || changed.interval || changed.policy);
            // Nothing is applied unless the new schedule can be launched.
            if restart && settings.policy.is_timer_driven() {
                self.runtime()?;
            }

            control.settings = settings;
            if restart {
                events.push(control.halt(StopReason::Reconfigure));
                events.push(self.launch(&mut control)?);
                changed.restarted = true;
            }
        }

        for event in &events {
            self.inner.notify(event);
        }
        Ok(changed)
    }

    /// Allocate a schedule on a stopped tailer.
    fn launch(&self, control: &mut Control) -> TailResult<TailEvent> {
        let settings = &control.settings;
        let generation = control.generation + 1;

        let schedule = if settings.policy.is_timer_driven() {
            let runtime = self.runtime()?;
            let task = run_schedule(Arc::downgrade(&self.inner), settings.interval, generation);
            Schedule::Timer(runtime.spawn(task))
        } else {
            Schedule::Manual
        };

        control.generation = generation;
        control.schedule = Some(schedule);
        control.iterations = Some(0);
        self.inner.buffer().reset_stale();

        Ok(TailEvent::Started {
            interval: control.settings.interval,
            policy: control.settings.policy,
        })
    }

    /// Stop, but only if the schedule is still the one `generation` belongs to.
    fn stop_generation(&self, generation: u64, reason: StopReason) -> Option<StopReason> {
        let event = {
            let mut control = self.inner.control();
            control
                .is_current(generation)
                .then(|| control.halt(reason))
        }?;
        self.inner.notify(&event);
        Some(reason)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.control().is_current(generation)
    }

    /// Run `f` on the buffer, unless the schedule `generation` belongs to has
    /// ended. Holding the control lock keeps a restart from slipping in.
    fn with_current_buffer<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut LineBuffer) -> T,
    ) -> Option<T> {
        let control = self.inner.control();
        control
            .is_current(generation)
            .then(|| f(&mut self.inner.buffer()))
    }

    /// The entered runtime, else the one the tailer was built in.
    fn runtime(&self) -> TailResult<Handle> {
        Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.clone())
            .ok_or(TailError::NoRuntime)
    }

    // -- ticking -------------------------------------------------------------

    /// Run one tick now.
    ///
    /// This is how [`OverlapPolicy::Manual`] tailers advance, but it works
    /// under any policy. Attainer and parser failures are contained in the
    /// tick; the only error returned is [`TailError::NonText`], which also
    /// stops the tailer regardless of `force`.
    pub fn tick(&self) -> TailResult<TickOutcome> {
        self.run_tick(None)
    }

    fn run_tick(&self, scheduled: Option<u64>) -> TailResult<TickOutcome> {
        let inner = &*self.inner;

        let claimed = {
            let mut control = inner.control();
            let generation = scheduled.unwrap_or(control.generation);
            if !control.is_current(generation) {
                return Ok(TickOutcome::Skipped(SkipReason::NotRunning));
            }
            let exclusive = control.settings.policy == OverlapPolicy::Synchronous;
            InFlight::enter(&inner.in_flight, exclusive).map(|in_flight| {
                let iteration = control.iterations.map_or(1, |n| n + 1);
                control.iterations = Some(iteration);
                (in_flight, generation, iteration, control.settings.clone())
            })
        };
        let Some((_in_flight, generation, iteration, settings)) = claimed else {
            inner.notify(&TailEvent::TickSkipped);
            return Ok(TickOutcome::Skipped(SkipReason::InProgress));
        };

        let attained = match contain(|| settings.attainer.attain()) {
            Ok(attained) => attained,
            Err(error) => {
                inner.notify(&TailEvent::AttainerFailed {
                    iteration,
                    error: format!("{error:#}"),
                });
                if !settings.force {
                    let stopped = self.stop_generation(generation, StopReason::AttainerError);
                    return Ok(TickOutcome::AttainerFailed { iteration, stopped });
                }

                // No snapshot means no growth.
                let Some(stale_count) = self.with_current_buffer(generation, LineBuffer::mark_stale)
                else {
                    return Ok(TickOutcome::Skipped(SkipReason::NotRunning));
                };
                let mut stopped = None;
                if settings.stale_limit.is_reached(stale_count) {
                    inner.notify(&TailEvent::StaleTermination { stale_count });
                    stopped = self.stop_generation(generation, StopReason::Stale);
                }
                return Ok(TickOutcome::AttainerFailed { iteration, stopped });
            }
        };

        let text = match attained.into_text() {
            Ok(text) => text,
            Err(err) => {
                inner.notify(&TailEvent::ContractViolation {
                    error: err.to_string(),
                });
                self.stop_generation(generation, StopReason::ContractViolation);
                return Err(err);
            }
        };

        let applied = self.with_current_buffer(generation, |buffer| {
            let diff = buffer.apply(&text);
            let stale_reached = !diff.changed && settings.stale_limit.is_reached(diff.stale_count);
            let snapshot = (!stale_reached).then(|| buffer.lines().clone());
            (diff, buffer.len(), stale_reached, snapshot)
        });
        let Some((diff, buffered, stale_reached, buffer)) = applied else {
            return Ok(TickOutcome::Skipped(SkipReason::NotRunning));
        };

        if settings.debug {
            inner.notify(&TailEvent::Tick {
                iteration,
                new_lines: diff.new_lines.len(),
                buffered,
                stale_count: diff.stale_count,
            });
        }

        let mut stopped = None;
        if stale_reached {
            inner.notify(&TailEvent::StaleTermination {
                stale_count: diff.stale_count,
            });
            stopped = self.stop_generation(generation, StopReason::Stale);
        }

        let mut parsed = false;
        if let Some(buffer) = buffer.filter(|_| self.is_current(generation)) {
            parsed = true;
            if let Err(error) = contain(|| settings.parser.parse(&diff.new_lines, &buffer)) {
                inner.notify(&TailEvent::ParserFailed {
                    iteration,
                    error: format!("{error:#}"),
                });
                if !settings.force {
                    stopped = self.stop_generation(generation, StopReason::ParserError);
                }
            }
        }

        Ok(TickOutcome::Completed(TickReport {
            iteration,
            new_lines: diff.new_lines,
            stale_count: diff.stale_count,
            parsed,
            stopped,
        }))
    }

    // -- accessors -----------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.inner.control().schedule.is_some()
    }

    /// Ticks started since the last start.
    ///
    /// `None` until the tailer is first started. Stopping keeps the last
    /// count; starting again resets it to zero.
    pub fn iterations(&self) -> Option<u64> {
        self.inner.control().iterations
    }

    pub fn force(&self) -> bool {
        self.inner.control().settings.force
    }

    pub fn stale_limit(&self) -> StaleLimit {
        self.inner.control().settings.stale_limit
    }

    pub fn interval(&self) -> Duration {
        self.inner.control().settings.interval
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.inner.control().settings.policy
    }

    pub fn debug(&self) -> bool {
        self.inner.control().settings.debug
    }

    pub fn stale_count(&self) -> u32 {
        self.inner.buffer().stale_count()
    }

    /// A copy of every line seen so far.
    pub fn buffer(&self) -> Lines {
        self.inner.buffer().lines().clone()
    }

    pub fn line_count(&self) -> usize {
        self.inner.buffer().len()
    }
}

/// The timer behind a running, timer-driven tailer.
///
/// The first tick fires one interval after start. Each tick runs on the
/// blocking pool; this loop never waits for it, which is what lets
/// asynchronous ticks overlap.
async fn run_schedule(inner: Weak<Inner>, period: Duration, generation: u64) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let tailer = Tailer { inner };
        tokio::task::spawn_blocking(move || {
            // Contract violations were already reported to the observer and
            // have stopped the tailer; there is no caller to hand them to.
            let _ = tailer.run_tick(Some(generation));
        });
    }
}

/// Run a capability, turning a panic into an error like any other failure.
fn contain<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use crate::source::{attainer_fn, parser_fn, Attained};
    use std::sync::atomic::AtomicU64;
    use std::sync::{mpsc, OnceLock};

    /// Returns each snapshot in turn, repeating the last one forever.
    fn sequence(snapshots: &'static [&'static str]) -> impl Attainer {
        let calls = AtomicUsize::new(0);
        attainer_fn(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(snapshots[n.min(snapshots.len() - 1)])
        })
    }

    /// A parser recording every `new_lines` map it is handed.
    fn recording_parser() -> (impl Parser, Arc<Mutex<Vec<Lines>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let parser = parser_fn(move |new: &Lines, _all: &Lines| {
            sink.lock().unwrap().push(new.clone());
            Ok(())
        });
        (parser, seen)
    }

    fn lines(pairs: &[(usize, &str)]) -> Lines {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    fn manual(config: TailerConfig) -> (Tailer, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let tailer = Tailer::new(
            config
                .policy(OverlapPolicy::Manual)
                .observer(observer.clone()),
        )
        .unwrap();
        (tailer, observer)
    }

    fn completed(tailer: &Tailer) -> TickReport {
        match tailer.tick().unwrap() {
            TickOutcome::Completed(report) => report,
            other => panic!("expected a completed tick, got {other:?}"),
        }
    }

    // -- construction --------------------------------------------------------

    #[test]
    fn missing_attainer_fails_construction() {
        let (parser, _) = recording_parser();
        let config = TailerConfig {
            parser: Some(Arc::new(parser)),
            ..TailerConfig::default()
        };
        assert!(matches!(Tailer::new(config), Err(TailError::MissingAttainer)));
    }

    #[test]
    fn missing_parser_fails_construction() {
        let config = TailerConfig {
            attainer: Some(Arc::new(sequence(&["a"]))),
            ..TailerConfig::default()
        };
        assert!(matches!(Tailer::new(config), Err(TailError::MissingParser)));
    }

    #[test]
    fn defaults_match_documented_values() {
        let (parser, _) = recording_parser();
        let tailer =
            Tailer::new(TailerConfig::new(sequence(&["a"]), parser).manual_init(true)).unwrap();

        assert_eq!(tailer.interval(), Duration::from_millis(3000));
        assert_eq!(tailer.stale_limit(), StaleLimit::Disabled);
        assert!(!tailer.force());
        assert!(!tailer.debug());
        assert_eq!(tailer.policy(), OverlapPolicy::Asynchronous);
        assert!(!tailer.is_running());
        assert_eq!(tailer.iterations(), None);
    }

    #[test]
    fn unknown_method_keeps_default_and_warns() {
        let (parser, _) = recording_parser();
        let observer = Arc::new(RecordingObserver::default());
        let tailer = Tailer::new(
            TailerConfig::new(sequence(&["a"]), parser)
                .method("parallel")
                .manual_init(true)
                .observer(observer.clone()),
        )
        .unwrap();

        assert_eq!(tailer.policy(), OverlapPolicy::Asynchronous);
        assert_eq!(
            observer.events(),
            vec![TailEvent::UnknownPolicy {
                given: "parallel".into(),
                kept: OverlapPolicy::Asynchronous,
            }]
        );
    }

    #[test]
    fn zero_interval_keeps_default() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(
            TailerConfig::new(sequence(&["a"]), parser).interval(Duration::ZERO),
        );

        assert_eq!(tailer.interval(), DEFAULT_INTERVAL);
        assert_eq!(
            observer.count(|e| matches!(e, TailEvent::InvalidInterval { .. })),
            1
        );
    }

    #[test]
    fn timer_policy_without_runtime_fails_to_start() {
        let (parser, _) = recording_parser();
        let result = Tailer::new(TailerConfig::new(sequence(&["a"]), parser));
        assert!(matches!(result, Err(TailError::NoRuntime)));
    }

    #[test]
    fn manual_policy_autostarts_without_runtime() {
        let (parser, _) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(sequence(&["a"]), parser));

        assert!(tailer.is_running());
        assert_eq!(tailer.iterations(), Some(0));
    }

    // -- diffing scenarios ---------------------------------------------------

    #[test]
    fn forwards_only_new_lines_each_tick() {
        let (parser, seen) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(
            sequence(&["a", "a\nb", "a\nb", "a\nb\nc"]),
            parser,
        ));

        for _ in 0..4 {
            tailer.tick().unwrap();
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                lines(&[(1, "a")]),
                lines(&[(2, "b")]),
                Lines::new(),
                lines(&[(3, "c")]),
            ]
        );
        assert_eq!(tailer.buffer(), lines(&[(1, "a"), (2, "b"), (3, "c")]));
        assert_eq!(tailer.iterations(), Some(4));
    }

    #[test]
    fn parser_receives_full_buffer() {
        let full = Arc::new(Mutex::new(Lines::new()));
        let sink = Arc::clone(&full);
        let parser = parser_fn(move |_new: &Lines, all: &Lines| {
            *sink.lock().unwrap() = all.clone();
            Ok(())
        });
        let (tailer, _) = manual(TailerConfig::new(sequence(&["x", "x\ny"]), parser));

        tailer.tick().unwrap();
        tailer.tick().unwrap();
        assert_eq!(*full.lock().unwrap(), lines(&[(1, "x"), (2, "y")]));
    }

    #[test]
    fn growth_resets_stale_count() {
        let (parser, _) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(sequence(&["a", "a", "a", "a\nb"]), parser));

        tailer.tick().unwrap();
        assert_eq!(completed(&tailer).stale_count, 1);
        assert_eq!(completed(&tailer).stale_count, 2);

        let report = completed(&tailer);
        assert_eq!(report.stale_count, 0);
        assert_eq!(report.new_lines, lines(&[(2, "b")]));
        assert_eq!(tailer.stale_count(), 0);
    }

    #[test]
    fn stale_limit_stops_before_parsing() {
        let (parser, seen) = recording_parser();
        let (tailer, observer) = manual(
            TailerConfig::new(sequence(&["a\nb"]), parser).stale_limit(2),
        );

        assert!(completed(&tailer).parsed);
        let first_stale = completed(&tailer);
        assert!(first_stale.parsed);
        assert!(tailer.is_running());

        let second_stale = completed(&tailer);
        assert!(!second_stale.parsed);
        assert_eq!(second_stale.stopped, Some(StopReason::Stale));
        assert!(!tailer.is_running());
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(
            observer.count(|e| *e == TailEvent::StaleTermination { stale_count: 2 }),
            1
        );
        assert_eq!(tailer.tick().unwrap(), TickOutcome::Skipped(SkipReason::NotRunning));
    }

    #[test]
    fn restart_preserves_buffer_and_resets_counters() {
        let (parser, seen) = recording_parser();
        let (tailer, _) = manual(
            TailerConfig::new(sequence(&["a", "a", "a\nb"]), parser).stale_limit(1),
        );

        tailer.tick().unwrap();
        tailer.tick().unwrap();
        assert!(!tailer.is_running());
        assert_eq!(tailer.iterations(), Some(2), "count survives the stop");
        assert_eq!(tailer.stale_count(), 1);

        assert!(tailer.start().unwrap());
        assert_eq!(tailer.iterations(), Some(0));
        assert_eq!(tailer.stale_count(), 0);
        assert_eq!(tailer.line_count(), 1);

        assert_eq!(completed(&tailer).new_lines, lines(&[(2, "b")]));
        assert_eq!(seen.lock().unwrap().last(), Some(&lines(&[(2, "b")])));
    }

    // -- failure handling ----------------------------------------------------

    fn failing_on(tick: usize) -> impl Attainer {
        let calls = AtomicUsize::new(0);
        attainer_fn(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            anyhow::ensure!(n != tick, "source unavailable");
            Ok("a\n".repeat(n))
        })
    }

    #[test]
    fn forced_attainer_failure_keeps_polling() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(TailerConfig::new(failing_on(2), parser).force(true));

        tailer.tick().unwrap();
        let outcome = tailer.tick().unwrap();
        assert_eq!(
            outcome,
            TickOutcome::AttainerFailed {
                iteration: 2,
                stopped: None
            }
        );
        assert!(tailer.is_running());

        assert_eq!(tailer.stale_count(), 1);

        assert!(tailer.tick().unwrap().report().is_some());
        assert_eq!(tailer.stale_count(), 0);
        assert_eq!(
            observer.events().iter().filter(|e| matches!(e, TailEvent::AttainerFailed { .. })).count(),
            1
        );
    }

    #[test]
    fn forced_dead_source_trips_stale_limit() {
        let (parser, seen) = recording_parser();
        let calls = AtomicUsize::new(0);
        let attainer = attainer_fn(move || {
            anyhow::ensure!(calls.fetch_add(1, Ordering::SeqCst) == 0, "connection refused");
            Ok("a\nb")
        });
        let (tailer, observer) = manual(
            TailerConfig::new(attainer, parser).force(true).stale_limit(2),
        );

        assert!(completed(&tailer).parsed);
        assert_eq!(
            tailer.tick().unwrap(),
            TickOutcome::AttainerFailed {
                iteration: 2,
                stopped: None
            }
        );
        assert_eq!(tailer.stale_count(), 1);
        assert_eq!(
            tailer.tick().unwrap(),
            TickOutcome::AttainerFailed {
                iteration: 3,
                stopped: Some(StopReason::Stale)
            }
        );
        assert!(!tailer.is_running());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(
            observer.count(|e| *e == TailEvent::StaleTermination { stale_count: 2 }),
            1
        );
    }

    #[test]
    fn unforced_attainer_failure_stops() {
        let (parser, seen) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(failing_on(2), parser));

        tailer.tick().unwrap();
        let outcome = tailer.tick().unwrap();
        assert_eq!(outcome.stopped(), Some(StopReason::AttainerError));
        assert!(!tailer.is_running());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn panicking_attainer_is_contained() {
        let (parser, _) = recording_parser();
        let attainer = attainer_fn(|| -> anyhow::Result<String> { panic!("attainer blew up") });
        let (tailer, observer) = manual(TailerConfig::new(attainer, parser).force(true));

        assert!(matches!(tailer.tick().unwrap(), TickOutcome::AttainerFailed { .. }));
        assert!(tailer.is_running());
        assert_eq!(
            observer.count(|e| matches!(
                e,
                TailEvent::AttainerFailed { error, .. } if error.contains("attainer blew up")
            )),
            1
        );
    }

    #[test]
    fn parser_failure_follows_force() {
        let parser = parser_fn(|_: &Lines, _: &Lines| anyhow::bail!("cannot parse"));

        let (forced, _) = manual(TailerConfig::new(sequence(&["a"]), parser).force(true));
        let report = completed(&forced);
        assert!(report.parsed);
        assert_eq!(report.stopped, None);
        assert!(forced.is_running());

        let parser = parser_fn(|_: &Lines, _: &Lines| anyhow::bail!("cannot parse"));
        let (strict, observer) = manual(TailerConfig::new(sequence(&["a"]), parser));
        assert_eq!(completed(&strict).stopped, Some(StopReason::ParserError));
        assert!(!strict.is_running());
        assert_eq!(
            observer.count(|e| matches!(e, TailEvent::ParserFailed { .. })),
            1
        );
    }

    #[test]
    fn non_text_snapshot_is_fatal_even_when_forced() {
        let (parser, seen) = recording_parser();
        let attainer = attainer_fn(|| Ok(Attained::Bytes(vec![0xff, 0xfe])));
        let (tailer, observer) = manual(TailerConfig::new(attainer, parser).force(true));

        assert!(matches!(tailer.tick(), Err(TailError::NonText { len: 2, .. })));
        assert!(!tailer.is_running());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(
            observer.count(|e| matches!(
                e,
                TailEvent::Stopped {
                    reason: StopReason::ContractViolation,
                    ..
                }
            )),
            1
        );
    }

    // -- run control ---------------------------------------------------------

    #[test]
    fn redundant_start_and_stop_warn() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(TailerConfig::new(sequence(&["a"]), parser));

        assert!(!tailer.start().unwrap());
        assert!(tailer.stop());
        assert!(!tailer.stop());
        assert!(!tailer.set_running(false).unwrap());
        assert!(tailer.set_running(true).unwrap());

        assert_eq!(observer.count(|e| *e == TailEvent::AlreadyRunning), 1);
        assert_eq!(observer.count(|e| *e == TailEvent::AlreadyStopped), 2);
    }

    #[test]
    fn identical_attainer_is_a_noop() {
        let (parser, _) = recording_parser();
        let attainer: Arc<dyn Attainer> = Arc::new(sequence(&["a"]));
        let observer = Arc::new(RecordingObserver::default());
        let tailer = Tailer::new(TailerConfig {
            attainer: Some(Arc::clone(&attainer)),
            parser: Some(Arc::new(parser)),
            method: Some("manual".into()),
            observer: Some(observer.clone()),
            ..TailerConfig::default()
        })
        .unwrap();

        tailer.tick().unwrap();
        tailer.tick().unwrap();
        assert_eq!(tailer.stale_count(), 1);

        assert!(!tailer.set_attainer(attainer).unwrap());
        assert_eq!(tailer.stale_count(), 1, "no restart happened");
        assert_eq!(tailer.iterations(), Some(2));
        assert_eq!(observer.count(|e| *e == TailEvent::IdenticalAttainer), 1);
    }

    #[test]
    fn new_attainer_restarts_and_keeps_buffer() {
        let (parser, seen) = recording_parser();
        let (tailer, observer) = manual(TailerConfig::new(sequence(&["a"]), parser));

        tailer.tick().unwrap();
        tailer.tick().unwrap();
        assert_eq!(tailer.stale_count(), 1);

        assert!(tailer.set_attainer(Arc::new(sequence(&["a\nfrom new"]))).unwrap());
        assert!(tailer.is_running());
        assert_eq!(tailer.stale_count(), 0);
        assert_eq!(tailer.iterations(), Some(0));
        assert_eq!(
            observer.count(|e| matches!(
                e,
                TailEvent::Stopped {
                    reason: StopReason::Reconfigure,
                    ..
                }
            )),
            1
        );

        tailer.tick().unwrap();
        assert_eq!(seen.lock().unwrap().last(), Some(&lines(&[(2, "from new")])));
    }

    #[test]
    fn identical_interval_is_a_noop() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(
            TailerConfig::new(sequence(&["a"]), parser).interval(Duration::from_millis(500)),
        );
        tailer.tick().unwrap();
        tailer.tick().unwrap();

        assert!(!tailer.set_interval(Duration::from_millis(500)).unwrap());
        assert_eq!(tailer.stale_count(), 1);
        assert_eq!(
            observer.count(|e| *e == TailEvent::IdenticalInterval(Duration::from_millis(500))),
            1
        );

        assert!(tailer.set_interval(Duration::from_millis(250)).unwrap());
        assert_eq!(tailer.interval(), Duration::from_millis(250));
        assert_eq!(tailer.stale_count(), 0);
    }

    #[test]
    fn interval_change_while_stopped_does_not_start() {
        let (parser, _) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(sequence(&["a"]), parser).manual_init(true));

        assert!(tailer.set_interval(Duration::from_secs(1)).unwrap());
        assert!(!tailer.is_running());
    }

    #[test]
    fn reconfigure_restarts_once_for_several_changes() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(TailerConfig::new(sequence(&["a"]), parser));

        let changed = tailer
            .reconfigure(
                Reconfigure::default()
                    .attainer(Arc::new(sequence(&["b"])))
                    .interval(Duration::from_secs(1))
                    .force(true)
                    .stale_limit(5),
            )
            .unwrap();

        assert!(changed.attainer && changed.interval && changed.force && changed.stale_limit);
        assert!(changed.restarted);
        assert!(tailer.force());
        assert_eq!(tailer.stale_limit(), StaleLimit::from_count(5));
        assert_eq!(
            observer.count(|e| matches!(e, TailEvent::Started { .. })),
            2,
            "initial start plus exactly one restart"
        );
    }

    #[test]
    fn reconfigure_without_schedule_changes_skips_restart() {
        let (parser, _) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(sequence(&["a"]), parser));

        let changed = tailer
            .reconfigure(Reconfigure::default().force(true).debug(true))
            .unwrap();
        assert!(changed.changed());
        assert!(!changed.restarted);

        let unchanged = tailer.reconfigure(Reconfigure::default().force(true)).unwrap();
        assert!(!unchanged.changed());
    }

    #[test]
    fn reconfigure_without_runtime_changes_nothing() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(TailerConfig::new(sequence(&["a"]), parser));
        tailer.tick().unwrap();
        tailer.tick().unwrap();

        let result = tailer.reconfigure(
            Reconfigure::default()
                .policy(OverlapPolicy::Synchronous)
                .interval(Duration::from_secs(1))
                .force(true),
        );

        assert!(matches!(result, Err(TailError::NoRuntime)));
        assert_eq!(tailer.policy(), OverlapPolicy::Manual);
        assert_eq!(tailer.interval(), DEFAULT_INTERVAL);
        assert!(!tailer.force());
        assert!(tailer.is_running());
        assert_eq!(tailer.iterations(), Some(2));
        assert_eq!(tailer.stale_count(), 1);
        assert_eq!(observer.count(|e| matches!(e, TailEvent::Stopped { .. })), 0);
        assert_eq!(observer.count(|e| matches!(e, TailEvent::IntervalChanged { .. })), 0);
    }

    #[test]
    fn plain_setters_do_not_restart() {
        let (parser, _) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(sequence(&["a"]), parser));
        tailer.tick().unwrap();
        tailer.tick().unwrap();

        tailer.set_force(true);
        tailer.set_stale_limit(3);
        assert!(tailer.force());
        assert_eq!(tailer.stale_limit().get(), Some(3));
        assert_eq!(tailer.stale_count(), 1);

        tailer.set_stale_limit(0);
        assert_eq!(tailer.stale_limit(), StaleLimit::Disabled);
    }

    #[test]
    fn parser_may_stop_the_tailer() {
        let handle: Arc<OnceLock<Tailer>> = Arc::new(OnceLock::new());
        let cell = Arc::clone(&handle);
        let parser = parser_fn(move |_: &Lines, _: &Lines| {
            if let Some(tailer) = cell.get() {
                tailer.stop();
            }
            Ok(())
        });
        let (tailer, _) = manual(TailerConfig::new(sequence(&["a"]), parser));
        handle.set(tailer.clone()).unwrap();

        tailer.tick().unwrap();
        assert!(!tailer.is_running());
    }

    #[test]
    fn debug_emits_tick_summaries() {
        let (parser, _) = recording_parser();
        let (tailer, observer) = manual(
            TailerConfig::new(sequence(&["a", "a\nb"]), parser).debug(true),
        );
        tailer.tick().unwrap();
        tailer.tick().unwrap();

        assert_eq!(
            observer.events().last(),
            Some(&TailEvent::Tick {
                iteration: 2,
                new_lines: 1,
                buffered: 2,
                stale_count: 0,
            })
        );
    }

    // -- overlap -------------------------------------------------------------

    /// Blocks inside the first attain until released, then returns `first`;
    /// every later call returns `rest` at once.
    fn gated(
        first: &'static str,
        rest: &'static str,
    ) -> (impl Attainer, mpsc::Receiver<()>, mpsc::SyncSender<()>) {
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::sync_channel::<()>(1);
        let release_rx = Mutex::new(release_rx);
        let calls = AtomicU64::new(0);
        let attainer = attainer_fn(move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                entered_tx.send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
                return Ok(first);
            }
            Ok(rest)
        });
        (attainer, entered_rx, release_tx)
    }

    fn overlapping_ticks(policy: OverlapPolicy) -> (Tailer, TickOutcome, TickOutcome) {
        let (attainer, entered, release) = gated("a\nb\nc", "a");
        let (parser, _) = recording_parser();
        let tailer = Tailer::new(
            TailerConfig::new(attainer, parser)
                .policy(policy)
                .interval(Duration::from_secs(3600)),
        )
        .unwrap();

        let first = {
            let tailer = tailer.clone();
            std::thread::spawn(move || tailer.tick().unwrap())
        };
        entered.recv().unwrap();
        let second = tailer.tick().unwrap();
        release.send(()).unwrap();
        let first = first.join().unwrap();
        (tailer, first, second)
    }

    #[tokio::test]
    async fn synchronous_policy_skips_overlapping_tick() {
        let (_, first, second) = overlapping_ticks(OverlapPolicy::Synchronous);
        assert_eq!(second, TickOutcome::Skipped(SkipReason::InProgress));
        assert!(first.report().is_some());
    }

    #[tokio::test]
    async fn asynchronous_policy_allows_overlap() {
        let (tailer, first, second) = overlapping_ticks(OverlapPolicy::Asynchronous);
        let second = second.report().unwrap();
        let first = first.report().unwrap();
        assert_eq!(second.iteration, 2);
        assert_eq!(first.iteration, 1);

        // The later tick diffed first; the earlier one appends after it.
        assert_eq!(second.new_lines, lines(&[(1, "a")]));
        assert_eq!(first.new_lines, lines(&[(2, "b"), (3, "c")]));
        let keys: Vec<usize> = tailer.buffer().keys().copied().collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn tick_from_before_a_restart_leaves_stale_count_alone() {
        let (attainer, entered, release) = gated("a", "a");
        let (parser, seen) = recording_parser();
        let (tailer, _) = manual(TailerConfig::new(attainer, parser).stale_limit(2));

        let old = {
            let tailer = tailer.clone();
            std::thread::spawn(move || tailer.tick().unwrap())
        };
        entered.recv().unwrap();
        assert!(tailer.set_attainer(Arc::new(sequence(&["a"]))).unwrap());
        release.send(()).unwrap();

        assert_eq!(old.join().unwrap(), TickOutcome::Skipped(SkipReason::NotRunning));
        assert_eq!(tailer.stale_count(), 0);
        assert_eq!(tailer.line_count(), 0);
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(completed(&tailer).new_lines, lines(&[(1, "a")]));
        assert_eq!(completed(&tailer).stopped, None);
        assert!(tailer.is_running(), "one stale tick is under the limit");
        assert_eq!(completed(&tailer).stopped, Some(StopReason::Stale));
    }

    // -- timer ---------------------------------------------------------------

    fn growing() -> impl Attainer {
        let calls = AtomicUsize::new(0);
        attainer_fn(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((1..=n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n"))
        })
    }

    async fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while !cond() {
            if start.elapsed() > deadline {
                return false;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_drives_ticks_until_stopped() {
        let (parser, seen) = recording_parser();
        let tailer = Tailer::new(
            TailerConfig::new(growing(), parser)
                .policy(OverlapPolicy::Synchronous)
                .interval(Duration::from_millis(10)),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(5), || tailer.line_count() >= 3).await);
        tailer.stop();
        // Let any tick already on the blocking pool finish.
        time::sleep(Duration::from_millis(50)).await;

        let frozen = tailer.iterations();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tailer.iterations(), frozen);

        let buffer = tailer.buffer();
        let keys: Vec<usize> = buffer.keys().copied().collect();
        assert_eq!(keys, (1..=buffer.len()).collect::<Vec<_>>());
        assert!(seen.lock().unwrap().iter().all(|batch| !batch.is_empty()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_stops_on_stale_data() {
        let (parser, _) = recording_parser();
        let tailer = Tailer::new(
            TailerConfig::new(sequence(&["a\nb"]), parser)
                .policy(OverlapPolicy::Synchronous)
                .interval(Duration::from_millis(10))
                .stale_limit(2),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(5), || !tailer.is_running()).await);
        assert_eq!(tailer.iterations(), Some(3));
        assert_eq!(tailer.stale_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_reports_contract_violation() {
        let (parser, _) = recording_parser();
        let observer = Arc::new(RecordingObserver::default());
        let tailer = Tailer::new(
            TailerConfig::new(attainer_fn(|| Ok(vec![0xffu8])), parser)
                .interval(Duration::from_millis(10))
                .force(true)
                .observer(observer.clone()),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(5), || !tailer.is_running()).await);
        assert!(wait_until(Duration::from_secs(1), || {
            observer.count(|e| matches!(e, TailEvent::ContractViolation { .. })) >= 1
        })
        .await);
    }
}
