//! tailf — follow a growing text source that can only be read whole.
//!
//! Some sources (a CI console page, a file rewritten in place, an HTTP
//! endpoint) only hand out their complete current content. A [`Tailer`]
//! polls such a source through an [`Attainer`], works out which lines are new
//! since the previous poll, and passes just those to a [`Parser`].
//!
//! ```text
//! ┌──────────┐ snapshot ┌──────────────┐ new lines ┌────────┐
//! │ Attainer │ ───────► │ Tailer       │ ────────► │ Parser │
//! └──────────┘          │  LineBuffer  │           └────────┘
//!                       └──────┬───────┘
//!                              │ TailEvent
//!                         ┌────▼─────┐
//!                         │ Observer │
//!                         └──────────┘
//! ```
//!
//! * **`source`** — the capability traits plus file and HTTP attainers.
//! * **`tailer`** — the polling state machine and its line buffer.
//! * **`observer`** — diagnostics, delivered to `tracing` or a channel.
//! * **`error`** — failures that escape the tailer.
//!
//! ```no_run
//! use std::time::Duration;
//! use tailf::{attainer_fn, parser_fn, Lines, Tailer, TailerConfig};
//!
//! # #[tokio::main] async fn main() -> anyhow::Result<()> {
//! let tailer = Tailer::new(
//!     TailerConfig::new(
//!         attainer_fn(|| Ok(std::fs::read_to_string("build.log")?)),
//!         parser_fn(|new: &Lines, _all: &Lines| {
//!             for (line_no, line) in new {
//!                 println!("[{line_no}] {line}");
//!             }
//!             Ok(())
//!         }),
//!     )
//!     .interval(Duration::from_secs(1))
//!     .stale_limit(30),
//! )?;
//! # tokio::time::sleep(Duration::from_secs(10)).await;
//! # tailer.stop();
//! # Ok(()) }
//! ```

pub mod error;
pub mod observer;
pub mod source;
pub mod tailer;

pub use error::{TailError, TailResult};
pub use observer::{ChannelObserver, Observer, StopReason, TailEvent, TracingObserver};
pub use source::{
    attainer_fn, parser_fn, Attained, Attainer, FileAttainer, HttpAttainer, Lines, Parser,
};
pub use tailer::{
    OverlapPolicy, Reconfigure, Reconfigured, SkipReason, StaleLimit, Tailer, TailerConfig,
    TickOutcome, TickReport,
};
