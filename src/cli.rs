//! Command-line arguments.
//!
//! Every flag maps onto a [`TailerConfig`] field; the positional `SOURCE`
//! picks the attainer.

use std::sync::Arc;
use std::time::Duration;

use tailf::{Attainer, FileAttainer, HttpAttainer, Observer, Parser, TailerConfig};

/// Follow a file or URL that can only be read whole, showing new lines as they appear.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tailf", version)]
pub struct Cli {
    /// File path, or an http:// / https:// URL, to tail.
    pub source: String,

    /// Milliseconds between polls.
    #[arg(short, long = "interval-ms", default_value_t = 3000)]
    pub interval_ms: u64,

    /// Stop after this many consecutive polls without new lines (0 = never).
    #[arg(short, long, default_value_t = 0)]
    pub stale_limit: u32,

    /// Keep polling when the source or the display fails.
    #[arg(short, long)]
    pub force: bool,

    /// Overlap policy: manual, synchronous or asynchronous. Unknown values
    /// are ignored. With `manual` the display loop drives each poll itself.
    #[arg(short, long)]
    pub method: Option<String>,

    /// Log a summary of every poll.
    #[arg(long)]
    pub debug: bool,

    /// Print `[line] text` to stdout instead of starting the terminal UI.
    #[arg(long)]
    pub plain: bool,

    /// Replace invalid UTF-8 in files instead of stopping.
    #[arg(long)]
    pub lossy: bool,
}

impl Cli {
    pub fn from_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    pub fn attainer(&self) -> Arc<dyn Attainer> {
        if HttpAttainer::accepts(&self.source) {
            Arc::new(HttpAttainer::new(&self.source))
        } else if self.lossy {
            Arc::new(FileAttainer::new(&self.source).lossy())
        } else {
            Arc::new(FileAttainer::new(&self.source))
        }
    }

    pub fn tailer_config(
        &self,
        parser: impl Parser + 'static,
        observer: Arc<dyn Observer>,
    ) -> TailerConfig {
        TailerConfig {
            attainer: Some(self.attainer()),
            parser: Some(Arc::new(parser)),
            method: self.method.clone(),
            ..TailerConfig::default()
        }
        .interval(Duration::from_millis(self.interval_ms))
        .stale_limit(self.stale_limit)
        .force(self.force)
        .debug(self.debug)
        .observer(observer)
    }
}
