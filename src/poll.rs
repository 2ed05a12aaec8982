//! Background tailing for the terminal UI.
//!
//! Builds a [`Tailer`] whose parser forwards new lines, and whose observer
//! forwards status events, to the UI thread over [`mpsc`] channels. The UI
//! drains both on every frame.

use std::sync::mpsc;
use std::sync::Arc;

use anyhow::anyhow;
use tailf::{parser_fn, ChannelObserver, Lines, TailEvent, TailResult, Tailer};

use crate::cli::Cli;

/// A running tailer plus the receiving ends the UI drains.
pub struct Poller {
    pub tailer: Tailer,
    pub lines: mpsc::Receiver<Lines>,
    pub events: mpsc::Receiver<TailEvent>,
}

/// Build and start the tailer described by `cli`.
///
/// Must be called with a tokio runtime entered unless the policy is manual.
/// Once the UI drops `lines`, the parser fails; without `--force` that stops
/// polling.
pub fn spawn(cli: &Cli) -> TailResult<Poller> {
    let (lines_tx, lines_rx) = mpsc::channel();
    let (observer, events_rx) = ChannelObserver::channel();

    let parser = parser_fn(move |new: &Lines, _all: &Lines| {
        if new.is_empty() {
            return Ok(());
        }
        lines_tx
            .send(new.clone())
            .map_err(|_| anyhow!("display is gone"))
    });

    let tailer = Tailer::new(cli.tailer_config(parser, Arc::new(observer)))?;
    Ok(Poller {
        tailer,
        lines: lines_rx,
        events: events_rx,
    })
}
