//! tailf — follow a file or URL that can only be read whole.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐  Lines /   ┌──────────┐  draw()  ┌──────────┐
//! │  poll.rs │ ─────────► │  app.rs  │ ───────► │  ui.rs   │
//! │ (Tailer) │ TailEvent  │ (state)  │          │ (render) │
//! └──────────┘            └──────────┘          └──────────┘
//!                              ▲
//!                              │ handle_key_event()
//!                         ┌──────────┐
//!                         │ input.rs │
//!                         └──────────┘
//! ```
//!
//! * **`cli`** — flags, turned into a `TailerConfig`.
//! * **`poll`** — starts the tailer with channel-backed parser and observer.
//! * **`app`** — owns all UI state (lines, scroll position, status).
//! * **`ui`** — pure rendering: reads `App` state and draws widgets.
//! * **`input`** — maps key events to `App` mutations.
//! * **`main`** — wires everything together. `--plain` skips the UI and
//!   prints lines to stdout with `tracing` diagnostics on stderr.

mod app;
mod cli;
mod input;
mod poll;
mod ui;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tailf::{parser_fn, Lines, OverlapPolicy, Tailer, TracingObserver};
use tracing_subscriber::EnvFilter;

use app::App;
use cli::Cli;

// ---------------------------------------------------------------------------
// RAII terminal guard — idiomatic cleanup even on panic
// ---------------------------------------------------------------------------

/// Manages terminal raw-mode and alternate-screen lifetime via [`Drop`].
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Restore the terminal before printing a panic message.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

/// Drives manual-policy tailers from the display loop.
struct ManualClock {
    every: Duration,
    last: Option<Instant>,
}

impl ManualClock {
    fn for_tailer(tailer: &Tailer) -> Option<Self> {
        (tailer.policy() == OverlapPolicy::Manual).then(|| Self {
            every: tailer.interval(),
            last: None,
        })
    }

    fn due(&mut self) -> bool {
        let now = Instant::now();
        if self.last.is_some_and(|last| now - last < self.every) {
            return false;
        }
        self.last = Some(now);
        true
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Timer-driven tailers spawn onto whatever runtime is entered.
    let runtime = tokio::runtime::Runtime::new()?;
    let _entered = runtime.enter();

    if cli.plain {
        run_plain(&cli, &runtime)
    } else {
        install_panic_hook();
        run_tui(&cli)
    }
}

/// Print new lines as `[n] text` until polling stops or Ctrl-C.
fn run_plain(cli: &Cli, runtime: &tokio::runtime::Runtime) -> Result<()> {
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let parser = parser_fn(|new: &Lines, _all: &Lines| {
        let mut out = io::stdout().lock();
        for (line_no, line) in new {
            writeln!(out, "[{line_no}] {line}")?;
        }
        out.flush()?;
        Ok(())
    });
    let tailer = Tailer::new(cli.tailer_config(parser, Arc::new(TracingObserver)))?;
    let mut clock = ManualClock::for_tailer(&tailer);

    runtime.block_on(async {
        let mut check = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tailer.stop();
                    break;
                }
                _ = check.tick() => {
                    if !tailer.is_running() {
                        break;
                    }
                    if clock.as_mut().is_some_and(ManualClock::due) {
                        let tailer = tailer.clone();
                        tokio::task::spawn_blocking(move || tailer.tick()).await??;
                    }
                }
            }
        }
        anyhow::Ok(())
    })
}

/// Live-updating terminal view of the tailed lines.
fn run_tui(cli: &Cli) -> Result<()> {
    let poller = poll::spawn(cli)?;
    let tailer = poller.tailer;
    let mut clock = ManualClock::for_tailer(&tailer);

    // -- terminal setup (RAII — Drop restores on exit or panic) --------------
    let mut guard = TerminalGuard::new()?;
    let mut app = App::new(&cli.source);

    // -- main event loop -----------------------------------------------------
    // Runs at ~10 fps (100 ms tick). Each iteration:
    //   1. Drain lines and events from the tailer.
    //   2. Render the UI.
    //   3. Poll for keyboard input (non-blocking, up to tick_rate).
    let tick_rate = Duration::from_millis(100);

    loop {
        if clock.as_mut().is_some_and(ManualClock::due) {
            if let Err(e) = tailer.tick() {
                app.status = format!("Error: {e}");
            }
        }

        // 1. Process tailer output
        while let Ok(batch) = poller.lines.try_recv() {
            app.merge_lines(batch);
        }
        while let Ok(event) = poller.events.try_recv() {
            app.apply_event(&event);
        }
        app.running = tailer.is_running();
        app.iterations = tailer.iterations();

        // 2. Render
        guard.terminal.draw(|f| ui::draw(&mut app, f))?;

        // 3. Handle input
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                input::handle_key_event(&mut app, key);
            }
        }

        if app.toggle_requested {
            app.toggle_requested = false;
            tailer.set_running(!tailer.is_running())?;
        }

        if app.quit {
            break;
        }
    }

    if tailer.is_running() {
        tailer.stop();
    }
    // `guard` is dropped here, restoring the terminal.
    Ok(())
}
