use chrono::{DateTime, Local};
use ratatui::widgets::ListState;
use tailf::{Lines, TailEvent};

pub struct App {
    /// What is being tailed, shown in the title.
    pub source: String,
    /// Every line received so far, keyed by line number. Batches from
    /// overlapping polls may arrive out of order.
    pub lines: Lines,
    /// List selection state for scrolling.
    pub list_state: ListState,
    /// Keep the selection pinned to the newest line.
    pub follow: bool,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// Whether the user asked to pause or resume polling.
    pub toggle_requested: bool,
    /// Last event from the tailer.
    pub status: String,
    pub running: bool,
    pub iterations: Option<u64>,
    /// When new lines last arrived.
    pub last_update: Option<DateTime<Local>>,
}

impl App {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lines: Lines::new(),
            list_state: ListState::default(),
            follow: true,
            quit: false,
            toggle_requested: false,
            status: "Starting…".into(),
            running: false,
            iterations: None,
            last_update: None,
        }
    }

    /// Merge a batch of new lines, keeping the view on the newest one when
    /// following.
    pub fn merge_lines(&mut self, batch: Lines) {
        if batch.is_empty() {
            return;
        }
        self.lines.extend(batch);
        self.last_update = Some(Local::now());
        if self.follow {
            self.list_state.select(Some(self.lines.len() - 1));
        }
    }

    /// Reflect a tailer event in the status bar.
    pub fn apply_event(&mut self, event: &TailEvent) {
        match event {
            TailEvent::Started { .. } => self.running = true,
            TailEvent::Stopped { .. } => self.running = false,
            // Per-tick summaries would drown out everything else.
            TailEvent::Tick { .. } | TailEvent::TickSkipped => return,
            _ => {}
        }
        self.status = event.to_string();
    }

    // -- navigation ----------------------------------------------------------

    pub fn select_next(&mut self) {
        if self.lines.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.lines.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(i));
        self.follow = i == self.lines.len() - 1;
    }

    pub fn select_previous(&mut self) {
        if self.lines.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(i));
        self.follow = false;
    }

    pub fn select_first(&mut self) {
        if !self.lines.is_empty() {
            self.list_state.select(Some(0));
            self.follow = false;
        }
    }

    pub fn select_last(&mut self) {
        self.follow = true;
        if !self.lines.is_empty() {
            self.list_state.select(Some(self.lines.len() - 1));
        }
    }
}
