//! Line buffer and the snapshot diff.
//!
//! Growth is detected by line count alone: a snapshot with as many lines as
//! the buffer is stale, even if an existing line was edited in place. That is
//! sufficient for append-only sources such as logs and avoids rescanning the
//! content.

use crate::source::Lines;

/// Outcome of applying one snapshot to the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diff {
    /// Lines appended by this snapshot, keyed by position.
    pub new_lines: Lines,
    /// The snapshot's line count differed from the buffer's.
    pub changed: bool,
    /// Consecutive stale snapshots after this one.
    pub stale_count: u32,
}

/// Every line seen so far plus the consecutive no-growth counter.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    lines: Lines,
    stale_count: u32,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `snapshot` against the buffer and absorb any new lines.
    ///
    /// The snapshot is split on `'\n'`, so an empty snapshot is one empty line
    /// and a trailing newline yields a trailing empty line. A snapshot with
    /// fewer lines than the buffer resets the stale counter but appends
    /// nothing; keys stay `1..=N` with `N` never shrinking.
    pub fn apply(&mut self, snapshot: &str) -> Diff {
        let attained: Vec<&str> = snapshot.split('\n').collect();
        let known = self.lines.len();

        if attained.len() == known {
            self.stale_count = self.stale_count.saturating_add(1);
            return Diff {
                new_lines: Lines::new(),
                changed: false,
                stale_count: self.stale_count,
            };
        }

        self.stale_count = 0;
        let mut new_lines = Lines::new();
        for (idx, line) in attained.iter().enumerate().skip(known) {
            new_lines.insert(idx + 1, (*line).to_owned());
            self.lines.insert(idx + 1, (*line).to_owned());
        }

        Diff {
            new_lines,
            changed: true,
            stale_count: 0,
        }
    }

    /// Count a tick that produced no snapshot at all.
    pub fn mark_stale(&mut self) -> u32 {
        self.stale_count = self.stale_count.saturating_add(1);
        self.stale_count
    }

    pub fn reset_stale(&mut self) {
        self.stale_count = 0;
    }

    pub fn stale_count(&self) -> u32 {
        self.stale_count
    }

    pub fn lines(&self) -> &Lines {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
