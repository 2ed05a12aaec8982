//! Snapshot a file on disk.
//!
//! The whole file is re-read every tick; the tailer works out which lines are
//! new. A file that does not exist (yet) is an empty snapshot, so tailing can
//! start before the writer has created it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{Attained, Attainer};

/// An attainer reading a file's full contents.
#[derive(Debug, Clone)]
pub struct FileAttainer {
    path: PathBuf,
    lossy: bool,
}

impl FileAttainer {
    /// Tail the file at `path`.
    ///
    /// Content that is not valid UTF-8 stops the tailer; see [`lossy`](Self::lossy)
    /// to replace invalid sequences instead.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lossy: false,
        }
    }

    /// Replace invalid UTF-8 with `U+FFFD` rather than rejecting the snapshot.
    pub fn lossy(mut self) -> Self {
        self.lossy = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Attainer for FileAttainer {
    fn attain(&self) -> Result<Attained> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Attained::Text(String::new())),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        if self.lossy {
            Ok(Attained::Text(String::from_utf8_lossy(&bytes).into_owned()))
        } else {
            Ok(Attained::Bytes(bytes))
        }
    }
}
