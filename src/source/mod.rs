//! Capabilities the tailer is driven by.
//!
//! An [`Attainer`] produces the *complete current snapshot* of whatever is
//! being tailed; a [`Parser`] consumes the lines that are new since the
//! previous snapshot. Concrete attainers live in sub-modules (a file on disk
//! and an HTTP resource).
//!
//! ## Adding a new attainer
//!
//! 1. Create a new file in this directory (e.g. `command.rs`).
//! 2. Define a struct holding its configuration and implement [`Attainer`].
//! 3. Add `mod command;` below and re-export the struct.
//!
//! Plain closures work too, see [`attainer_fn`] and [`parser_fn`].

mod file;
mod http;

pub use file::FileAttainer;
pub use http::HttpAttainer;

use std::collections::BTreeMap;

use anyhow::Result;

use crate::error::{TailError, TailResult};

/// Lines keyed by their 1-based position in the tailed content.
pub type Lines = BTreeMap<usize, String>;

/// A snapshot returned by an [`Attainer`].
///
/// Attainers that already hold text return [`Attained::Text`]. Attainers
/// reading raw bytes (files, HTTP bodies) return [`Attained::Bytes`]; the
/// tailer requires those bytes to be UTF-8 and treats anything else as a
/// misconfigured attainer rather than a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attained {
    Text(String),
    Bytes(Vec<u8>),
}

impl Attained {
    /// Decode the snapshot into text.
    pub fn into_text(self) -> TailResult<String> {
        match self {
            Attained::Text(text) => Ok(text),
            Attained::Bytes(bytes) => {
                let len = bytes.len();
                String::from_utf8(bytes).map_err(|source| TailError::NonText { len, source })
            }
        }
    }
}

impl From<String> for Attained {
    fn from(text: String) -> Self {
        Attained::Text(text)
    }
}

impl From<&str> for Attained {
    fn from(text: &str) -> Self {
        Attained::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Attained {
    fn from(bytes: Vec<u8>) -> Self {
        Attained::Bytes(bytes)
    }
}

/// Produces the full current snapshot of the tailed content.
///
/// Called with no arguments once per tick, on a blocking worker thread, so
/// implementations must be [`Send`] + [`Sync`] and may do blocking I/O.
///
/// An empty source should yield an empty snapshot, not an error. Errors are
/// treated as transient: the tick is abandoned and, unless the tailer runs
/// with `force`, polling stops.
pub trait Attainer: Send + Sync {
    fn attain(&self) -> Result<Attained>;
}

impl<F, T> Attainer for F
where
    F: Fn() -> Result<T> + Send + Sync,
    T: Into<Attained>,
{
    fn attain(&self) -> Result<Attained> {
        self().map(Into::into)
    }
}

/// Consumes the lines discovered by a tick.
///
/// `new_lines` holds only what appeared since the previous tick and is empty
/// when nothing grew; `buffer` is everything seen so far. Deciding whether an
/// empty `new_lines` warrants any work is up to the parser.
pub trait Parser: Send + Sync {
    fn parse(&self, new_lines: &Lines, buffer: &Lines) -> Result<()>;
}

impl<F> Parser for F
where
    F: Fn(&Lines, &Lines) -> Result<()> + Send + Sync,
{
    fn parse(&self, new_lines: &Lines, buffer: &Lines) -> Result<()> {
        self(new_lines, buffer)
    }
}

/// Pin a closure to the [`Attainer`] signature so its types infer.
pub fn attainer_fn<F, T>(f: F) -> F
where
    F: Fn() -> Result<T> + Send + Sync,
    T: Into<Attained>,
{
    f
}

/// Pin a closure to the [`Parser`] signature so its types infer.
pub fn parser_fn<F>(f: F) -> F
where
    F: Fn(&Lines, &Lines) -> Result<()> + Send + Sync,
{
    f
}
