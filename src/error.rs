//! Tailer error types.
//!
//! Only failures that must escape the tailer's call boundary live here:
//! construction errors and snapshot contract violations. Attainer and parser
//! failures during a tick are plain [`anyhow::Error`]s that stay inside the
//! tick and are reported through the [`Observer`](crate::observer::Observer).

use std::string::FromUtf8Error;

use thiserror::Error;

/// Result type for tailer operations.
pub type TailResult<T> = Result<T, TailError>;

/// Errors that propagate out of the tailer.
#[derive(Debug, Error)]
pub enum TailError {
    /// The configuration record carried no attainer.
    #[error("expected an attainer to be configured")]
    MissingAttainer,

    /// The configuration record carried no parser.
    #[error("expected a parser to be configured")]
    MissingParser,

    /// The attainer produced a snapshot that is not text.
    #[error("expected attainer to return text, received {len} bytes of non UTF-8 data")]
    NonText {
        /// Length of the rejected snapshot.
        len: usize,
        /// The decoding failure.
        #[source]
        source: FromUtf8Error,
    },

    /// A timer-driven policy was started without a tokio runtime to run on.
    #[error("timer-driven tailing requires a tokio runtime (use the manual policy to drive ticks yourself)")]
    NoRuntime,
}
