//! Snapshot an HTTP resource.
//!
//! Fetches the body with a blocking `GET` every tick. Ticks run on tokio's
//! blocking pool, so the blocking client is safe to use here.

use anyhow::Result;

use super::{Attained, Attainer};

/// An attainer fetching a URL's full body.
#[derive(Debug, Clone)]
pub struct HttpAttainer {
    /// The resource to poll.
    pub url: String,
}

impl HttpAttainer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Whether `source` looks like something this attainer can fetch.
    pub fn accepts(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }
}

impl Attainer for HttpAttainer {
    fn attain(&self) -> Result<Attained> {
        let body = reqwest::blocking::get(&self.url)?
            .error_for_status()?
            .bytes()?;
        Ok(Attained::Bytes(body.to_vec()))
    }
}
