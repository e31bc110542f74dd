//! Environment-driven configuration
//!
//! `GOVULNDB` holds a comma-separated list of database sources (http://,
//! https://, file://), tried in order; the `--db` flag takes precedence.
//! `GOVERSION` overrides the toolchain version used for stdlib queries and
//! is consumed by the package loader.

use anyhow::{bail, Context, Result};
use govulnscan_core::CancelToken;
use govulnscan_db::{Client, FileSource, HttpSource, Source};
use tracing::debug;

/// Default vulnerability database.
pub const DEFAULT_DB: &str = "https://vuln.go.dev";

/// Resolve the database source list: flag, then `GOVULNDB`, then default.
pub fn db_sources(flag: Option<&str>) -> Vec<String> {
    let raw = match flag {
        Some(flag) => flag.to_string(),
        None => match std::env::var("GOVULNDB") {
            Ok(env) if !env.is_empty() => env,
            _ => DEFAULT_DB.to_string(),
        },
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Open a client over the first source that serves the supported layout.
pub fn open_client(sources: &[String], cancel: &CancelToken) -> Result<Client> {
    let mut last_error = None;
    for url in sources {
        let source = source_for_url(url)?;
        match Client::new(source, cancel.clone()) {
            Ok(client) => {
                debug!(%url, "using vulnerability database");
                return Ok(client);
            }
            Err(e) => last_error = Some((url.clone(), e)),
        }
    }
    match last_error {
        Some((url, e)) => Err(e).with_context(|| format!("opening vulnerability database {url}")),
        None => bail!("no vulnerability database sources configured"),
    }
}

fn source_for_url(url: &str) -> Result<Box<dyn Source>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(Box::new(HttpSource::new(url)))
    } else if let Some(path) = url.strip_prefix("file://") {
        Ok(Box::new(FileSource::new(path)))
    } else {
        bail!("unsupported database source {url}: expected http://, https://, or file://");
    }
}
