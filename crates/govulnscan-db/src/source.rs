//! Byte sources for the database layout
//!
//! A source serves raw endpoint bytes: `index/db`, `index/modules`, and
//! `ID/<id>`. The HTTP source appends `.json.gz` and gunzips transparently;
//! the file source appends `.json`; the in-memory source serves a prebuilt
//! map. A missing endpoint is `Ok(None)`, never an error.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

use flate2::read::GzDecoder;
use govulnscan_core::CancelToken;
use tracing::debug;

use crate::error::{DbError, Result};

pub trait Source: Send + Sync {
    /// Fetch an endpoint. `Ok(None)` means the endpoint does not exist.
    fn get(&self, endpoint: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>>;

    /// Human-readable identity of the source, reported in `Config.db`.
    fn describe(&self) -> String;
}

/// HTTP(S) source. One agent is shared across all fetches.
pub struct HttpSource {
    agent: ureq::Agent,
    base: String,
}

impl HttpSource {
    pub fn new(base: impl Into<String>) -> Self {
        HttpSource {
            agent: ureq::AgentBuilder::new().build(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Source for HttpSource {
    fn get(&self, endpoint: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let url = format!("{}/{}.json.gz", self.base, endpoint);
        debug!(url, "fetching database endpoint");
        match self.agent.get(&url).call() {
            Ok(resp) => {
                let mut compressed = Vec::new();
                resp.into_reader().read_to_end(&mut compressed)?;
                let mut body = Vec::new();
                GzDecoder::new(compressed.as_slice()).read_to_end(&mut body)?;
                Ok(Some(body))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(code, _)) => Err(DbError::Status(code)),
            Err(e) => Err(DbError::Transport(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

/// Local-filesystem source over an uncompressed copy of the layout.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSource { root: root.into() }
    }
}

impl Source for FileSource {
    fn get(&self, endpoint: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let path = self.root.join(format!("{endpoint}.json"));
        match std::fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DbError::Io(e)),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

/// In-memory source. The map is keyed by bare endpoint (`index/db`,
/// `ID/GO-2021-0113`) and is read-only after construction.
pub struct MemorySource {
    entries: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new(entries: HashMap<String, Vec<u8>>) -> Self {
        MemorySource { entries }
    }

    /// Build a source serving the full layout for the given OSV entries,
    /// with the index derived from them.
    pub fn from_entries(entries: &[govulnscan_osv::Entry]) -> Self {
        use std::collections::BTreeMap;

        let mut map = HashMap::new();
        let modified = entries
            .iter()
            .map(|e| e.modified)
            .max()
            .unwrap_or_else(chrono::Utc::now);
        map.insert(
            "index/db".to_string(),
            serde_json::to_vec(&serde_json::json!({ "modified": modified })).unwrap(),
        );

        let mut by_module: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
        for entry in entries {
            for affected in &entry.affected {
                let fixed = govulnscan_osv::latest_fixed(&entry.affected, &affected.module.path);
                let mut vuln = serde_json::json!({
                    "id": entry.id,
                    "modified": entry.modified,
                });
                if let Some(fixed) = fixed {
                    vuln["fixed"] = serde_json::Value::String(fixed);
                }
                by_module
                    .entry(affected.module.path.clone())
                    .or_default()
                    .push(vuln);
            }
            map.insert(
                format!("ID/{}", entry.id),
                serde_json::to_vec(entry).unwrap(),
            );
        }

        let index: Vec<serde_json::Value> = by_module
            .into_iter()
            .map(|(path, vulns)| serde_json::json!({ "path": path, "vulns": vulns }))
            .collect();
        map.insert(
            "index/modules".to_string(),
            serde_json::to_vec(&index).unwrap(),
        );

        MemorySource::new(map)
    }
}

impl Source for MemorySource {
    fn get(&self, endpoint: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        Ok(self.entries.get(endpoint).cloned())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
