//! Client for the versioned Go vulnerability database layout
//!
//! The database is served under a fixed layout:
//! - `index/db`: metadata (`{ "modified": ... }`)
//! - `index/modules`: per-module vulnerability summaries
//! - `ID/<id>`: one OSV entry per id
//!
//! Sources lacking `index/db` are rejected with a fixed `unsupported schema`
//! error. Entries are fetched lazily, cached for the lifetime of the client
//! (one scan), and batch fetches run with a fixed concurrency bound. Errors
//! are surfaced unwrapped: no retries, no backoff.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use govulnscan_core::CancelToken;
use govulnscan_osv::Entry;
use tracing::debug;

mod error;
mod index;
mod source;

pub use error::{DbError, Result};
pub use index::{scan_modules, DbMeta, ModuleIndexEntry, ModuleVulnRef};
pub use source::{FileSource, HttpSource, MemorySource, Source};

/// Upper bound on concurrent `ID/<id>` fetches in one batch.
const MAX_CONCURRENT_FETCHES: usize = 10;

pub struct Client {
    source: Box<dyn Source>,
    cancel: CancelToken,
    meta: DbMeta,
    modules_raw: RefCell<Option<Arc<Vec<u8>>>>,
    entries: RefCell<HashMap<String, Arc<Entry>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("source", &self.source.describe())
            .field("meta", &self.meta)
            .finish()
    }
}

impl Client {
    /// Open a client over a source, validating the layout.
    pub fn new(source: Box<dyn Source>, cancel: CancelToken) -> Result<Self> {
        let raw = source
            .get("index/db", &cancel)?
            .ok_or(DbError::UnsupportedSchema)?;
        let meta: DbMeta = serde_json::from_slice(&raw)?;
        Ok(Client {
            source,
            cancel,
            meta,
            modules_raw: RefCell::new(None),
            entries: RefCell::new(HashMap::new()),
        })
    }

    /// When the database was last modified.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.meta.modified
    }

    /// Identity of the backing source.
    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// All entries for a module, sorted by id and deduplicated.
    pub fn by_module(&self, path: &str) -> Result<Vec<Arc<Entry>>> {
        self.by_module_version(path, None)
    }

    /// Entries for a module whose ranges cover `version` (when given).
    /// `version` accepts both module (`v1.2.3`) and toolchain (`go1.21.3`)
    /// spellings.
    pub fn by_module_version(&self, path: &str, version: Option<&str>) -> Result<Vec<Arc<Entry>>> {
        let Some(index_entry) = self.module_index_entry(path)? else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = index_entry.vulns.iter().map(|v| v.id.clone()).collect();
        let mut entries = self.by_ids(&ids)?;

        if let Some(raw) = version {
            if let Some(v) = govulnscan_osv::canonical_version(raw) {
                entries.retain(|entry| {
                    entry
                        .affected_for_module(path)
                        .any(|a| govulnscan_osv::affects(&a.ranges, &v))
                });
            }
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries.dedup_by(|a, b| a.id == b.id);
        Ok(entries)
    }

    /// One entry by id; `None` when the database has no such entry.
    pub fn by_id(&self, id: &str) -> Result<Option<Arc<Entry>>> {
        if let Some(entry) = self.entries.borrow().get(id) {
            return Ok(Some(Arc::clone(entry)));
        }
        let Some(body) = self.source.get(&format!("ID/{id}"), &self.cancel)? else {
            return Ok(None);
        };
        let entry: Entry = serde_json::from_slice(&body)?;
        let entry = Arc::new(entry);
        self.entries
            .borrow_mut()
            .insert(id.to_string(), Arc::clone(&entry));
        Ok(Some(entry))
    }

    /// Batched fetch. Sub-fetches run on at most [`MAX_CONCURRENT_FETCHES`]
    /// threads; any sub-fetch error fails the whole batch and partial
    /// results are never surfaced. Ids the database no longer serves are
    /// skipped.
    pub fn by_ids(&self, ids: &[String]) -> Result<Vec<Arc<Entry>>> {
        let missing: Vec<&String> = {
            let cache = self.entries.borrow();
            ids.iter().filter(|id| !cache.contains_key(*id)).collect()
        };

        if !missing.is_empty() {
            debug!(count = missing.len(), "batch fetching vulnerability entries");
        }

        for chunk in missing.chunks(MAX_CONCURRENT_FETCHES) {
            let results: Vec<Result<Option<Vec<u8>>>> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|id| {
                        let source = &self.source;
                        let cancel = &self.cancel;
                        let endpoint = format!("ID/{id}");
                        scope.spawn(move || source.get(&endpoint, cancel))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join()
                            .unwrap_or_else(|_| Err(DbError::Transport("fetch panicked".into())))
                    })
                    .collect()
            });

            let mut cache = self.entries.borrow_mut();
            for (id, result) in chunk.iter().zip(results) {
                if let Some(body) = result? {
                    let entry: Entry = serde_json::from_slice(&body)?;
                    cache.insert((*id).clone(), Arc::new(entry));
                }
            }
        }

        let cache = self.entries.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| cache.get(id).map(Arc::clone))
            .collect())
    }

    fn module_index_entry(&self, path: &str) -> Result<Option<ModuleIndexEntry>> {
        let raw = {
            let mut slot = self.modules_raw.borrow_mut();
            match slot.as_ref() {
                Some(raw) => Arc::clone(raw),
                None => {
                    let body = self
                        .source
                        .get("index/modules", &self.cancel)?
                        .ok_or(DbError::UnsupportedSchema)?;
                    let raw = Arc::new(body);
                    *slot = Some(Arc::clone(&raw));
                    raw
                }
            }
        };
        scan_modules(&raw, path)
    }
}
