//! The database index endpoints
//!
//! `index/db` carries database metadata; `index/modules` is a JSON array of
//! per-module vulnerability summaries. The module index is scanned as a lazy
//! sequence so a lookup can stop at its module without decoding the rest of
//! the array.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeSeed, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `index/db`: database metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMeta {
    pub modified: DateTime<Utc>,
}

/// One element of `index/modules`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleIndexEntry {
    pub path: String,

    #[serde(default)]
    pub vulns: Vec<ModuleVulnRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleVulnRef {
    pub id: String,
    pub modified: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,
}

/// Scan the module index for a single module path, short-circuiting on the
/// first hit without materializing the remainder of the array.
pub fn scan_modules(data: &[u8], path: &str) -> Result<Option<ModuleIndexEntry>> {
    let mut de = serde_json::Deserializer::from_slice(data);
    let found = FindModule { path }.deserialize(&mut de)?;
    Ok(found)
}

struct FindModule<'a> {
    path: &'a str,
}

impl<'de> DeserializeSeed<'de> for FindModule<'_> {
    type Value = Option<ModuleIndexEntry>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for FindModule<'_> {
    type Value = Option<ModuleIndexEntry>;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a module index array")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(entry) = seq.next_element::<ModuleIndexEntry>()? {
            if entry.path == self.path {
                // Hit: abandon the rest of the sequence.
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}
