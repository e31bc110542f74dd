//! Finding emission and the specificity rule
//!
//! Findings accumulate per OSV before anything is emitted. For a given OSV
//! every emitted finding shares the highest precision achieved during the
//! scan: a strictly more specific finding replaces the accumulated set, a
//! strictly less specific one is dropped, an equal one is appended. Only at
//! the end does the stream go out, each OSV announced exactly once before
//! its findings, findings stably sorted.

use std::collections::BTreeMap;
use std::sync::Arc;

use govulnscan_core::{Config, Finding, Progress, ScanLevel};
use govulnscan_osv::Entry;

use crate::error::Result;

/// Message sinks a scan writes into. Implementations render text, JSON, or
/// anything else; the driver guarantees ordering.
pub trait Handler {
    fn config(&mut self, config: &Config) -> anyhow::Result<()>;
    fn progress(&mut self, progress: &Progress) -> anyhow::Result<()>;
    fn osv(&mut self, entry: &Entry) -> anyhow::Result<()>;
    fn finding(&mut self, finding: &Finding) -> anyhow::Result<()>;
}

pub(crate) struct Accumulator {
    max_level: ScanLevel,
    by_osv: BTreeMap<String, OsvFindings>,
}

struct OsvFindings {
    level: ScanLevel,
    findings: Vec<Finding>,
}

impl Accumulator {
    pub fn new(max_level: ScanLevel) -> Self {
        Accumulator {
            max_level,
            by_osv: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, finding: Finding) {
        let level = finding.level();
        if level > self.max_level {
            return;
        }

        let slot = self
            .by_osv
            .entry(finding.osv.clone())
            .or_insert_with(|| OsvFindings {
                level,
                findings: Vec::new(),
            });

        if level > slot.level {
            // Upgrade: the more specific evidence supersedes everything
            // accumulated so far.
            slot.level = level;
            slot.findings.clear();
        } else if level < slot.level {
            return;
        }

        if level == ScanLevel::Module {
            // Two module findings for the same module must agree on found
            // and fixed versions; divergence means the inputs are corrupt.
            for existing in &slot.findings {
                if existing.trace[0].module == finding.trace[0].module {
                    assert!(
                        existing.trace[0].version == finding.trace[0].version
                            && existing.fixed_version == finding.fixed_version,
                        "conflicting module findings for {} in {}",
                        finding.osv,
                        finding.trace[0].module,
                    );
                    return;
                }
            }
        } else if slot
            .findings
            .iter()
            .any(|existing| existing.sort_key() == finding.sort_key())
        {
            return;
        }

        slot.findings.push(finding);
    }

    /// Emit the accumulated stream: OSVs ascending, each announced once and
    /// followed by its findings in stable sorted order. Returns whether
    /// anything was emitted.
    pub fn emit(
        self,
        osvs: &BTreeMap<String, Arc<Entry>>,
        handler: &mut dyn Handler,
    ) -> Result<bool> {
        let mut any = false;
        for (id, mut slot) in self.by_osv {
            if slot.findings.is_empty() {
                continue;
            }
            let entry = osvs
                .get(&id)
                .unwrap_or_else(|| panic!("finding for unannounced OSV {id}"));
            handler.osv(entry)?;
            slot.findings.sort_by_key(|f| f.sort_key());
            for finding in &slot.findings {
                handler.finding(finding)?;
            }
            any = true;
        }
        Ok(any)
    }
}
