//! Output handlers
//!
//! Two consumers of the emission stream: the JSON handler writes it out
//! verbatim as line-delimited messages, the text handler buffers it and
//! renders a human-readable report when the scan finishes.

use std::collections::BTreeMap;
use std::io::Write;

use govulnscan_core::{Config, Finding, Message, Progress, ScanLevel};
use govulnscan_osv::Entry;
use govulnscan_reachability::summarize;
use govulnscan_scanner::Handler;

/// Writes the raw message stream, one JSON object per line.
pub struct JsonHandler<W: Write> {
    out: W,
}

impl<W: Write> JsonHandler<W> {
    pub fn new(out: W) -> Self {
        JsonHandler { out }
    }

    fn write(&mut self, message: &Message) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> Handler for JsonHandler<W> {
    fn config(&mut self, config: &Config) -> anyhow::Result<()> {
        self.write(&Message::Config(config.clone()))
    }

    fn progress(&mut self, progress: &Progress) -> anyhow::Result<()> {
        self.write(&Message::Progress(progress.clone()))
    }

    fn osv(&mut self, entry: &Entry) -> anyhow::Result<()> {
        self.write(&Message::Osv(entry.clone()))
    }

    fn finding(&mut self, finding: &Finding) -> anyhow::Result<()> {
        self.write(&Message::Finding(finding.clone()))
    }
}

/// Buffers the stream and renders a report on `finish`.
pub struct TextHandler<W: Write> {
    out: W,
    verbose: bool,
    scan_level: ScanLevel,
    osvs: BTreeMap<String, Entry>,
    findings: Vec<Finding>,
}

impl<W: Write> TextHandler<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        TextHandler {
            out,
            verbose,
            scan_level: ScanLevel::Symbol,
            osvs: BTreeMap::new(),
            findings: Vec::new(),
        }
    }

    /// The precision an OSV's findings reached. Findings of one OSV all
    /// share a level, so the first one answers.
    fn achieved_level(&self, id: &str) -> Option<ScanLevel> {
        self.findings
            .iter()
            .find(|f| f.osv == id)
            .map(|f| f.level())
    }

    /// Render the buffered report. Returns whether any findings were shown.
    pub fn finish(&mut self) -> anyhow::Result<bool> {
        if self.osvs.is_empty() {
            writeln!(self.out, "No vulnerabilities found.")?;
            return Ok(false);
        }

        // OSVs whose evidence reached the strongest precision any OSV
        // achieved in this run are the headline results; the rest are
        // advisory and reported as a count.
        let best = self
            .osvs
            .keys()
            .filter_map(|id| self.achieved_level(id))
            .max()
            .unwrap_or(self.scan_level);
        let actionable: Vec<&String> = self
            .osvs
            .keys()
            .filter(|id| self.achieved_level(id) == Some(best))
            .collect();
        let informational: Vec<&String> = self
            .osvs
            .keys()
            .filter(|id| !actionable.contains(id))
            .collect();

        match actionable.len() {
            1 => writeln!(self.out, "Found 1 known vulnerability affecting this target.\n")?,
            n => writeln!(
                self.out,
                "Found {n} known vulnerabilities affecting this target.\n",
            )?,
        }

        let shown = self
            .osvs
            .iter()
            .filter(|(id, _)| actionable.contains(id));
        for (index, (id, entry)) in shown.enumerate() {
            writeln!(self.out, "Vulnerability #{}: {}", index + 1, id)?;
            if let Some(summary) = &entry.summary {
                writeln!(self.out, "    {summary}")?;
            }
            writeln!(self.out, "  More info: https://pkg.go.dev/vuln/{id}")?;

            for finding in self.findings.iter().filter(|f| &f.osv == id) {
                let frame = &finding.trace[0];
                let found = match &frame.version {
                    Some(version) => format!("{}@{}", frame.module, version),
                    None => frame.module.clone(),
                };
                writeln!(self.out, "  Module: {}", frame.module)?;
                writeln!(self.out, "    Found in: {found}")?;
                match &finding.fixed_version {
                    Some(fixed) => {
                        writeln!(self.out, "    Fixed in: {}@{}", frame.module, fixed)?
                    }
                    None => writeln!(self.out, "    Fixed in: N/A")?,
                }

                match finding.level() {
                    ScanLevel::Symbol if finding.trace.len() > 1 => {
                        if self.verbose {
                            writeln!(self.out, "    Trace:")?;
                            for frame in &finding.trace {
                                let name = match (&frame.function, &frame.receiver) {
                                    (Some(function), Some(receiver)) => {
                                        format!("{receiver}.{function}")
                                    }
                                    (Some(function), None) => function.clone(),
                                    _ => continue,
                                };
                                let position = frame
                                    .position
                                    .as_ref()
                                    .map(|p| format!(" at {}:{}:{}", p.filename, p.line, p.column))
                                    .unwrap_or_default();
                                writeln!(
                                    self.out,
                                    "      {}.{name}{position}",
                                    frame.package.as_deref().unwrap_or(&frame.module),
                                )?;
                            }
                        } else if let Some(summary) = summarize(&finding.trace) {
                            writeln!(self.out, "    Example: {summary}")?;
                        }
                    }
                    ScanLevel::Package => {
                        if let Some(package) = &frame.package {
                            writeln!(
                                self.out,
                                "    Vulnerable package {package} is imported, but no \
                                 vulnerable symbols appear to be called.",
                            )?;
                        }
                    }
                    _ => {}
                }
            }
            writeln!(self.out)?;
        }

        if !informational.is_empty() {
            writeln!(
                self.out,
                "{} more {} found in modules you require, but no vulnerable code \
                 appears to be reached: {}.",
                informational.len(),
                if informational.len() == 1 {
                    "vulnerability"
                } else {
                    "vulnerabilities"
                },
                informational
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            )?;
        }
        Ok(true)
    }
}

impl<W: Write> Handler for TextHandler<W> {
    fn config(&mut self, config: &Config) -> anyhow::Result<()> {
        self.scan_level = config.scan_level;
        Ok(())
    }

    fn progress(&mut self, progress: &Progress) -> anyhow::Result<()> {
        writeln!(self.out, "{}", progress.message)?;
        Ok(())
    }

    fn osv(&mut self, entry: &Entry) -> anyhow::Result<()> {
        self.osvs.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn finding(&mut self, finding: &Finding) -> anyhow::Result<()> {
        self.findings.push(finding.clone());
        Ok(())
    }
}
