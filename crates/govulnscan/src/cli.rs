use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use govulnscan_core::ScanLevel;

#[derive(Parser, Debug)]
#[command(
    name = "govulnscan",
    version,
    about = "Find known vulnerabilities that actually affect your Go code",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan package patterns (source mode) or an executable (binary mode)
    #[command(after_help = "EXAMPLES:
  # Scan the current module
  govulnscan scan ./...

  # Machine-readable stream for CI
  govulnscan scan --json ./... > findings.json

  # Scan a compiled binary
  govulnscan scan ./bin/server

  # Module-level triage only (no call graph)
  govulnscan scan --scan module ./...

EXIT CODES:
  0  no vulnerabilities (always 0 with --json)
  2  usage error
  3  vulnerabilities found")]
    Scan {
        /// Package patterns, or a single path to an executable
        #[arg(required = true, value_name = "PATTERN")]
        patterns: Vec<String>,

        /// Emit the structured line-delimited JSON stream
        #[arg(long)]
        json: bool,

        /// Show full call stacks instead of one-line summaries
        #[arg(long, short = 'v')]
        verbose: bool,

        /// Include test-only packages (source mode only)
        #[arg(long)]
        test: bool,

        /// Build tags (comma-separated; source mode only)
        #[arg(long, value_name = "LIST", value_delimiter = ',')]
        tags: Vec<String>,

        /// Force the analysis mode instead of auto-detecting
        #[arg(long, value_enum, value_name = "MODE")]
        mode: Option<Mode>,

        /// Cap finding precision
        #[arg(long = "scan", value_enum, value_name = "LEVEL", default_value = "symbol")]
        scan_level: ScanLevel,

        /// Vulnerability database source (overrides GOVULNDB)
        #[arg(long, value_name = "URL")]
        db: Option<String>,

        /// Change working directory before scanning
        #[arg(short = 'C', value_name = "DIR")]
        chdir: Option<PathBuf>,

        /// Target operating system for platform filters
        #[arg(long, value_name = "GOOS")]
        goos: Option<String>,

        /// Target architecture for platform filters
        #[arg(long, value_name = "GOARCH")]
        goarch: Option<String>,
    },

    /// Print version information
    Version,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Source,
    Binary,
}
