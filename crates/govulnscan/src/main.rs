//! govulnscan command-line interface
//!
//! Thin shell around the scanner crates: flag parsing, database selection,
//! source/binary auto-detection, and exit-code mapping. Findings in text
//! mode exit 3; `-json` always exits 0 so consumers inspect the stream.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use govulnscan_core::{CancelToken, Platform, ScanLevel};
use govulnscan_graph::{LoadConfig, PackageGraph};
use govulnscan_scanner::{config_message, scan_binary, scan_source, Handler, ScanError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod output;

use cli::{Cli, Commands, Mode};
use output::{JsonHandler, TextHandler};

/// Exit code for a finding-bearing run.
const EXIT_VULNS_FOUND: u8 = 3;
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if let Some(ScanError::VulnsFound) = error.downcast_ref::<ScanError>() {
                return ExitCode::from(EXIT_VULNS_FOUND);
            }
            if error.downcast_ref::<UsageError>().is_some() {
                eprintln!("govulnscan: {error:#}");
                return ExitCode::from(EXIT_USAGE);
            }
            eprintln!("govulnscan: {error:#}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug)]
struct UsageError(String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}

fn usage(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UsageError(message.into()))
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            println!("govulnscan {}", govulnscan_core::VERSION);
            Ok(())
        }
        Commands::Scan {
            patterns,
            json,
            verbose,
            test,
            tags,
            mode,
            scan_level,
            db,
            chdir,
            goos,
            goarch,
        } => {
            if let Some(dir) = &chdir {
                std::env::set_current_dir(dir)
                    .with_context(|| format!("changing directory to {}", dir.display()))?;
            }

            let mode = detect_mode(mode, &patterns)?;
            if test && mode == Mode::Binary {
                return Err(usage("the --test flag applies to source scans only"));
            }
            if mode == Mode::Binary && patterns.len() != 1 {
                return Err(usage("binary mode takes exactly one executable path"));
            }

            let mut platform = Platform::default();
            if let Some(goos) = goos {
                platform.goos = goos;
            }
            if let Some(goarch) = goarch {
                platform.goarch = goarch;
            }

            let cancel = CancelToken::new();
            let sources = config::db_sources(db.as_deref());
            let client = config::open_client(&sources, &cancel)?;
            debug!(db = %client.describe(), "database ready");

            let found = if json {
                let stdout = std::io::stdout().lock();
                let mut handler = JsonHandler::new(stdout);
                run_scan(
                    mode, &patterns, &client, &platform, scan_level, test, &tags, &cancel,
                    &mut handler,
                )?
            } else {
                let stdout = std::io::stdout().lock();
                let mut handler = TextHandler::new(stdout, verbose);
                run_scan(
                    mode, &patterns, &client, &platform, scan_level, test, &tags, &cancel,
                    &mut handler,
                )?;
                handler.finish()?
            };

            // In text mode a finding-bearing run exits 3; the JSON stream
            // carries the verdict instead.
            if found && !json {
                return Err(ScanError::VulnsFound.into());
            }
            Ok(())
        }
    }
}

/// Source mode if any pattern is a package pattern; binary mode if the
/// single pattern names an existing regular file.
fn detect_mode(mode: Option<Mode>, patterns: &[String]) -> Result<Mode> {
    if let Some(mode) = mode {
        return Ok(mode);
    }
    if patterns.len() == 1 && Path::new(&patterns[0]).is_file() {
        return Ok(Mode::Binary);
    }
    Ok(Mode::Source)
}

#[allow(clippy::too_many_arguments)]
fn run_scan(
    mode: Mode,
    patterns: &[String],
    client: &govulnscan_db::Client,
    platform: &Platform,
    level: ScanLevel,
    include_tests: bool,
    tags: &[String],
    cancel: &CancelToken,
    handler: &mut dyn Handler,
) -> Result<bool> {
    match mode {
        Mode::Source => {
            let go_version = govulnscan_graph::toolchain_version(None, cancel)?;
            handler.config(&config_message(client, Some(&go_version), level))?;

            let load_config = LoadConfig {
                dir: None,
                tags: tags.to_vec(),
                include_tests,
            };
            let list = govulnscan_graph::load_packages(patterns, &load_config, cancel)?;
            if list.is_empty() {
                bail!("no packages matched the given patterns");
            }
            let packages = PackageGraph::from_list(list, &go_version)?;
            Ok(scan_source(
                &packages, client, platform, level, handler, cancel,
            )?)
        }
        Mode::Binary => {
            let path = Path::new(&patterns[0]);
            let binary = govulnscan_binary::inspect(path, cancel)
                .with_context(|| format!("inspecting {}", path.display()))?;
            handler.config(&config_message(client, Some(&binary.go_version), level))?;
            Ok(scan_binary(&binary, client, platform, level, handler)?)
        }
    }
}
