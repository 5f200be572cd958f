//! Command-line interface for the switchbank bridge.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use switchbank_core::config::{defaults, env_vars};
use switchbank_core::{DataTree, FilteredReceiver, TreeEvent};
use switchbank_devices::{build_digest, normalize_into, SwitchbankService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Switchbank - NMEA 2000 switch bank bridge.
#[derive(Parser, Debug)]
#[command(name = "switchbank")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an options file and print the normalized configuration.
    Check {
        /// Options file (.json or .toml).
        options: PathBuf,
    },
    /// Print the metadata digest for an options file.
    Metadata {
        /// Options file (.json or .toml).
        options: PathBuf,
    },
    /// Run the bridge, reading put and delta lines from stdin.
    Run {
        /// Options file (.json or .toml).
        options: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Check { options } => check(&options),
        Command::Metadata { options } => metadata(&options),
        Command::Run { options } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(run(&options));
            // the stdin reader thread may still be blocked on a read
            runtime.shutdown_background();
            result
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "switchbank=debug"
    } else {
        "switchbank=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // stdout carries command output, logs go to stderr
    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Read plugin options from a JSON or TOML file.
fn load_options(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        let value: toml::Value =
            toml::from_str(&text).with_context(|| format!("invalid TOML in {}", path.display()))?;
        Ok(serde_json::to_value(value)?)
    } else {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

fn check(path: &Path) -> Result<()> {
    let options = load_options(path)?;
    let mut issues = Vec::new();
    let loaded = normalize_into(&options, &mut issues);
    for issue in &issues {
        println!("warning: {}", issue);
    }
    let configuration = loaded?;

    println!(
        "{} switch and {} relay switch banks",
        configuration.switch_count(),
        configuration.relay_count()
    );
    println!("{}", serde_json::to_string_pretty(&configuration)?);
    Ok(())
}

fn metadata(path: &Path) -> Result<()> {
    let options = load_options(path)?;
    let mut issues = Vec::new();
    let configuration = normalize_into(&options, &mut issues)?;
    for issue in &issues {
        warn!("{}", issue);
    }
    println!("{}", serde_json::to_string_pretty(&build_digest(&configuration))?);
    Ok(())
}

type ReportReceiver = FilteredReceiver<fn(&TreeEvent) -> bool>;

fn is_report(event: &TreeEvent) -> bool {
    event.is_outbound() || event.is_status()
}

/// Print every pending outbound message and status report.
fn drain(reports: &mut ReportReceiver) {
    while let Some((event, _)) = reports.try_recv() {
        match event {
            TreeEvent::Outbound {
                channel, payload, ..
            } => println!("{}: {}", channel, payload),
            TreeEvent::Status {
                severity, message, ..
            } => println!("[{}] {}", severity, message),
            _ => {}
        }
    }
}

async fn run(path: &Path) -> Result<()> {
    let options = load_options(path)?;
    let tree = DataTree::new();
    let mut reports: ReportReceiver = tree
        .bus()
        .subscribe_filtered(is_report as fn(&TreeEvent) -> bool);

    let service = SwitchbankService::new(tree.clone());
    let started = service.start(&options).await;
    drain(&mut reports);
    started?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let Err(e) = apply_line(&tree, &line) {
                            warn!(line = %line, error = %e, "ignoring input line");
                        }
                        drain(&mut reports);
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }
    }

    service.stop();
    drain(&mut reports);
    Ok(())
}

/// Apply one `{"put": {...}}` or `{"delta": {...}}` line to the tree.
fn apply_line(tree: &DataTree, line: &str) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let input: Value = serde_json::from_str(line)?;

    if let Some(put) = input.get("put") {
        let (path, value) = path_and_value(put)?;
        let response = tree.put(defaults::CONTEXT, path, value);
        if !response.is_success() {
            println!("put {}: status {}", path, response.status_code);
        }
    } else if let Some(delta) = input.get("delta") {
        let (path, value) = path_and_value(delta)?;
        tree.handle_delta(path, value.clone(), "stdin");
    } else {
        bail!("expected a 'put' or 'delta' object");
    }
    Ok(())
}

fn path_and_value(entry: &Value) -> Result<(&str, &Value)> {
    let path = entry
        .get("path")
        .and_then(Value::as_str)
        .context("missing 'path'")?;
    let value = entry.get("value").context("missing 'value'")?;
    Ok((path, value))
}
