// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! packetgate-replay - Replay packet captures through a pipeline
//!
//! # Usage
//!
//! ```bash
//! # Write an example configuration
//! packetgate-replay gen-config --output packetgate.toml
//!
//! # Check a configuration file
//! packetgate-replay validate --config packetgate.toml
//!
//! # Replay a capture, waiting for the first incoming 0x3C
//! packetgate-replay replay --config packetgate.toml --capture session.txt --wait 0x3C
//! ```

mod capture;

use capture::CapturedPacket;
use clap::{Parser, Subcommand};
use packetgate::{
    Direction, MetricsSnapshot, PacketSink, Pipeline, PipelineConfig, Verdict, WaitOutcome,
    WaitPredicate,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// packetgate capture replay tool
#[derive(Parser, Debug)]
#[command(name = "packetgate-replay")]
#[command(about = "Replay packet captures through a packetgate pipeline")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config's
    /// `[pipeline] log_level`, RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "packetgate.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Feed a capture through a pipeline
    Replay {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Capture file (`<` incoming, `>` outgoing, hex bytes)
        #[arg(long)]
        capture: PathBuf,

        /// Register a waiter for this incoming type id (hex, e.g. 3C or 0x3C)
        #[arg(long, value_parser = capture::parse_type_id)]
        wait: Option<u8>,

        /// How long to wait for the `--wait` match after the capture ends (ms)
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },
}

fn main() {
    let args = Args::parse();

    let level = log_level(args.log_level.as_deref(), args.command.config_path());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match args.command {
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Validate { config } => cmd_validate(config),
        Commands::Replay {
            config,
            capture,
            wait,
            timeout_ms,
        } => cmd_replay(config, capture, wait, Duration::from_millis(timeout_ms)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

impl Commands {
    fn config_path(&self) -> Option<&Path> {
        match self {
            Commands::GenConfig { .. } => None,
            Commands::Validate { config } => Some(config),
            Commands::Replay { config, .. } => config.as_deref(),
        }
    }
}

/// `--log-level` first, then the config's `[pipeline] log_level`, then `info`.
///
/// An unreadable config falls back silently; the command reports it.
fn log_level(cli: Option<&str>, config_path: Option<&Path>) -> String {
    if let Some(level) = cli {
        return level.to_string();
    }
    config_path
        .and_then(|path| PipelineConfig::from_file(path).ok())
        .map(|config| config.pipeline.log_level)
        .unwrap_or_else(|| "info".to_string())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = PipelineConfig::example().to_toml_string()?;

    let content = format!(
        r#"# packetgate pipeline configuration
# Generated by packetgate-replay gen-config
#
# [[packets]] length 0 marks a variable-length packet.

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match PipelineConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Pipeline: {}", config.pipeline.name);
            println!("Packets:  {}", config.packets.len());
            println!("Filters:  {}", config.filters.len());
            for (i, filter) in config.filters.iter().enumerate() {
                println!(
                    "  [{}] {} {:#04x} ({} conditions)",
                    i,
                    filter.direction,
                    filter.type_id,
                    filter.conditions.len()
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

/// Sink that only counts what would reach each peer.
#[derive(Default)]
struct CountingSink {
    to_server: AtomicU64,
    to_client: AtomicU64,
}

/// Shared handle to a [`CountingSink`] (local newtype required by the orphan rule).
struct SharedCountingSink(Arc<CountingSink>);

impl PacketSink for SharedCountingSink {
    fn send_to_server(&self, _packet: &[u8]) {
        self.0.to_server.fetch_add(1, Ordering::Relaxed);
    }

    fn send_to_client(&self, _packet: &[u8]) {
        self.0.to_client.fetch_add(1, Ordering::Relaxed);
    }
}

fn cmd_replay(
    config_path: Option<PathBuf>,
    capture_path: PathBuf,
    wait: Option<u8>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let packets = capture::load(&capture_path)?;
    log::info!(
        "Replaying {} packets from {}",
        packets.len(),
        capture_path.display()
    );

    let sink = Arc::new(CountingSink::default());
    let pipeline = Pipeline::builder()
        .config(&config)
        .sink(SharedCountingSink(Arc::clone(&sink)))
        .build()?;
    pipeline.on_connected();

    let waiter = wait
        .map(|type_id| {
            pipeline.register_waiter(Direction::Incoming, WaitPredicate::new(type_id), true)
        })
        .transpose()?;

    let start = Instant::now();
    for packet in &packets {
        replay_one(&pipeline, &sink, packet);
    }

    if let Some(waiter) = waiter {
        let type_id = waiter.predicate().type_id();
        match pipeline.wait(&waiter, timeout) {
            WaitOutcome::Matched(bytes) => {
                println!("Wait {:#04x}: matched {} bytes", type_id, bytes.len());
            }
            WaitOutcome::TimedOut => println!("Wait {:#04x}: timed out", type_id),
            WaitOutcome::Closed => println!("Wait {:#04x}: connection closed", type_id),
        }
        pipeline.cancel(&waiter);
    }

    pipeline.on_disconnected();
    pipeline.shutdown()?;
    let elapsed = start.elapsed();

    println!();
    print_summary(
        &pipeline.metrics(),
        sink.to_server.load(Ordering::Relaxed),
        sink.to_client.load(Ordering::Relaxed),
        elapsed,
    );
    Ok(())
}

fn replay_one(pipeline: &Pipeline, sink: &CountingSink, packet: &CapturedPacket) {
    let verdict = match packet.direction {
        Direction::Incoming => pipeline.on_receive(&packet.bytes, packet.bytes.len()),
        Direction::Outgoing => pipeline.on_send(&packet.bytes, packet.bytes.len()),
    };
    if !pipeline.catalog().is_well_formed(&packet.bytes) {
        log::warn!(
            "line {}: {:#04x} length {} disagrees with the catalog",
            packet.line,
            packet.bytes[0],
            packet.bytes.len()
        );
    }
    log::debug!(
        "line {}: {} {:#04x} len={} -> {:?}",
        packet.line,
        packet.direction,
        packet.bytes[0],
        packet.bytes.len(),
        verdict
    );

    if verdict == Verdict::Pass {
        let counter = match packet.direction {
            Direction::Incoming => &sink.to_client,
            Direction::Outgoing => &sink.to_server,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn print_summary(metrics: &MetricsSnapshot, to_server: u64, to_client: u64, elapsed: Duration) {
    println!("--- Replay Statistics ---");
    println!("  Received:          {}", metrics.received);
    println!("  Sent:              {}", metrics.sent);
    println!("  Filtered incoming: {}", metrics.filtered_incoming);
    println!("  Filtered outgoing: {}", metrics.filtered_outgoing);
    println!("  Consumed:          {}", metrics.consumed);
    println!(
        "  Dispatched:        {} in / {} out",
        metrics.dispatched_incoming, metrics.dispatched_outgoing
    );
    println!("  Handler errors:    {}", metrics.handler_errors);
    println!("  Callback panics:   {}", metrics.callback_panics);
    println!("  Waiters signaled:  {}", metrics.waiters_signaled);
    println!("  Forwarded:         {} to server / {} to client", to_server, to_client);
    println!("  Elapsed:           {:.3}s", elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(level: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[pipeline]\nname = \"replay\"\nlog_level = \"{}\"", level).expect("write");
        file
    }

    #[test]
    fn test_log_level_from_config() {
        let file = config_file("debug");
        assert_eq!(log_level(None, Some(file.path())), "debug");
    }

    #[test]
    fn test_log_level_flag_overrides_config() {
        let file = config_file("debug");
        assert_eq!(log_level(Some("warn"), Some(file.path())), "warn");
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        assert_eq!(log_level(None, None), "info");
        let missing = Path::new("/nonexistent/packetgate.toml");
        assert_eq!(log_level(None, Some(missing)), "info");
    }
}
