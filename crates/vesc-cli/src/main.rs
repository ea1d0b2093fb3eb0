//! `vesc-cli` – VESC command-link node
//!
//! This binary runs one VESC node and gives the operator a shell over it. It:
//!
//! 1. Loads `~/.vesc/config.toml` (or the path given as the first argument),
//!    applies `VESC_*` overrides and refuses to start on invalid settings.
//! 2. Builds the frame sink, gating state, dispatcher and event bus, then
//!    starts the node's listeners and status broadcaster on a Tokio runtime.
//! 3. Drops the operator into a REPL (`/status`, `/arm`, `/drive`,
//!    `/override`, `/stats`, `/help`, `/quit`).
//! 4. Intercepts **Ctrl-C** to disarm the node, then stops it in order.

mod config;
mod repl;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use config::{Config, SinkKind};
#[cfg(target_os = "linux")]
use vesc_hal::SocketCanSink;
use vesc_hal::{FrameSink, LogSink};
use vesc_middleware::EventBus;
use vesc_runtime::{
    CommandDispatcher, GatingState, NodeConfig, TelemetryConfig, VescNode, init_tracing,
};
use vesc_types::VescError;

fn main() -> ExitCode {
    let telemetry = init_tracing(&TelemetryConfig::from_env("vesc"));

    print_banner();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);

    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(path = %path.display(), error = %e, "refusing to start");
            println!("{}: {}", "Config error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    println!("  Config     : {}", path.display().to_string().bold());
    print_config(&cfg);
    if telemetry.exporting() {
        println!("  Tracing    : {}", "OTLP export enabled".green());
    }

    let node = match build_node(&cfg) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            println!("{}: {}", "Startup error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start Tokio runtime".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    let handle = {
        let _guard = rt.enter();
        node.spawn()
    };

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let (exit_tx, exit_rx) = mpsc::channel::<ExitReason>();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // Disarm first so nothing else reaches the bus while the node winds down.
    let gate = node.gate();
    let ctrlc_shutdown = shutdown.clone();
    let ctrlc_tx = exit_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – disarming and shutting down …".yellow().bold());
        gate.disarm();
        println!("{}", "  ✓ Node disarmed.".green());
        ctrlc_shutdown.store(true, Ordering::SeqCst);
        let _ = ctrlc_tx.send(ExitReason::Interrupted);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not disarm the node");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    // Runs on its own thread: it blocks on stdin, and Ctrl-C must be able to
    // finish the shutdown without waiting for another line.
    let repl_node = Arc::clone(&node);
    if let Err(e) = std::thread::Builder::new()
        .name("vesc-repl".to_string())
        .spawn(move || {
            repl::run(&repl_node, shutdown);
            let _ = exit_tx.send(ExitReason::Quit);
        })
    {
        println!("{}: {}", "Failed to start REPL".red().bold(), e);
        rt.block_on(handle.shutdown());
        return ExitCode::FAILURE;
    }

    let reason = exit_rx.recv().unwrap_or(ExitReason::Quit);
    rt.block_on(handle.shutdown());
    info!(?reason, "vesc exiting");
    match reason {
        ExitReason::Quit => ExitCode::SUCCESS,
        ExitReason::Interrupted => ExitCode::from(130),
    }
}

/// Why the main thread stopped waiting.
#[derive(Debug, Clone, Copy)]
enum ExitReason {
    Quit,
    Interrupted,
}

fn build_sink(cfg: &Config) -> Result<Arc<dyn FrameSink>, VescError> {
    match cfg.sink {
        #[cfg(target_os = "linux")]
        SinkKind::SocketCan => Ok(Arc::new(SocketCanSink::open(
            &cfg.can_interface,
            cfg.can_write_timeout(),
        )?)),
        #[cfg(not(target_os = "linux"))]
        SinkKind::SocketCan => Err(VescError::Configuration(
            "sink = \"socketcan\" needs Linux; use sink = \"log\"".to_string(),
        )),
        SinkKind::Log => Ok(Arc::new(LogSink::new())),
    }
}

fn build_node(cfg: &Config) -> Result<VescNode, VescError> {
    let sink = build_sink(cfg)?;
    let gate = Arc::new(GatingState::new(cfg.initial_armed, cfg.override_timeout()));
    let dispatcher = CommandDispatcher::new(gate, cfg.scaling.clone(), sink)?;
    VescNode::new(
        dispatcher,
        EventBus::default(),
        NodeConfig {
            status_period: cfg.status_period(),
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _   _____ ___  ___ "#.bold().cyan());
    println!("{}", r#"| | / / __/ __/ / __|"#.bold().cyan());
    println!("{}", r#"| |/ / _/_\ \  | (__ "#.bold().cyan());
    println!("{}", r#"|___/___/___/   \___|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "vesc".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Velocity command link for VESC motor + steering servo");
    println!();
}

fn print_config(cfg: &Config) {
    let sink = match cfg.sink {
        SinkKind::SocketCan => format!(
            "{} ({}, {} ms write timeout)",
            cfg.sink, cfg.can_interface, cfg.can_write_timeout_ms
        ),
        SinkKind::Log => format!("{} (dry run)", cfg.sink),
    };
    println!("  Sink       : {}", sink.bold());
    println!(
        "  Start      : {}",
        if cfg.initial_armed { "armed".green() } else { "disarmed".yellow() }
    );
    match cfg.override_timeout() {
        Some(t) => println!("  Override   : expires after {} ms", t.as_millis()),
        None => println!("  Override   : {}", "never expires".yellow()),
    }
    println!("  Status     : every {} ms", cfg.status_period_ms);
}
