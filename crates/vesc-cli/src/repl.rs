//! REPL – operator shell for a running VESC node.
//!
//! Supported slash-commands:
//!   /help                   – show this list
//!   /status                 – print armed / override flags
//!   /arm                    – toggle the armed flag
//!   /drive <linear> <ang>   – publish an autonomous velocity command
//!   /override <linear> <ang> – publish a manual-override velocity command
//!   /stats                  – dispatcher counters
//!   /quit | /exit           – stop the node and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use vesc_runtime::VescNode;
use vesc_types::VelocityCommand;

const REPL_SOURCE: &str = "vesc-cli::repl";

/// One parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplCommand {
    Help,
    Status,
    Arm,
    Drive { linear_x: f64, angular_z: f64 },
    Override { linear_x: f64, angular_z: f64 },
    Stats,
    Quit,
}

/// Parse a trimmed, non-empty input line.
///
/// The error string is shown to the operator as-is.
pub fn parse_line(line: &str) -> Result<ReplCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = parts.collect();

    let no_args = |cmd: ReplCommand| {
        if args.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("{head} takes no arguments"))
        }
    };

    match head {
        "/help" => no_args(ReplCommand::Help),
        "/status" => no_args(ReplCommand::Status),
        "/arm" => no_args(ReplCommand::Arm),
        "/stats" => no_args(ReplCommand::Stats),
        "/quit" | "/exit" => no_args(ReplCommand::Quit),
        "/drive" => {
            let (linear_x, angular_z) = parse_velocity(head, &args)?;
            Ok(ReplCommand::Drive { linear_x, angular_z })
        }
        "/override" => {
            let (linear_x, angular_z) = parse_velocity(head, &args)?;
            Ok(ReplCommand::Override { linear_x, angular_z })
        }
        other => Err(format!("Unknown command '{other}'")),
    }
}

fn parse_velocity(head: &str, args: &[&str]) -> Result<(f64, f64), String> {
    let [linear, angular] = args else {
        return Err(format!("usage: {head} <linear_x> <angular_z>"));
    };
    let parse = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{s}' is not a finite number"))
    };
    Ok((parse(linear)?, parse(angular)?))
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(node: &VescNode, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "vesc>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(ReplCommand::Help) => cmd_help(),
            Ok(ReplCommand::Status) => cmd_status(node),
            Ok(ReplCommand::Arm) => cmd_arm(node),
            Ok(ReplCommand::Drive { linear_x, angular_z }) => {
                cmd_publish(node, VelocityCommand::autonomous(linear_x, angular_z))
            }
            Ok(ReplCommand::Override { linear_x, angular_z }) => {
                cmd_publish(node, VelocityCommand::manual_override(linear_x, angular_z))
            }
            Ok(ReplCommand::Stats) => cmd_stats(node),
            Ok(ReplCommand::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => {
                println!(
                    "{} Type {} for available commands.",
                    msg.red(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "VESC Commands".bold().underline());
    println!("  {}                    – armed / override flags", "/status".bold().cyan());
    println!("  {}                       – toggle the armed flag", "/arm".bold().cyan());
    println!("  {}     – publish an autonomous command", "/drive <lin> <ang>".bold().cyan());
    println!("  {}  – publish a manual-override command", "/override <lin> <ang>".bold().cyan());
    println!("  {}                     – dispatcher counters", "/stats".bold().cyan());
    println!("  {}               – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn flag(on: bool, yes: &str, no: &str) -> colored::ColoredString {
    if on { yes.green().bold() } else { no.yellow().bold() }
}

fn cmd_status(node: &VescNode) {
    let snapshot = node.publish_status();
    println!(
        "  armed: {}   override: {}",
        flag(snapshot.armed, "ARMED", "DISARMED"),
        flag(snapshot.override_engaged, "ENGAGED", "released"),
    );
}

fn cmd_arm(node: &VescNode) {
    let response = node.toggle_arm();
    let now_armed = !response.previous_armed;
    println!(
        "  {} Now {}.",
        response.message.dimmed(),
        flag(now_armed, "ARMED", "DISARMED")
    );
}

fn cmd_publish(node: &VescNode, cmd: VelocityCommand) {
    match node.bus().publish_command(REPL_SOURCE, cmd) {
        Ok(_) => println!(
            "  {} {:?} linear_x={} angular_z={}",
            "→".green(),
            cmd.source,
            cmd.linear_x,
            cmd.angular_z
        ),
        Err(e) => println!("{}: {}", "Publish failed".red(), e),
    }
}

fn cmd_stats(node: &VescNode) {
    let dispatcher = node.dispatcher();
    let c = dispatcher.counters();
    println!("{}", "Dispatcher".bold().underline());
    println!("  sink                 : {}", dispatcher.sink_id().bold());
    println!("  frames transmitted   : {}", c.transmitted_frames);
    println!("  transmit failures    : {}", c.transmit_failures);
    println!("  suppressed (disarmed): {}", c.suppressed_disarmed);
    println!("  suppressed (override): {}", c.suppressed_override);
}
