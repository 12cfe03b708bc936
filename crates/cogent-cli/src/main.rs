//! `cogent` – runs a relay ring of agents on the cogent runtime.
//!
//! 1. Loads `~/.cogent/config.toml`, writing the defaults on first run, and
//!    applies `COGENT_*` overrides.
//! 2. Launches the ring, starts it and waits for every agent to terminate.
//! 3. **Ctrl-C** stops all agents; their shutdown modules still run.
//! 4. Prints one line per agent: final state, rounds and any fatal error.

mod config;
mod demo;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::Notify;
use tracing::{info, warn};

use cogent_kernel::ControllerState;
use cogent_runtime::{MultiAgentSystem, NoEnvironment, TelemetryConfig, init_tracing};

fn main() -> ExitCode {
    let _telemetry = init_tracing(&TelemetryConfig::from_env("cogent"));

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("{}: {}", "Could not start the tokio runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cfg))
}

async fn run(cfg: config::Config) -> ExitCode {
    let ring = match demo::relay_ring(cfg.agents, cfg.laps) {
        Ok(ring) => ring,
        Err(e) => {
            println!("{}: {}", "Invalid ring".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let mas = MultiAgentSystem::new(cfg.to_runtime(), Arc::new(NoEnvironment));
    for (name, program) in ring {
        if let Err(e) = mas.launch(program, name) {
            println!("{}: {}", "Launch failed".red(), e);
            return ExitCode::FAILURE;
        }
    }
    println!(
        "  Relaying {} lap(s) through {} agents ({:?} scheduling)\n",
        cfg.laps,
        cfg.agents,
        cfg.scheduling
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let interrupted = Arc::new(Notify::new());
    let notify = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping all agents …".yellow().bold());
        notify.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the ring with a round limit instead");
    }

    if let Err(e) = mas.start().await {
        println!("{}: {}", "Start failed".red(), e);
        return ExitCode::FAILURE;
    }

    tokio::select! {
        () = mas.await_termination() => {}
        () = interrupted.notified() => {
            mas.stop();
            mas.await_termination().await;
        }
    }

    let healthy = report(&mas);
    if let Err(e) = mas.dispose().await {
        warn!(error = %e, "dispose failed");
    }
    info!("relay ring finished");

    if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Print the outcome of every agent.  Returns `false` when any was killed.
fn report(mas: &MultiAgentSystem) -> bool {
    let mut healthy = true;
    for id in mas.agent_ids() {
        let rounds = mas.round(&id).unwrap_or_default();
        let state = match mas.state(&id) {
            Ok(ControllerState::Terminated) => "terminated".green(),
            Ok(other) => format!("{other:?}").to_lowercase().yellow(),
            Err(_) => "unknown".red(),
        };
        match mas.failure(&id) {
            Ok(Some(error)) => {
                healthy = false;
                println!("  {} {:<10} {} after {} round(s): {}", "✗".red().bold(), id.as_str(), state, rounds, error);
            }
            _ => println!("  {} {:<10} {} after {} round(s)", "✓".green().bold(), id.as_str(), state, rounds),
        }
    }
    println!();
    healthy
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "cogent".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Cognitive agents on tokio");
    println!();
}
