//! `cortex-cli` – Cortex Command Line Interface
//!
//! This binary is the composition root for the Cortex coordination core.  It:
//!
//! 1. Loads `~/.cortex/config.toml`, writing the defaults on first run.
//! 2. Opens the error log and the SQLite memory database, and registers the
//!    `declarative`, `emotional`, `procedural`, `contextual`, and
//!    `reasoning` regions next to the built-in scheduler and stores.
//! 3. Drops the user into an **interactive REPL** that drives every region
//!    through the dispatcher.
//! 4. Intercepts **Ctrl-C**: cancels the dispatch in flight, or exits when
//!    the prompt is idle.

mod config;
mod repl;

use chrono::TimeDelta;
use colored::Colorize;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use cortex_kernel::{ErrorSink, FanoutSink, FileSink, TracingSink};
use cortex_memory::{ContextGraph, KvStore};
use cortex_runtime::regions::{CONTEXTUAL, DECLARATIVE, EMOTIONAL, PROCEDURAL, REASONING};
use cortex_runtime::{ContextualRegion, Coordinator, KvRegion, LlmClient, LlmRegion};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); CORTEX_LOG_FORMAT=json switches to
    // JSON lines.  User-facing output still uses println!.
    let _telemetry = cortex_runtime::init_tracing("cortex");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    let coordinator = match build_coordinator(&cfg) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Startup failed".red(), e);
            std::process::exit(1);
        }
    };
    info!(regions = ?coordinator.region_names(), "coordinator ready");

    // ── LLM discovery ─────────────────────────────────────────────────────
    print!("\n  Probing model server at {} … ", cfg.llm_url.dimmed());
    std::io::stdout().flush().ok();
    let probe = LlmClient::new(cfg.llm_url.clone(), cfg.llm_model.clone()).with_api_key(cfg.api_key());
    match rt.block_on(probe.models()) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for m in &models {
                println!("    • {}", m.bold());
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  The {} region will report faults until it is reachable.",
                "No model server detected.".dimmed(),
                REASONING.bold()
            );
        }
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let in_flight: repl::InFlight = Arc::new(Mutex::new(None));
    {
        let shutdown = shutdown.clone();
        let in_flight = in_flight.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            let pending = in_flight.lock().unwrap_or_else(|p| p.into_inner()).take();
            match pending {
                Some(handle) => {
                    println!();
                    println!("{}", "⚠  Ctrl-C received – cancelling dispatch …".yellow().bold());
                    handle.cancel();
                }
                None => {
                    println!();
                    println!("{}", "  ✓ Exiting Cortex.".green());
                    shutdown.store(true, Ordering::SeqCst);
                    std::process::exit(0);
                }
            }
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; in-flight dispatches cannot be cancelled");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(shutdown, &rt, &coordinator, in_flight);
}

/// Sinks, persistent regions, and the reasoning region around the core.
fn build_coordinator(cfg: &config::Config) -> Result<Coordinator, String> {
    let home = config::home_dir();

    let log_path = cfg.log_file_in(&home);
    let file_sink = FileSink::open(log_path.clone())
        .map_err(|e| format!("cannot open error log {}: {}", log_path.display(), e))?;
    match file_sink.archive_stale(TimeDelta::days(i64::from(cfg.log_retention_days))) {
        Ok(Some(archived)) => info!(path = %archived.display(), "archived stale error log"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "could not archive stale error log"),
    }
    let sinks: Vec<Arc<dyn ErrorSink>> = vec![Arc::new(file_sink), Arc::new(TracingSink)];

    let data_dir = cfg.data_dir_in(&home);
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| format!("cannot create data directory {}: {}", data_dir.display(), e))?;
    let db_path = data_dir.join("memory.db");
    let open = |table: &str| {
        KvStore::open(&db_path, table)
            .map_err(|e| format!("cannot open {} memory at {}: {}", table, db_path.display(), e))
    };

    let llm = LlmClient::new(cfg.llm_url.clone(), cfg.llm_model.clone()).with_api_key(cfg.api_key());

    Coordinator::builder(cfg.coordinator())
        .sink(Arc::new(FanoutSink::new(sinks)))
        .region(DECLARATIVE, KvRegion::new(DECLARATIVE, open(DECLARATIVE)?))
        .region(EMOTIONAL, KvRegion::new(EMOTIONAL, open(EMOTIONAL)?))
        .region(PROCEDURAL, KvRegion::new(PROCEDURAL, open(PROCEDURAL)?))
        .region(CONTEXTUAL, ContextualRegion::new(CONTEXTUAL, ContextGraph::new()))
        .region(REASONING, LlmRegion::new(llm))
        .build()
        .map_err(|e| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run() -> config::Config {
    println!();
    println!("  No configuration found.  Writing defaults.");

    let mut cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ______           __           "#.bold().cyan());
    println!("{}", r#"  / ____/___  _____/ /____  _  __"#.bold().cyan());
    println!("{}", r#" / /   / __ \/ ___/ __/ _ \| |/_/"#.bold().cyan());
    println!("{}", r#"/ /___/ /_/ / /  / /_/  __/>  <  "#.bold().cyan());
    println!("{}", r#"\____/\____/_/   \__/\___/_/|_|  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Cortex".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Cognitive Agent Coordination Core");
    println!();
}
