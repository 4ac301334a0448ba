//! gestured - touchpad gesture relay daemon
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           Run Loop (poll(2))             │
//! ├──────────────────────────────────────────┤
//! │  libinput  →  Gesture Decoder  →  D-Bus  │
//! │                                   ↑  ↓   │
//! │  Liveness Monitor  ←  StayAlive calls    │
//! └──────────────────────────────────────────┘
//! ```

mod bus;
mod config;
mod constants;
mod error;
mod gesture;
mod input;
mod liveness;
mod poll;
mod service;
mod signal;

use anyhow::{bail, Context, Result};
use log::info;

use crate::bus::DbusTransport;
use crate::constants::{ALLOW_NONROOT_ENV, EXIT_NORMAL, EXIT_POLL_FAILURE};
use crate::input::LibinputSource;
use crate::service::GestureServer;

/// Print help message
fn print_help() {
    println!(
        r#"gestured {} - touchpad gesture relay daemon

USAGE:
    gestured [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --check-config          Validate the config file and exit

ENVIRONMENT:
    GESTURED_CONFIG         Config file path (default: /etc/gestured/config.toml)
    GESTURED_ALLOW_NONROOT  Set to 1 to skip the root check
    RUST_LOG                Log filter (default: warn)
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Device access needs root unless explicitly waived
fn check_privileges() -> Result<()> {
    if nix::unistd::geteuid().is_root() {
        return Ok(());
    }
    if std::env::var(ALLOW_NONROOT_ENV).map_or(false, |v| v == "1") {
        info!("Not running as root ({}=1)", ALLOW_NONROOT_ENV);
        return Ok(());
    }
    bail!("gestured must run as root (set {}=1 to override)", ALLOW_NONROOT_ENV)
}

/// Validate the config file strictly (no fallback to defaults)
fn check_config() -> Result<()> {
    match config::Config::config_path() {
        Some(path) => {
            let cfg = config::Config::load_from_file(&path)?;
            cfg.check()
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
            println!("{}: OK", path.display());
        }
        None => {
            config::Config::default().check()?;
            println!("No config file, built-in defaults: OK");
        }
    }
    Ok(())
}

/// Construct collaborators and run the service; returns the exit code
fn run() -> Result<i32> {
    check_privileges()?;

    let cfg = config::Config::load();
    signal::setup_signal_handlers();

    let transport = DbusTransport::connect(&cfg.bus).context("Bus setup failed")?;
    let device = LibinputSource::open(&cfg.input.seat).context("Input setup failed")?;

    let server = GestureServer::new(device, transport, &cfg);

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
    let status = server.run();
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);

    Ok(status.code())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Check command line arguments
    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("gestured {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // --check-config
    if args.iter().any(|a| a == "--check-config") {
        let code = match check_config() {
            Ok(()) => EXIT_NORMAL,
            Err(e) => {
                eprintln!("{:#}", e);
                EXIT_POLL_FAILURE
            }
        };
        std::process::exit(code);
    }

    info!("gestured starting...");

    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("gestured: {:#}", e);
            EXIT_POLL_FAILURE
        }
    };
    std::process::exit(code);
}
