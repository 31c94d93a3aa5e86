mod app;
mod cli;
mod console;
mod error_fmt;

use clap::Parser;
use crossbeam_channel as xch;
use eyre::{Result, WrapErr};
use scale_config::{Config, Environment};
use scale_core::{ScaleError, Store};
use scale_traits::MonotonicClock;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::console::{ConsoleCmd, Reply};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        tracing::debug!(error = ?err, "exiting with error");
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = scale_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .map_err(|e| ScaleError::Config(e.to_string()))?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, cfg: &Config) {
    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".into());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    // Console logs go to stderr; stdout carries console replies and status lines.
    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = cfg.logging.file.as_deref().map(|path| {
        let path = Path::new(path);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name().map_or_else(|| "openscale.log".into(), |n| n.to_os_string());
        let appender = match cfg.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
}

fn real_main(cli: Cli) -> Result<()> {
    let mut cfg = load_config(&cli.config)?;
    if let Commands::Run { dev: true, .. } = cli.cmd {
        cfg.runtime.environment = Environment::Development;
    }
    init_tracing(&cli, &cfg);

    match cli.cmd {
        Commands::Run { no_console, .. } => run(&cfg, cli.json, no_console),
        Commands::SelfCheck { timeout_ms } => self_check(&cfg, Duration::from_millis(timeout_ms)),
        Commands::Analytics { fold } => analytics(&cfg, fold),
    }
}

fn print_reply(reply: &Reply, json: bool) {
    match reply {
        Reply::Ack(ok) if json => println!("{}", serde_json::json!({ "ok": ok })),
        Reply::Ack(true) => println!("ok"),
        Reply::Ack(false) => println!("rejected"),
        Reply::Json(v) => println!("{v}"),
        Reply::Text(t) => println!("{t}"),
        Reply::Quit => {}
    }
}

fn run(cfg: &Config, json: bool, no_console: bool) -> Result<()> {
    let app = app::App::build(cfg)?;

    let (stop_tx, stop_rx) = xch::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .wrap_err("install Ctrl-C handler")?;

    let updates = if json {
        app.manager.register_listener("console")
    } else {
        xch::never()
    };

    let lines = if no_console {
        xch::never()
    } else {
        let (tx, rx) = xch::unbounded::<String>();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        rx
    };

    loop {
        xch::select! {
            recv(stop_rx) -> _ => {
                tracing::info!("interrupt received; shutting down");
                break;
            }
            recv(updates) -> msg => {
                if let Ok(status) = msg {
                    println!("{}", serde_json::to_string(&status)?);
                }
            }
            recv(lines) -> msg => {
                let Ok(line) = msg else {
                    tracing::info!("console closed; shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCmd>() {
                    Ok(cmd) => {
                        let reply = console::execute(&app.manager, cmd)?;
                        print_reply(&reply, json);
                        if matches!(reply, Reply::Quit) {
                            break;
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
        }
    }

    if json {
        app.manager.deregister_listener("console");
    }
    drop(app);
    Ok(())
}

fn self_check(cfg: &Config, timeout: Duration) -> Result<()> {
    let driver = app::connect_driver(cfg, Arc::new(MonotonicClock::new()))?;
    scale_hardware::util::wait_until_with_timeout(
        || driver.is_connected(),
        timeout,
        Duration::from_millis(20),
    )
    .map_err(|_| ScaleError::NotConnected)
    .wrap_err("self-check: connect")?;
    let state = driver.read_state().wrap_err("self-check: read state")?;
    println!("{}", serde_json::to_string(&state)?);
    Ok(())
}

fn analytics(cfg: &Config, fold: bool) -> Result<()> {
    let (db, cold) = app::open_stores(cfg)?;
    if fold {
        let n = scale_core::analytics::run_pass(db.as_ref(), cold.as_ref())?;
        tracing::info!(events = n, "analytics pass done");
    }
    let tree = db.read()?.analytics;
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}
