//! vpnctl: headless VPN controller
//!
//! Runs the controller against the configured backends, renders display
//! changes to the log and takes commands on stdin. Ctrl-C shuts down
//! cleanly (pollers stopped, monitoring timers cancelled).

mod commands;

use anyhow::{Context, Result};
use commands::{Command, HELP};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vpnctl_core::{ControllerConfig, DisplayModel, LiveController, ViewSink};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const CONFIG_ENV: &str = "VPNCTL_CONFIG";
const DEFAULT_FILTER: &str = "vpnctl=info,vpnctl_core=info,vpnctl_net=info";
const RENDER_INTERVAL: Duration = Duration::from_secs(1);

/// Logs the parts of the display that changed since the last frame
#[derive(Default)]
struct LogView {
    last: Mutex<Option<DisplayModel>>,
}

impl ViewSink for LogView {
    fn render(&self, model: &DisplayModel) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last.replace(model.clone());

        let changed = previous.as_ref().is_none_or(|p| {
            p.status_text != model.status_text
                || p.selected_country != model.selected_country
                || p.mtu != model.mtu
                || p.port != model.port
                || p.network != model.network
        });
        if changed {
            info!(
                "{} | exit: {} | MTU {} | port {} | network {}",
                model.status_text,
                model.selected_country.as_deref().unwrap_or("-"),
                model.mtu,
                model.port,
                model.network
            );
        }
        if previous.as_ref().is_some_and(|p| p.countries != model.countries) {
            info!("Exit countries: {}", model.countries.join(", "));
        }

        let seen = previous.as_ref().map_or(0, |p| p.status_log.len());
        for line in model.status_log.iter().skip(seen) {
            info!("{}", line);
        }

        if model.connected {
            debug!(
                "traffic {} | elapsed {} | {} | {}",
                model.traffic, model.elapsed, model.transferred, model.speed
            );
        }
    }
}

fn print_status(model: &DisplayModel) {
    info!(
        "{} | exit: {} | traffic {} | elapsed {} | transferred {} | speed {}",
        model.status_text,
        model.selected_country.as_deref().unwrap_or("-"),
        model.traffic,
        model.elapsed,
        model.transferred,
        model.speed
    );
}

fn load_config() -> Result<ControllerConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok());

    match path {
        Some(path) => {
            info!("Loading config from {}", path);
            ControllerConfig::from_file(&path).with_context(|| format!("Failed to load {path}"))
        }
        None => {
            info!("No config file given, using defaults");
            Ok(ControllerConfig::default())
        }
    }
}

/// Run one command; `false` means quit
async fn execute(controller: &LiveController, command: Command) -> bool {
    let result = match command {
        Command::Connect(country) => controller.connect(country.as_deref()).await,
        Command::Disconnect => controller.disconnect().await,
        Command::Select(country) => controller.select_country(&country).await,
        Command::Status => {
            print_status(&controller.display());
            Ok(())
        }
        Command::Servers => {
            let model = controller.display();
            if model.countries.is_empty() {
                info!("No exit countries known yet");
            } else {
                info!("Exit countries: {}", model.countries.join(", "));
            }
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return false,
    };

    // Failures are already reported through the notifier
    if let Err(e) = result {
        debug!("Command failed: {}", e);
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .init();

    info!("vpnctl starting...");

    let config = load_config()?;
    let controller = LiveController::from_config(&config).context("Invalid configuration")?;
    controller.start();

    let view = LogView::default();
    let mut render = tokio::time::interval(RENDER_INTERVAL);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted");
                break;
            }
            _ = render.tick() => controller.render(&view),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => {
                        if !execute(&controller, command).await {
                            break;
                        }
                        controller.render(&view);
                    }
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => {
                    debug!("stdin closed; running until Ctrl-C");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    controller.shutdown();
    info!("vpnctl shutting down");
    Ok(())
}
