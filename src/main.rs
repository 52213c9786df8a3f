//! # Cajero CLI
//!
//! Command-line interface for Bluetooth receipt printer sessions.
//!
//! ## Usage
//!
//! ```bash
//! # Print the sample invoice on the first paired printer
//! cajero sample
//!
//! # Run a filler job at half the maximum length
//! cajero timed --length 0.5
//!
//! # Serve the HTTP control surface
//! cajero serve --listen 0.0.0.0:8080
//!
//! # List paired devices
//! cajero devices
//!
//! # Encode a JSON fragment script to hex
//! cajero encode script.json
//!
//! # Exercise a full cycle against a simulated printer
//! cajero --dry-run sample
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cajero::{
    CajeroError, SessionConfig, SessionController, SessionHandle,
    config::ServerConfig,
    protocol::{Fragment, encode},
    server::{self, NotificationLog},
    session::{
        Intent,
        observer::{Notification, NotificationKind},
        state::SessionStatus,
    },
    transport::{DeviceAddress, Driver, DriverEvent, MockDriver, RfcommDriver, bluetooth},
};

/// Address reported by the simulated printer in `--dry-run` mode.
const DRY_RUN_ADDRESS: &str = "00:11:22:33:44:55";

/// Cajero - Bluetooth receipt printer session utility
#[derive(Parser, Debug)]
#[command(name = "cajero")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use a simulated printer that accepts everything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override the RFCOMM channel from the configuration
    #[arg(long, global = true)]
    rfcomm_channel: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover, claim, print the sample invoice and release
    Sample,

    /// Discover, claim, run a timed filler job and release
    Timed {
        /// Fraction of the maximum job length (0.0 to 1.0)
        #[arg(long)]
        length: Option<f32>,
    },

    /// Start the HTTP control server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },

    /// List paired Bluetooth devices
    Devices,

    /// Encode a JSON array of fragments and print the bytes as hex
    Encode {
        /// JSON file holding the fragment array
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<(), CajeroError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(channel) = cli.rfcomm_channel {
        config.rfcomm_channel = channel;
    }

    match cli.command {
        Commands::Sample => {
            let (driver, events_rx) = build_driver(cli.dry_run, &config);
            let (notify_tx, notify_rx) = mpsc::unbounded_channel::<Notification>();
            let (session, _task) =
                SessionController::spawn(driver, events_rx, Arc::new(notify_tx), config);
            run_cycle(&session, notify_rx, Intent::RequestSamplePrint).await?;
            println!("Printed successfully!");
        }

        Commands::Timed { length } => {
            let length = length.unwrap_or_else(|| config.default_job_length());
            let steps = config.job_steps(length);
            if steps == 0 {
                return Err(CajeroError::Config(format!(
                    "length {} gives a zero-step job",
                    length
                )));
            }

            println!("Running filler job of {} step(s)...", steps);
            let (driver, events_rx) = build_driver(cli.dry_run, &config);
            let (notify_tx, notify_rx) = mpsc::unbounded_channel::<Notification>();
            let (session, _task) =
                SessionController::spawn(driver, events_rx, Arc::new(notify_tx), config);
            run_cycle(&session, notify_rx, Intent::RequestTimedPrint { length }).await?;
            println!("Printed successfully!");
        }

        Commands::Serve { listen } => {
            let (driver, events_rx) = build_driver(cli.dry_run, &config);
            let notifications = Arc::new(NotificationLog::new());
            let (session, _task) = SessionController::spawn(
                driver,
                events_rx,
                notifications.clone(),
                config.clone(),
            );
            server::serve(ServerConfig { listen_addr: listen }, config, session, notifications)
                .await?;
        }

        Commands::Devices => {
            let devices = if cli.dry_run {
                [DeviceAddress::new(DRY_RUN_ADDRESS)].into_iter().collect()
            } else {
                tokio::task::spawn_blocking(bluetooth::list_paired_devices)
                    .await
                    .map_err(|e| CajeroError::Transport(format!("Device listing failed: {}", e)))??
            };

            if devices.is_empty() {
                println!("No paired devices.");
            }
            for device in devices {
                println!("{}", device);
            }
        }

        Commands::Encode { file } => {
            let text = std::fs::read_to_string(&file)?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| CajeroError::Config(format!("{}: {}", file.display(), e)))?;
            let serde_json::Value::Array(items) = value else {
                return Err(CajeroError::Config(format!(
                    "{}: expected a JSON array of fragments",
                    file.display()
                )));
            };

            let fragments: Vec<Fragment> = items.iter().map(Fragment::from_json).collect();
            let buffer = encode(&fragments)?;
            println!("{} byte(s)", buffer.len());
            println!("{}", to_hex(buffer.as_bytes()));
        }
    }

    Ok(())
}

/// Build the real or the simulated driver with its event stream.
fn build_driver(
    dry_run: bool,
    config: &SessionConfig,
) -> (Arc<dyn Driver>, mpsc::UnboundedReceiver<DriverEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let driver: Arc<dyn Driver> = if dry_run {
        tracing::info!("dry run: simulating printer {}", DRY_RUN_ADDRESS);
        Arc::new(MockDriver::auto_reply(
            events_tx,
            [DeviceAddress::new(DRY_RUN_ADDRESS)],
        ))
    } else {
        Arc::new(RfcommDriver::new(events_tx, config.rfcomm_channel))
    };
    (driver, events_rx)
}

/// Send one print intent and wait until the session settles back to idle.
///
/// A successful cycle always passes through `Releasing`. Reaching `Idle`
/// any other way means a notification explains what went wrong. A failed job
/// leaves the device claimed, so the cycle releases it before reporting.
async fn run_cycle(
    session: &SessionHandle,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    intent: Intent,
) -> Result<(), CajeroError> {
    let mut snapshots = session.subscribe();
    session.send(intent)?;

    let mut started = false;
    let mut released = false;
    let mut failure: Option<Notification> = None;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                changed.map_err(|_| CajeroError::SessionClosed)?;
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.is_releasing {
                    released = true;
                }
                if snapshot.is_busy() || snapshot.discovery_pending {
                    started = true;
                    continue;
                }
                if !started || snapshot.status != SessionStatus::Idle {
                    continue;
                }
                if released {
                    break;
                }
                let notification = match failure.take() {
                    Some(notification) => notification,
                    None => notifications.recv().await.ok_or(CajeroError::SessionClosed)?,
                };
                return Err(CajeroError::Cycle(notification.to_string()));
            }
            Some(notification) = notifications.recv() => {
                tracing::debug!(kind = ?notification.kind, "cycle notified");
                match notification.kind {
                    NotificationKind::NoDeviceFound => {
                        return Err(CajeroError::Cycle(notification.to_string()));
                    }
                    NotificationKind::PrintFailed => session.start_release()?,
                    NotificationKind::ClaimFailed | NotificationKind::DeviceLost => {}
                }
                failure = Some(notification);
            }
        }
    }

    match failure {
        Some(notification) => Err(CajeroError::Cycle(notification.to_string())),
        None => Ok(()),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
