//! # Cajero - Bluetooth Receipt Printer Sessions
//!
//! Cajero drives a paired Bluetooth receipt printer through a short print
//! cycle: find a paired device, claim it, print, release it. It provides:
//!
//! - **Session state machine**: Idle, Claiming, Claimed, Releasing, owned by a
//!   single task
//! - **Command encoding**: fragments to printer bytes, all or nothing
//! - **Print jobs**: a sample invoice or a timed sequence of filler pulses
//! - **Transport**: Bluetooth RFCOMM driver and an in-memory mock
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cajero::{SessionConfig, SessionController, transport::RfcommDriver};
//! use cajero::session::observer::LogObserver;
//!
//! # async fn example() -> Result<(), cajero::CajeroError> {
//! let config = SessionConfig::default();
//! let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let driver = Arc::new(RfcommDriver::new(events_tx, config.rfcomm_channel));
//!
//! let (session, _task) =
//!     SessionController::spawn(driver, events_rx, Arc::new(LogObserver), config);
//! session.request_sample_print()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | State machine, discovery, observer |
//! | [`job`] | Print job dispatcher and the sample invoice |
//! | [`protocol`] | Command fragments and printer byte sequences |
//! | [`transport`] | Driver trait, RFCOMM driver, mock driver |
//! | [`server`] | HTTP control surface |
//! | [`config`] | TOML configuration |
//! | [`error`] | Error types |

pub mod config;
pub mod error;
pub mod job;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::SessionConfig;
pub use error::CajeroError;
pub use session::{SessionController, SessionHandle};
pub use transport::RfcommDriver;
