//! # Error Types
//!
//! This module defines the error types used throughout the cajero library.
//!
//! Every domain error is terminal for the operation that raised it: nothing
//! here triggers a retry. The user re-issues the top-level print request.
//! Unrecognized driver events are never errors; they are logged and dropped.

use thiserror::Error;

use crate::transport::DeviceAddress;

/// Main error type for the CLI, server and configuration plumbing
#[derive(Debug, Error)]
pub enum CajeroError {
    /// Transport-level errors (device files, helper tools, sockets)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// The session owner task has stopped
    #[error("Session closed")]
    SessionClosed,

    /// A print cycle ended with a user-facing notification
    #[error("Print cycle failed: {0}")]
    Cycle(String),

    /// Command encoding failed
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fragment list could not be turned into a command buffer.
///
/// Only the buffer being built is lost; no partial bytes ever leave the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unsupported fragment #{index} ({type_name})")]
    UnsupportedFragment { index: usize, type_name: String },
}

/// Discovery ended without a device to claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("no paired device found")]
    NoDeviceFound,

    #[error("device discovery timed out")]
    Timeout,
}

/// The driver reported a disconnect while a claim was in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("failed claiming device {address}")]
    Rejected { address: DeviceAddress },
}

/// The link dropped while the device was held.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("lost connection to {address}")]
    LostConnection { address: DeviceAddress },
}

/// A print job did not run to completion on a claimed device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintError {
    #[error("print job incomplete after {completed} of {requested} step(s)")]
    Incomplete { completed: u32, requested: u32 },

    #[error("print job could not be encoded: {0}")]
    Encode(#[from] EncodeError),
}
