//! # Session Entity and Transition Table
//!
//! [`Session`] holds the authoritative connection state. Its methods apply
//! one intent or one link-state report and say what happened; they perform no
//! I/O. The owner task in [`super::SessionController`] turns the result into
//! driver calls, job launches and notifications.
//!
//! ## Link-State Interpretation
//!
//! The driver has a single "link changed" signal. What a `Disconnected` report
//! means depends entirely on the state it arrives in:
//!
//! | Current | Report | Meaning | Next |
//! |---------|--------|---------|------|
//! | Claiming | Connected | claim succeeded | Claimed |
//! | Claiming | Disconnected | claim rejected | Idle |
//! | Claimed | Disconnected | connection lost | Idle |
//! | Releasing | Disconnected | release completed | Releasing, Idle after settle |
//! | anything else | | uninterested | unchanged |

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{ClaimError, SessionError};
use crate::transport::{DeviceAddress, LinkState};

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Claiming,
    Claimed,
    Releasing,
}

impl SessionStatus {
    /// True while a claim or release is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, SessionStatus::Claiming | SessionStatus::Releasing)
    }
}

/// What a link-state report meant in the state it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Claim completed; the session is now `Claimed`
    Claimed,
    /// Claim rejected; the session is back in `Idle`
    ClaimFailed(ClaimError),
    /// Link dropped while claimed; the session is back in `Idle`
    ConnectionLost(SessionError),
    /// Release disconnect arrived; the settle delay should start
    ReleaseCompleted,
    /// Nothing to do in the current state
    Uninterested,
}

/// The single printer session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    status: SessionStatus,
    target_address: Option<DeviceAddress>,
    claim_started_at: Option<Instant>,
    claim_finished_at: Option<Instant>,
    settling: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn target_address(&self) -> Option<&DeviceAddress> {
        self.target_address.as_ref()
    }

    pub fn claim_started_at(&self) -> Option<Instant> {
        self.claim_started_at
    }

    pub fn claim_finished_at(&self) -> Option<Instant> {
        self.claim_finished_at
    }

    /// Time between starting the claim and the driver's answer.
    pub fn claim_latency(&self) -> Option<Duration> {
        match (self.claim_started_at, self.claim_finished_at) {
            (Some(start), Some(finish)) => Some(finish.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// True once the release disconnect arrived and the settle delay runs.
    pub fn is_settling(&self) -> bool {
        self.settling
    }

    /// Begin claiming `device`. Returns `false` (and changes nothing) unless idle.
    pub fn start_claim(&mut self, device: DeviceAddress, now: Instant) -> bool {
        if self.status != SessionStatus::Idle {
            return false;
        }
        self.claim_started_at = Some(now);
        self.target_address = Some(device);
        self.status = SessionStatus::Claiming;
        true
    }

    /// Begin releasing the device. Returns `false` (and changes nothing) unless claimed.
    pub fn start_release(&mut self) -> bool {
        if self.status != SessionStatus::Claimed {
            return false;
        }
        self.status = SessionStatus::Releasing;
        true
    }

    /// Interpret a link-state report against the current state.
    pub fn on_link_state(&mut self, link: LinkState, now: Instant) -> LinkOutcome {
        match (self.status, link) {
            (SessionStatus::Claiming, LinkState::Connected) => {
                self.claim_finished_at = Some(now);
                self.status = SessionStatus::Claimed;
                LinkOutcome::Claimed
            }
            (SessionStatus::Claiming, LinkState::Disconnected) => {
                self.claim_finished_at = Some(now);
                self.status = SessionStatus::Idle;
                LinkOutcome::ClaimFailed(ClaimError::Rejected {
                    address: self.address_or_unknown(),
                })
            }
            (SessionStatus::Claimed, LinkState::Disconnected) => {
                self.status = SessionStatus::Idle;
                LinkOutcome::ConnectionLost(SessionError::LostConnection {
                    address: self.address_or_unknown(),
                })
            }
            (SessionStatus::Releasing, LinkState::Disconnected) if !self.settling => {
                self.settling = true;
                LinkOutcome::ReleaseCompleted
            }
            _ => LinkOutcome::Uninterested,
        }
    }

    /// Settle delay elapsed: clear the transitional flags.
    ///
    /// Returns `false` if no release was settling.
    pub fn finish_release(&mut self) -> bool {
        if self.status != SessionStatus::Releasing || !self.settling {
            return false;
        }
        self.settling = false;
        self.status = SessionStatus::Idle;
        true
    }

    fn address_or_unknown(&self) -> DeviceAddress {
        self.target_address
            .clone()
            .unwrap_or_else(|| DeviceAddress::new("unknown"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
