//! User-facing notifications and the readable session snapshot.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use super::state::SessionStatus;

/// Kind of user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ClaimFailed,
    PrintFailed,
    DeviceLost,
    NoDeviceFound,
}

/// A short title/message pair surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(kind: NotificationKind) -> Self {
        let (title, message) = match kind {
            NotificationKind::ClaimFailed => ("Device State", "Failed claiming device."),
            NotificationKind::PrintFailed => ("Invoice State", "Failed printing invoice."),
            NotificationKind::DeviceLost => ("Device State", "Lost connection"),
            NotificationKind::NoDeviceFound => ("Device State", "No paired device found."),
        };
        Self {
            kind,
            title: title.to_string(),
            message: message.to_string(),
        }
    }

    /// Same kind with a more specific message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Receives notifications from the session owner task.
///
/// Called on the owner task; implementations must return quickly.
pub trait Observer: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, notification: &Notification) {
        tracing::warn!(kind = ?notification.kind, "{}", notification);
    }
}

impl Observer for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: &Notification) {
        let _ = self.send(notification.clone());
    }
}

/// Continuously readable view of the session for rendering enablement state.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub is_claiming: bool,
    /// Stays set while releasing; the device is held until release settles
    pub is_claimed: bool,
    pub is_releasing: bool,
    /// Steps a timed filler job would run at the current length setting
    pub computed_job_length: u32,
    pub job_length: f32,
    pub target_address: Option<String>,
    pub discovery_pending: bool,
}

impl Snapshot {
    /// True while a claim or release is in flight, or the device is held.
    pub fn is_busy(&self) -> bool {
        self.is_claiming || self.is_claimed || self.is_releasing
    }

    /// Whether a sample print request would be accepted right now.
    pub fn can_request_sample(&self) -> bool {
        !self.is_busy() && !self.discovery_pending
    }

    /// Whether a timed print request at the current length would be accepted.
    pub fn can_request_timed(&self) -> bool {
        self.can_request_sample() && self.computed_job_length > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_texts() {
        let n = Notification::new(NotificationKind::NoDeviceFound);
        assert_eq!(n.to_string(), "Device State: No paired device found.");
        assert_eq!(
            Notification::new(NotificationKind::PrintFailed).title,
            "Invoice State"
        );
    }

    #[test]
    fn test_channel_observer_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        tx.notify(&Notification::new(NotificationKind::DeviceLost));
        assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::DeviceLost);
    }

    #[test]
    fn test_snapshot_enablement() {
        let mut snap = Snapshot {
            computed_job_length: 3,
            ..Snapshot::default()
        };
        assert!(snap.can_request_timed());

        snap.computed_job_length = 0;
        assert!(snap.can_request_sample());
        assert!(!snap.can_request_timed());

        snap.is_releasing = true;
        assert!(!snap.can_request_sample());
    }
}
