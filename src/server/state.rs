//! Server state and the notification log.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::session::SessionHandle;
use crate::session::observer::{Notification, Observer};

/// Notifications kept for `GET /api/status`.
pub const NOTIFICATION_HISTORY: usize = 32;

/// A notification with the local time it was raised.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedNotification {
    pub at: String,
    #[serde(flatten)]
    pub notification: Notification,
}

/// Bounded history of session notifications, newest last.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<VecDeque<LoggedNotification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self) -> Vec<LoggedNotification> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Observer for NotificationLog {
    fn notify(&self, notification: &Notification) {
        tracing::warn!(kind = ?notification.kind, "{}", notification);
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == NOTIFICATION_HISTORY {
                entries.pop_front();
            }
            entries.push_back(LoggedNotification {
                at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                notification: notification.clone(),
            });
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub session_config: SessionConfig,
    pub session: SessionHandle,
    pub notifications: std::sync::Arc<NotificationLog>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::observer::NotificationKind;

    #[test]
    fn test_log_is_bounded() {
        let log = NotificationLog::new();
        for _ in 0..NOTIFICATION_HISTORY + 5 {
            log.notify(&Notification::new(NotificationKind::ClaimFailed));
        }
        log.notify(&Notification::new(NotificationKind::DeviceLost));

        let recent = log.recent();
        assert_eq!(recent.len(), NOTIFICATION_HISTORY);
        assert_eq!(recent.last().unwrap().notification.kind, NotificationKind::DeviceLost);
    }
}
