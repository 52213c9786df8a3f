//! Session status handler.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::session::observer::Snapshot;

use super::super::state::{AppState, LoggedNotification};

/// Body of `GET /api/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session: Snapshot,
    pub can_request_sample: bool,
    pub can_request_timed: bool,
    pub notifications: Vec<LoggedNotification>,
}

/// Handle GET /api/status - current snapshot and recent notifications.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.session.snapshot();
    Json(StatusResponse {
        can_request_sample: session.can_request_sample(),
        can_request_timed: session.can_request_timed(),
        session,
        notifications: state.notifications.recent(),
    })
}
