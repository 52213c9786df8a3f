//! Print request handlers.
//!
//! Requests are checked against the current snapshot so a busy session
//! answers `409 Conflict` instead of silently dropping the request. The
//! session owner still applies its own guards when the intent arrives.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::super::state::AppState;

/// Body of the timed print and job length requests.
#[derive(Debug, Deserialize)]
pub struct LengthForm {
    /// Fraction of the maximum filler length, 0.0 to 1.0
    pub length: f32,
}

/// Handle POST /api/print/sample - discover, claim, print the sample invoice.
pub async fn sample(State(state): State<Arc<AppState>>) -> Response {
    if !state.session.snapshot().can_request_sample() {
        return error_response(StatusCode::CONFLICT, "Session is busy");
    }

    match state.session.request_sample_print() {
        Ok(()) => accepted_response("Sample invoice requested"),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    }
}

/// Handle POST /api/print/timed - discover, claim, run a timed filler job.
pub async fn timed(State(state): State<Arc<AppState>>, Json(form): Json<LengthForm>) -> Response {
    let snapshot = state.session.snapshot();
    if !snapshot.can_request_sample() {
        return error_response(StatusCode::CONFLICT, "Session is busy");
    }

    let steps = state.session_config.job_steps(form.length);
    if steps == 0 {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("Length {} gives a zero-step job", form.length),
        );
    }

    match state.session.request_timed_print(form.length) {
        Ok(()) => accepted_response(&format!("Timed print of {} second(s) requested", steps)),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    }
}

/// Handle PUT /api/job-length - change the filler length.
pub async fn job_length(State(state): State<Arc<AppState>>, Json(form): Json<LengthForm>) -> Response {
    if !state.session.snapshot().can_request_sample() {
        return error_response(StatusCode::CONFLICT, "Session is busy");
    }

    match state.session.set_job_length(form.length) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "length": form.length.clamp(0.0, 1.0),
                "computed_job_length": state.session_config.job_steps(form.length),
            })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    }
}

fn accepted_response(message: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "message": message })),
    )
        .into_response()
}

fn error_response(status: StatusCode, error_msg: &str) -> Response {
    (status, Json(json!({ "success": false, "error": error_msg }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::server::NotificationLog;
    use crate::session::SessionController;
    use crate::transport::mock::{DriverCall, MockDriver};
    use tokio::sync::mpsc;

    fn app() -> (Arc<AppState>, mpsc::UnboundedReceiver<DriverCall>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (driver, calls) = MockDriver::scripted(events_tx);
        let notifications = Arc::new(NotificationLog::new());
        let (session, _task) = SessionController::spawn(
            Arc::new(driver),
            events_rx,
            notifications.clone(),
            SessionConfig::default(),
        );
        let state = Arc::new(AppState {
            session_config: SessionConfig::default(),
            session,
            notifications,
        });
        (state, calls)
    }

    #[tokio::test]
    async fn test_sample_request_starts_discovery() {
        let (state, mut calls) = app();
        let response = sample(State(state)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(calls.recv().await, Some(DriverCall::Discover));
    }

    #[tokio::test]
    async fn test_zero_step_timed_request_is_rejected() {
        let (state, _calls) = app();
        let response = timed(State(state), Json(LengthForm { length: 0.05 })).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_second_request_while_discovering_conflicts() {
        let (state, mut calls) = app();
        let first = timed(State(state.clone()), Json(LengthForm { length: 0.5 })).await;
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        assert_eq!(calls.recv().await, Some(DriverCall::Discover));

        let second = sample(State(state)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_job_length_locked_while_discovering() {
        let (state, mut calls) = app();
        let first = sample(State(state.clone())).await;
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        assert_eq!(calls.recv().await, Some(DriverCall::Discover));

        let before = state.session.snapshot().computed_job_length;
        let response = job_length(State(state.clone()), Json(LengthForm { length: 1.0 })).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.session.snapshot().computed_job_length, before);
    }
}
