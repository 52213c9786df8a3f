//! # HTTP Server for Session Control
//!
//! Exposes the two user operations and the session snapshot over HTTP so a
//! front end can render button enablement and show failure dialogs.
//!
//! ## Usage
//!
//! ```bash
//! cajero serve --listen 0.0.0.0:8080
//! ```
//!
//! ## Routes
//!
//! | Method | Path | Effect |
//! |--------|------|--------|
//! | GET | `/api/status` | snapshot + recent notifications |
//! | POST | `/api/print/sample` | sample invoice cycle |
//! | POST | `/api/print/timed` | timed filler cycle (`{"length": 0.5}`) |
//! | PUT | `/api/job-length` | change filler length (`{"length": 0.5}`) |

mod handlers;
mod state;

pub use state::{AppState, LoggedNotification, NotificationLog};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::{ServerConfig, SessionConfig};
use crate::error::CajeroError;
use crate::session::SessionHandle;

/// Build the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::status::status))
        .route("/api/print/sample", post(handlers::print::sample))
        .route("/api/print/timed", post(handlers::print::timed))
        .route("/api/job-length", put(handlers::print::job_length))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// `notifications` must be the observer the session was spawned with, so
/// that `/api/status` can report what the session raised.
pub async fn serve(
    config: ServerConfig,
    session_config: SessionConfig,
    session: SessionHandle,
    notifications: Arc<NotificationLog>,
) -> Result<(), CajeroError> {
    let listen_addr = config.listen_addr.clone();
    let app = router(Arc::new(AppState {
        session_config,
        session,
        notifications,
    }));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| CajeroError::Transport(format!("Failed to bind to {}: {}", listen_addr, e)))?;
    tracing::info!("listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| CajeroError::Transport(format!("Server error: {}", e)))?;

    Ok(())
}
