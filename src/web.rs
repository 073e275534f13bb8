//! Inbound OneBot v11 events and the `/status` route.

use anyhow::{Context, Result};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::article::normalize_id;
use crate::commands::{Command, CommandHandler};
use crate::dispatch::Origin;
use crate::messaging::{DispatchTarget, MessagingHost};
use crate::monitor::CycleState;
use crate::TARGET_WEB_REQUEST;

/// The subset of a OneBot v11 event needed to route commands.
#[derive(Debug, Deserialize)]
pub struct OneBotEvent {
    pub post_type: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub group_id: Option<Value>,
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub raw_message: String,
}

impl OneBotEvent {
    /// The conversation a message event came from.
    pub fn origin_target(&self) -> Option<DispatchTarget> {
        if self.post_type != "message" {
            return None;
        }
        match self.message_type.as_deref()? {
            "group" => normalize_id(self.group_id.as_ref()?).map(DispatchTarget::Group),
            "private" => normalize_id(self.user_id.as_ref()?).map(DispatchTarget::User),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<(Command, DispatchTarget)> {
        let target = self.origin_target()?;
        let command = Command::parse(&self.raw_message)?;
        Some((command, target))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub handler: CommandHandler,
    /// Transport replies and manual-check results go out on.
    pub host: Arc<dyn MessagingHost>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    monitor_enabled: bool,
    scheduler_running: bool,
    checking: bool,
    interval_secs: u64,
    per_page: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/onebot/event", post(onebot_event))
        .route("/status", get(status))
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening for OneBot events on http://{}", addr);

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Event server stopped")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn onebot_event(State(state): State<AppState>, Json(event): Json<OneBotEvent>) -> StatusCode {
    let Some((command, target)) = event.command() else {
        debug!(target: TARGET_WEB_REQUEST, "Ignoring {} event", event.post_type);
        return StatusCode::NO_CONTENT;
    };

    let origin = Origin::new(target, state.host.clone());
    let handler = state.handler.clone();
    tokio::spawn(async move {
        handler.handle(command, &origin).await;
    });
    StatusCode::NO_CONTENT
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let monitor = state.handler.monitor();
    let settings = monitor.config().snapshot();
    Json(StatusResponse {
        status: "ok",
        monitor_enabled: settings.monitor.enabled,
        scheduler_running: state.handler.scheduler().is_running(),
        checking: monitor.state() == CycleState::Checking,
        interval_secs: settings.monitor.interval.as_secs(),
        per_page: settings.network.per_page,
    })
}
