//! External re-trigger hook

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::server::AppState;
use crate::error::Result;
use crate::models::ServerDescriptor;
use crate::proxy::{CycleOutcome, Trigger};

#[derive(Debug, Default, Deserialize)]
pub struct TriggerParams {
    /// Run the cycle inline and report its outcome
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Started,
    AlreadyRunning,
    Activated,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: TriggerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Arc<ServerDescriptor>>,
}

impl TriggerResponse {
    fn acknowledged(status: TriggerStatus) -> Self {
        Self {
            status,
            server: None,
        }
    }
}

/// Start a selection cycle.
///
/// By default the cycle runs in the background and the call returns at once.
/// With `?wait=true` the call returns the activated server, or the cycle's
/// error rendered with its status code.
pub async fn trigger(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<TriggerResponse>> {
    if params.wait {
        return match state.controller.trigger(Trigger::External).await {
            CycleOutcome::Activated(server) => Ok(Json(TriggerResponse {
                status: TriggerStatus::Activated,
                server: Some(server),
            })),
            CycleOutcome::Skipped => Ok(Json(TriggerResponse::acknowledged(
                TriggerStatus::AlreadyRunning,
            ))),
            CycleOutcome::Failed(e) => Err(e),
        };
    }

    let status = if state.controller.spawn_trigger(Trigger::External) {
        info!("Selection cycle started by external trigger");
        TriggerStatus::Started
    } else {
        TriggerStatus::AlreadyRunning
    };

    Ok(Json(TriggerResponse::acknowledged(status)))
}
