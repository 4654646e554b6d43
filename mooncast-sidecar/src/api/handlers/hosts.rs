use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{GenericResponse, HostsResponse};

use super::super::state::AppState;

/// List remembered address to host name mappings, most recent first
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Result<Json<HostsResponse>> {
    let hosts = state.registry.list().map_err(|e| {
        tracing::error!("Failed to list hosts: {}", e);
        AppError::RegistryError(e.to_string())
    })?;

    Ok(Json(HostsResponse {
        total: hosts.len(),
        hosts,
    }))
}

pub async fn delete_host(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<GenericResponse>> {
    let removed = state
        .registry
        .remove(&address)
        .map_err(|e| AppError::RegistryError(e.to_string()))?;

    if !removed {
        return Err(AppError::HostNotFound(address));
    }

    tracing::info!("Removed host mapping for {}", address);
    Ok(Json(GenericResponse {
        status: "deleted".to_string(),
    }))
}
