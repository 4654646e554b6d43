use serde::Serialize;

use crate::automation::EngineStatus;
use crate::hosts::HostRecord;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Open event-stream connections
    pub active_clients: usize,
}

#[derive(Debug, Serialize)]
pub struct CastResponse {
    pub status: String,
    pub session_id: String,
    pub address: String,
    pub host_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

#[derive(Debug, Serialize)]
pub struct HostsResponse {
    pub hosts: Vec<HostRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct GenericResponse {
    pub status: String,
}
