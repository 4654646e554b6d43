use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Json,
};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{CastRequest, CastResponse, GenericResponse, StatusResponse};

use super::super::state::AppState;

/// Start driving the client towards the requesting host
///
/// The body may be JSON, form-encoded or empty. The host address is the peer
/// address unless the body names one.
pub async fn start_cast(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<CastResponse>> {
    let request = parse_cast_body(&body);

    let ip = match request.host_ip.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(raw) => raw
            .parse::<IpAddr>()
            .map_err(|_| AppError::ValidationError(format!("Invalid host_ip: {}", raw)))?,
        None => peer.ip().to_canonical(),
    };
    let address = ip.to_string();
    let host_name = resolve_host_name(&request, &headers, || reverse_lookup(ip)).await;

    tracing::info!(
        "Cast request for {} ({})",
        address,
        host_name.as_deref().unwrap_or("unknown")
    );

    let session_id = state
        .engine
        .start(&address, host_name.as_deref())
        .await
        .map_err(|e| AppError::EngineError(e.to_string()))?;

    Ok(Json(CastResponse {
        status: "started".to_string(),
        session_id: session_id.to_string(),
        address,
        host_name,
    }))
}

pub async fn stop_cast(State(state): State<Arc<AppState>>) -> Result<Json<GenericResponse>> {
    tracing::info!("Stop request");
    state
        .engine
        .stop()
        .await
        .map_err(|e| AppError::EngineError(e.to_string()))?;

    Ok(Json(GenericResponse {
        status: "stopped".to_string(),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let engine = state.engine.status();
    let status = if engine.state.is_terminal() {
        "idle"
    } else {
        "running"
    };

    Json(StatusResponse {
        status: status.to_string(),
        engine,
    })
}

/// JSON first, then `key=value&...` form data
pub fn parse_cast_body(body: &str) -> CastRequest {
    let body = body.trim();
    if body.is_empty() {
        return CastRequest::default();
    }
    if let Ok(request) = serde_json::from_str::<CastRequest>(body) {
        return request;
    }

    let mut request = CastRequest::default();
    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "pc_name" => request.pc_name = Some(value),
            "host_name" => request.host_name = Some(value),
            "host_ip" => request.host_ip = Some(value),
            _ => {}
        }
    }
    request
}

/// Host name from the body, the `Host` header, reverse DNS, then the user agent.
///
/// `reverse` runs only when the body and `Host` header carry no name.
pub async fn resolve_host_name<F, Fut>(
    request: &CastRequest,
    headers: &HeaderMap,
    reverse: F,
) -> Option<String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    if let Some(name) = request.requested_name() {
        return Some(name.to_string());
    }
    if let Some(name) = host_from_host_header(headers) {
        return Some(name);
    }
    if let Some(name) = reverse().await {
        tracing::debug!("Host name from reverse DNS: {}", name);
        return Some(name);
    }
    host_from_user_agent(headers)
}

/// Reverse DNS name of `ip`, if the resolver knows one
pub async fn reverse_lookup(ip: IpAddr) -> Option<String> {
    match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await {
        Ok(Ok(name)) => reverse_name(ip, &name),
        Ok(Err(e)) => {
            tracing::debug!("Reverse DNS lookup for {} failed: {}", ip, e);
            None
        }
        Err(e) => {
            tracing::warn!("Reverse DNS task failed: {}", e);
            None
        }
    }
}

/// A resolver answer counts only when it is a name rather than the address echoed back
fn reverse_name(ip: IpAddr, name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty()
        || name.eq_ignore_ascii_case("localhost")
        || name == ip.to_string()
        || name.parse::<IpAddr>().is_ok()
    {
        return None;
    }
    Some(name.to_string())
}

fn host_from_host_header(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::HOST)?.to_str().ok()?;
    let name = raw.split(':').next()?.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("localhost") || name.parse::<Ipv4Addr>().is_ok()
    {
        return None;
    }
    Some(name.to_string())
}

/// Sunshine puts the machine name in its user agent
fn host_from_user_agent(headers: &HeaderMap) -> Option<String> {
    let agent = headers.get(header::USER_AGENT)?.to_str().ok()?;
    if !agent.contains("Sunshine") {
        return None;
    }
    agent
        .split_whitespace()
        .find(|part| part.contains('-') && !part.contains("Mozilla") && !part.contains("Version"))
        .map(str::to_string)
}
