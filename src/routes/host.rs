use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;

/// Address and port clients on the local network can reach this server at.
#[derive(Debug, Serialize)]
pub struct HostInfo {
    pub ip: String,
    pub port: u16,
}

pub async fn ip_handler(State(state): State<AppState>) -> Json<HostInfo> {
    Json(HostInfo {
        ip: state.host.to_string(),
        port: state.config.port,
    })
}
