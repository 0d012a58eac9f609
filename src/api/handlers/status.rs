use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::Envelope;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub port: u16,
    pub ip: Option<String>,
    pub version: &'static str,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Envelope<StatusResponse>> {
    let address = state.address();
    Envelope::success(StatusResponse {
        status: "running",
        port: address.port,
        ip: address.ip.map(|ip| ip.to_string()),
        version: env!("CARGO_PKG_VERSION"),
    })
}
