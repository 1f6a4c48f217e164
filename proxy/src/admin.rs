//! Hot-reloadable settings (§1 ambient stack), mirroring the teacher's
//! `get_settings`/`update_settings` pair but scoped to the one field this
//! proxy actually needs to reload without a restart: the IP blocklist.

use crate::app_error::AppError;
use crate::service_registry::LocalService;
use crate::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

pub struct AdminService;

#[async_trait]
impl LocalService for AdminService {
    fn matches(&self, path: &str) -> bool {
        path == "/admin/blocklist"
    }

    async fn handle(&self, state: &Arc<AppState>, request: Request<Body>) -> Response {
        match *request.method() {
            Method::GET => get_blocklist(State(state.clone())).await.into_response(),
            Method::PUT => {
                let body = request.into_body();
                match hyper::body::to_bytes(body).await {
                    Ok(bytes) => match serde_json::from_slice::<BlocklistSettings>(&bytes) {
                        Ok(settings) => update_blocklist(State(state.clone()), Json(settings))
                            .await
                            .into_response(),
                        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
                    },
                    Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
                }
            }
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlocklistSettings {
    pub blocklist: Vec<IpAddr>,
}

pub async fn get_blocklist(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let blocklist = state.blocklist.read().await;
    Json(BlocklistSettings {
        blocklist: blocklist.iter().copied().collect(),
    })
}

pub async fn update_blocklist(
    State(state): State<Arc<AppState>>,
    Json(updated): Json<BlocklistSettings>,
) -> Result<(), AppError> {
    let mut blocklist = state.blocklist.write().await;
    *blocklist = updated.blocklist.into_iter().collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip_through_json() {
        let settings = BlocklistSettings {
            blocklist: vec!["10.0.0.1".parse().unwrap()],
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: BlocklistSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.blocklist, settings.blocklist);
    }
}
