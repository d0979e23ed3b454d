use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use super::backend::InferenceBackend;
use super::domain::RawProfile;
use super::gate::AuthGate;
use super::relay::relay;
use super::service::EligibilityService;
use crate::error::AppError;

/// Largest profile body the check endpoint will read.
pub const MAX_PROFILE_BYTES: usize = 2 * 1024 * 1024;

/// Shared handler state: the service plus the session gate in front of it.
pub struct EligibilityState<B> {
    pub service: Arc<EligibilityService<B>>,
    pub gate: Arc<dyn AuthGate>,
}

impl<B> Clone for EligibilityState<B> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            gate: self.gate.clone(),
        }
    }
}

/// Router exposing the eligibility check endpoint.
pub fn eligibility_router<B>(service: Arc<EligibilityService<B>>, gate: Arc<dyn AuthGate>) -> Router
where
    B: InferenceBackend + 'static,
{
    Router::new()
        .route("/api/check-eligibility", post(check_handler::<B>))
        .with_state(EligibilityState { service, gate })
}

pub(crate) async fn check_handler<B>(
    State(state): State<EligibilityState<B>>,
    headers: HeaderMap,
    body: Body,
) -> Response
where
    B: InferenceBackend + 'static,
{
    // The body stays unread until the caller is known.
    if !state.gate.is_authenticated(&headers) {
        let payload = json!({ "error": "authentication required" });
        return (StatusCode::UNAUTHORIZED, Json(payload)).into_response();
    }

    let profile = match read_profile(body).await {
        Ok(profile) => profile,
        Err(err) => return err.into_response(),
    };

    relay(state.service.check(profile).await).into_response()
}

async fn read_profile(body: Body) -> Result<RawProfile, AppError> {
    let bytes = to_bytes(body, MAX_PROFILE_BYTES).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
