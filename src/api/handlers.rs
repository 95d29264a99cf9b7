//! HTTP handlers (§4.C). Each composes the middleware chain from
//! [`super::context::RequestContext`] with `?` and renders the result.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use super::context::RequestContext;
use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::types::{AuthQuery, AuthResponse, ConnectionInfo, HealthResponse, RegisterResponse};

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        time: Utc::now().to_rfc3339(),
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Path(sub): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::validate_domain(&sub)?
        .validate_domain_is_available(state.store.as_ref())
        .await?
        .with_new_agent_credentials(state.store.as_ref())
        .await?
        .with_domain_lease(state.store.as_ref())
        .await?;

    let credentials = ctx
        .credentials
        .expect("with_new_agent_credentials populates credentials");
    Ok(Json(RegisterResponse {
        agent_id: credentials.to_wire(),
        error: None,
    }))
}

pub async fn auth(
    State(state): State<Arc<AppState>>,
    Path(sub): Path<String>,
    Query(query): Query<AuthQuery>,
) -> ApiResult<impl IntoResponse> {
    let identity = query
        .identity
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::InputInvalid("missing identity query parameter".into()))?
        .parse::<Uuid>()
        .map_err(|_| ApiError::InputInvalid("identity query parameter is not a uuid".into()))?;

    let ctx = RequestContext::validate_domain(&sub)?
        .validate_authentication_request(state.store.as_ref(), identity)
        .await?
        .with_gatekeeper_meta(state.store.as_ref())
        .await?
        .with_new_slot_fs(state.store.as_ref())
        .await?;

    let port = ctx.slot.expect("with_new_slot_fs populates slot");
    let gk = ctx
        .gatekeeper
        .expect("with_gatekeeper_meta populates gatekeeper");
    Ok(Json(AuthResponse {
        connection: ConnectionInfo { port, gk },
        error: None,
    }))
}
