use axum::{
    extract::{
        Json, Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, header},
    response::IntoResponse,
};
use tracing::info;

use crate::AppState;
use crate::api::models::DeleteResponse;
use crate::api::response;
use crate::error::{AppError, Result};
use crate::sites::rules::EndpointDefinition;

/// Admin routes are open unless `ADMIN_TOKEN` is configured.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<EndpointDefinition>, JsonRejection>,
) -> Result<impl IntoResponse> {
    authorize(&state, &headers)?;
    let Json(definition) = payload.map_err(|e| AppError::InvalidDefinition(e.body_text()))?;

    let saved = state.store.save(definition).await?;
    info!(name = %saved.name, fields = saved.fields.len(), "admin upload");
    Ok(response::created(saved.info()))
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: std::result::Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse> {
    authorize(&state, &headers)?;
    let Path(name) = path.map_err(|e| AppError::InvalidParam(e.body_text()))?;
    state.store.remove(&name).await?;
    info!(name = %name, "admin delete");
    Ok(response::success(DeleteResponse { deleted: name }))
}
