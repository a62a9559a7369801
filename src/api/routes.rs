use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::Uri,
    response::IntoResponse,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::api::admin;
use crate::api::models::{HealthResponse, ListResponse};
use crate::api::response;
use crate::error::{AppError, Result};
use crate::pipeline;
use crate::sites::{self, Params, Site};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/list", get(list_handler).fallback(method_not_allowed))
        .route("/api/:name", get(scrape_handler).fallback(method_not_allowed))
        .route(
            "/admin/api/upload",
            post(admin::upload).fallback(method_not_allowed),
        )
        .route(
            "/admin/api/:name",
            delete(admin::remove).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn health_handler() -> impl IntoResponse {
    response::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let mut endpoints: Vec<_> = sites::builtins().iter().map(|site| site.info()).collect();
    endpoints.extend(state.store.list().await?.iter().map(|def| def.info()));

    Ok(response::success(ListResponse {
        total: endpoints.len(),
        endpoints,
    }))
}

async fn scrape_handler(
    State(state): State<AppState>,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<Params>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Path(name) = path.map_err(|e| AppError::InvalidParam(e.body_text()))?;
    let Query(params) = query.map_err(|e| AppError::InvalidParam(e.body_text()))?;
    let site = resolve(&state, &name).await?;
    let data = pipeline::run(site.as_ref(), &params, &state.chain, &state.policy).await?;
    Ok(response::success(data))
}

/// Built-ins take precedence; anything else is looked up in the registry.
async fn resolve(state: &AppState, name: &str) -> Result<Arc<dyn Site>> {
    if let Some(site) = sites::builtin(name) {
        return Ok(site);
    }
    match state.store.load(name).await? {
        Some(rule_site) => Ok(Arc::new(rule_site)),
        None => Err(AppError::UnknownEndpoint(name.to_string())),
    }
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

async fn not_found(uri: Uri) -> AppError {
    AppError::UnknownEndpoint(uri.path().to_string())
}
