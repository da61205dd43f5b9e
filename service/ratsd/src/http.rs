use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};

use crate::auth::{self, Authorizer};
use crate::compositor::{Compositor, EAT_MEDIA_TYPE};
use crate::problem::Problem;

pub const CHARES_PATH: &str = "/ratsd/chares";
pub const SUBATTESTERS_PATH: &str = "/ratsd/subattesters";

pub struct AppState {
    pub compositor: Compositor,
    pub authorizer: Arc<dyn Authorizer>,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(CHARES_PATH, post(chares))
        .route(SUBATTESTERS_PATH, get(subattesters))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn chares(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, Problem> {
    state.compositor.check_media_types(
        header_str(&headers, header::CONTENT_TYPE),
        header_str(&headers, header::ACCEPT),
    )?;

    let envelope = state.compositor.compose(&body).await?;
    tracing::info!(nonce = %envelope.eat_nonce, "evidence composed");

    Ok(([(header::CONTENT_TYPE, EAT_MEDIA_TYPE)], Json(envelope)))
}

async fn subattesters(State(state): State<SharedState>) -> Result<impl IntoResponse, Problem> {
    let infos = state.compositor.subattesters().await?;
    Ok(Json(infos))
}
