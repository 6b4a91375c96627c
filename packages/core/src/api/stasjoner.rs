use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Router,
};

use super::partnere::NavnQuery;
use super::extract::{Json, Path, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::stasjon::Stasjon;
use crate::services::stasjon::{NyStasjon, StasjonEndring};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stasjoner", get(list_stasjoner).post(create_stasjon))
        .route(
            "/stasjoner/:id",
            get(get_stasjon).patch(update_stasjon).delete(delete_stasjon),
        )
}

async fn create_stasjon(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyStasjon>,
) -> Result<(StatusCode, Json<Stasjon>), AppError> {
    let created = state.stasjoner.create(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_stasjoner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<NavnQuery>,
) -> Result<Json<Vec<Stasjon>>, AppError> {
    Ok(Json(
        state.stasjoner.list(&identity, query.navn.as_deref()).await?,
    ))
}

async fn get_stasjon(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Stasjon>, AppError> {
    Ok(Json(state.stasjoner.get(&identity, id).await?))
}

async fn update_stasjon(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<StasjonEndring>,
) -> Result<Json<Stasjon>, AppError> {
    Ok(Json(state.stasjoner.update(&identity, id, body).await?))
}

async fn delete_stasjon(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.stasjoner.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
