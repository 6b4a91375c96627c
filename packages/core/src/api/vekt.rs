//! Routes:
//! - `POST   /vektregistreringer`, `POST /vektregistreringer/batch`
//! - `GET    /vektregistreringer?henting_type=&henting_id=&kategori_id=`
//! - `PATCH  /vektregistreringer/:id`, `DELETE /vektregistreringer/:id`

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Router,
};

use super::extract::{Json, Path, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::vekt::Vektregistrering;
use crate::services::vekt::{NyVektregistrering, VektBatch, VektEndring, VektQuery};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/vektregistreringer", get(list_vekt).post(register))
        .route("/vektregistreringer/batch", post(register_batch))
        .route(
            "/vektregistreringer/:id",
            patch(update_vekt).delete(delete_vekt),
        )
}

async fn register(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyVektregistrering>,
) -> Result<(StatusCode, Json<Vektregistrering>), AppError> {
    let created = state.vekt.register(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn register_batch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<VektBatch>,
) -> Result<(StatusCode, Json<Vec<Vektregistrering>>), AppError> {
    let created = state.vekt.register_batch(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_vekt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<VektQuery>,
) -> Result<Json<Vec<Vektregistrering>>, AppError> {
    Ok(Json(state.vekt.list(&identity, query).await?))
}

async fn update_vekt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<VektEndring>,
) -> Result<Json<Vektregistrering>, AppError> {
    Ok(Json(state.vekt.update(&identity, id, body).await?))
}

async fn delete_vekt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.vekt.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
