use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Router,
};

use super::extract::{Json, Path};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::kategori::Kategori;
use crate::services::kategori::{KategoriEndring, NyKategori};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/kategorier", get(list_kategorier).post(create_kategori))
        .route(
            "/kategorier/:id",
            get(get_kategori).patch(update_kategori).delete(delete_kategori),
        )
}

async fn create_kategori(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyKategori>,
) -> Result<(StatusCode, Json<Kategori>), AppError> {
    let created = state.kategorier.create(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_kategorier(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Kategori>>, AppError> {
    Ok(Json(state.kategorier.list(&identity).await?))
}

async fn get_kategori(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Kategori>, AppError> {
    Ok(Json(state.kategorier.get(&identity, id).await?))
}

async fn update_kategori(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<KategoriEndring>,
) -> Result<Json<Kategori>, AppError> {
    Ok(Json(state.kategorier.update(&identity, id, body).await?))
}

async fn delete_kategori(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.kategorier.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
