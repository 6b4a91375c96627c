//! Routes:
//! - `POST   /kontakter`
//! - `GET    /kontakter?partner_id=&stasjon_id=`
//! - `GET    /kontakter/:id`
//! - `PATCH  /kontakter/:id`
//! - `DELETE /kontakter/:id`
//! - `POST   /kontakter/verifiser`
//! - `GET    /kontakter/:id/verifisering`
//! - `POST   /kontakter/:id/verifisering` (new codes)

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};

use super::extract::{Json, Path, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::kontakt::Kontakt;
use crate::services::kontakt::{
    KontaktEndring, KontaktQuery, NyKontakt, VerifiserRequest, VerifiseringStatus,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/kontakter", get(list_kontakter).post(create_kontakt))
        .route("/kontakter/verifiser", post(verifiser))
        .route(
            "/kontakter/:id",
            get(get_kontakt).patch(update_kontakt).delete(delete_kontakt),
        )
        .route(
            "/kontakter/:id/verifisering",
            get(verifisering_status).post(ny_verifisering),
        )
}

async fn create_kontakt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyKontakt>,
) -> Result<(StatusCode, Json<Kontakt>), AppError> {
    let created = state.kontakter.create(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_kontakter(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<KontaktQuery>,
) -> Result<Json<Vec<Kontakt>>, AppError> {
    Ok(Json(state.kontakter.list(&identity, query).await?))
}

async fn get_kontakt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Kontakt>, AppError> {
    Ok(Json(state.kontakter.get(&identity, id).await?))
}

async fn update_kontakt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<KontaktEndring>,
) -> Result<Json<Kontakt>, AppError> {
    Ok(Json(state.kontakter.update(&identity, id, body).await?))
}

async fn delete_kontakt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.kontakter.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn verifiser(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<VerifiserRequest>,
) -> Result<Json<VerifiseringStatus>, AppError> {
    Ok(Json(state.kontakter.verifiser(&identity, body).await?))
}

async fn verifisering_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<VerifiseringStatus>, AppError> {
    Ok(Json(state.kontakter.status(&identity, id).await?))
}

async fn ny_verifisering(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<VerifiseringStatus>, AppError> {
    Ok(Json(state.kontakter.ny_verifisering(&identity, id).await?))
}
