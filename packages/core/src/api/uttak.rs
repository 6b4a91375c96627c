use axum::{
    extract::State,
    routing::get,
    Extension, Router,
};

use super::extract::{Json, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::services::uttak::{UttakQuery, Uttaksdata};

pub fn routes() -> Router<AppState> {
    Router::new().route("/uttak/rapport", get(rapport))
}

/// `GET /uttak/rapport?stasjon_id=&partner_id=&fra=&til=`
async fn rapport(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<UttakQuery>,
) -> Result<Json<Uttaksdata>, AppError> {
    Ok(Json(state.uttak.rapport(&identity, query).await?))
}
