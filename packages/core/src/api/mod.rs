//! HTTP surface.
//!
//! [`router`] assembles every resource router behind the bearer-token
//! middleware. `/health` and `/metrics` stay public.

pub mod extract;
pub mod health;
pub mod hentinger;
pub mod kategorier;
pub mod kontakter;
pub mod partnere;
pub mod stasjoner;
pub mod utlysninger;
pub mod uttak;
pub mod vekt;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{auth_middleware, JwtKeys};
use crate::error::AppError;
use crate::metrics::{track_http, AppMetrics};
use crate::services::henting::HentingService;
use crate::services::kategori::KategoriService;
use crate::services::keycloak::SharedGroupManager;
use crate::services::kontakt::KontaktService;
use crate::services::partner::PartnerService;
use crate::services::stasjon::StasjonService;
use crate::services::utlysning::UtlysningService;
use crate::services::uttak::UttakService;
use crate::services::varsling::SharedVerificationSender;
use crate::services::vekt::VektService;

/// Everything the handlers reach through `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub metrics: Arc<AppMetrics>,
    pub jwt: Arc<JwtKeys>,
    pub partnere: PartnerService,
    pub stasjoner: StasjonService,
    pub kontakter: KontaktService,
    pub kategorier: KategoriService,
    pub hentinger: HentingService,
    pub utlysninger: UtlysningService,
    pub vekt: VektService,
    pub uttak: UttakService,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        groups: SharedGroupManager,
        sender: SharedVerificationSender,
        metrics: Arc<AppMetrics>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            partnere: PartnerService::new(pool.clone(), groups.clone()),
            stasjoner: StasjonService::new(pool.clone(), groups),
            kontakter: KontaktService::new(pool.clone(), sender),
            kategorier: KategoriService::new(pool.clone()),
            hentinger: HentingService::new(pool.clone()),
            utlysninger: UtlysningService::new(pool.clone(), metrics.clone()),
            vekt: VektService::new(pool.clone(), metrics.clone()),
            uttak: UttakService::new(pool.clone()),
            jwt: Arc::new(JwtKeys::new(jwt_secret)),
            metrics,
            pool,
        }
    }
}

/// The complete application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(partnere::routes())
        .merge(stasjoner::routes())
        .merge(kontakter::routes())
        .merge(kategorier::routes())
        .merge(hentinger::routes())
        .merge(utlysninger::routes())
        .merge(vekt::routes())
        .merge(uttak::routes())
        .route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_http,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Parse(format!("metrics encoding failed: {}", e)))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map_err(|e| AppError::Parse(e.to_string()))
}
