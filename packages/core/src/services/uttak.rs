use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::repository::vekt::{self, KategoriSum, RapportFilter};

use super::scope_owner;

#[derive(Debug, Default, Deserialize)]
pub struct UttakQuery {
    pub stasjon_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
}

/// Weight report for a period, heaviest kategori first.
#[derive(Debug, Serialize)]
pub struct Uttaksdata {
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
    pub totalt_kg: f64,
    pub kategorier: Vec<KategoriSum>,
}

#[derive(Clone)]
pub struct UttakService {
    pool: SqlitePool,
}

impl UttakService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn rapport(&self, identity: &Identity, query: UttakQuery) -> AppResult<Uttaksdata> {
        if let (Some(fra), Some(til)) = (query.fra, query.til) {
            if fra >= til {
                return Err(AppError::validation("fra må være før til"));
            }
        }
        let (partner_id, stasjon_id) = scope_owner(identity, query.partner_id, query.stasjon_id)?;

        let filter = RapportFilter {
            stasjon_id,
            partner_id,
            fra: query.fra,
            til: query.til,
        };
        let mut conn = self.pool.acquire().await?;
        let kategorier = vekt::rapport(&mut *conn, &filter).await?;
        let totalt_kg: f64 = kategorier.iter().map(|k| k.vekt_kg).sum();

        tracing::debug!(
            "uttak report: {} kategorier, {} kg (partner {:?}, stasjon {:?})",
            kategorier.len(),
            totalt_kg,
            partner_id,
            stasjon_id
        );
        Ok(Uttaksdata {
            fra: query.fra,
            til: query.til,
            totalt_kg,
            kategorier,
        })
    }
}
