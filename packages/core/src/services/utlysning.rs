//! Offers of ekstra hentinger to partners.
//!
//! State lives in four fields on the row: `partner_pameldt` (sign-up time),
//! `stasjon_godkjent` (approval time), `partner_skjult` and `partner_vist`.
//! At most one live utlysning per henting can be signed up, and an approval
//! only exists alongside a sign-up.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::{Identity, Role};
use crate::error::{AppError, AppResult};
use crate::metrics::AppMetrics;
use crate::repository::henting::{self, EkstraHenting};
use crate::repository::partner;
use crate::repository::utlysning::{self, Utlysning, UtlysningFilter};

#[derive(Debug, Deserialize)]
pub struct NyUtlysning {
    pub partner_id: i64,
    pub henting_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UtlysningBatch {
    pub henting_id: i64,
    pub partner_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UtlysningQuery {
    pub partner_id: Option<i64>,
    pub henting_id: Option<i64>,
    pub pameldt: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct Pamelding {
    pub to_accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct Godkjenning {
    pub to_approve: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SynlighetEndring {
    pub skjult: Option<bool>,
    pub vist: Option<bool>,
}

#[derive(Clone)]
pub struct UtlysningService {
    pool: SqlitePool,
    metrics: Arc<AppMetrics>,
}

impl UtlysningService {
    pub fn new(pool: SqlitePool, metrics: Arc<AppMetrics>) -> Self {
        Self { pool, metrics }
    }

    async fn load(conn: &mut SqliteConnection, id: i64) -> AppResult<Utlysning> {
        utlysning::find(conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("utlysning {}", id)))
    }

    async fn load_henting(conn: &mut SqliteConnection, henting_id: i64) -> AppResult<EkstraHenting> {
        henting::find_ekstra(conn, henting_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("ekstra henting {}", henting_id)))
    }

    async fn offer(
        conn: &mut SqliteConnection,
        partner_id: i64,
        henting_id: i64,
    ) -> AppResult<Utlysning> {
        if partner::find(&mut *conn, partner_id).await?.is_none() {
            return Err(AppError::validation(format!("ukjent partner {}", partner_id)));
        }
        let id = utlysning::insert(&mut *conn, partner_id, henting_id, Utc::now()).await?;
        Self::load(conn, id).await
    }

    pub async fn create(&self, identity: &Identity, req: NyUtlysning) -> AppResult<Utlysning> {
        let mut tx = self.pool.begin().await?;
        let henting = Self::load_henting(&mut *tx, req.henting_id).await?;
        identity.require_admin_or_stasjon(henting.stasjon_id)?;

        let created = Self::offer(&mut *tx, req.partner_id, req.henting_id).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// All offers or none: an existing offer for any partner aborts the batch.
    pub async fn create_batch(
        &self,
        identity: &Identity,
        req: UtlysningBatch,
    ) -> AppResult<Vec<Utlysning>> {
        if req.partner_ids.is_empty() {
            return Err(AppError::validation("partner_ids kan ikke være tom"));
        }

        let mut tx = self.pool.begin().await?;
        let henting = Self::load_henting(&mut *tx, req.henting_id).await?;
        identity.require_admin_or_stasjon(henting.stasjon_id)?;

        let mut created = Vec::with_capacity(req.partner_ids.len());
        for partner_id in &req.partner_ids {
            created.push(Self::offer(&mut *tx, *partner_id, req.henting_id).await?);
        }
        tx.commit().await?;

        tracing::info!(
            "Ekstra henting {} offered to {} partnere",
            req.henting_id,
            created.len()
        );
        Ok(created)
    }

    /// Partners see their own offers under the visibility rule; admin and
    /// stations see every row.
    pub async fn list(&self, identity: &Identity, query: UtlysningQuery) -> AppResult<Vec<Utlysning>> {
        identity.require_any(&Role::ALL)?;
        let filter = if identity.is_admin() || identity.has_role(Role::ReuseStation) {
            UtlysningFilter {
                partner_id: query.partner_id,
                henting_id: query.henting_id,
                pameldt: query.pameldt,
                synlig_for_partner: None,
            }
        } else {
            let own = identity
                .partner_id()
                .ok_or_else(|| AppError::forbidden("mangler gruppetilhørighet"))?;
            UtlysningFilter {
                partner_id: None,
                henting_id: query.henting_id,
                pameldt: query.pameldt,
                synlig_for_partner: Some(own),
            }
        };

        let mut conn = self.pool.acquire().await?;
        Ok(utlysning::list(&mut *conn, &filter).await?)
    }

    pub async fn get(&self, identity: &Identity, id: i64) -> AppResult<Utlysning> {
        let mut conn = self.pool.acquire().await?;
        let found = Self::load(&mut *conn, id).await?;
        if identity.is_admin() || identity.is_partner(found.partner_id) {
            return Ok(found);
        }
        let henting = Self::load_henting(&mut *conn, found.henting_id).await?;
        identity.require_admin_or_stasjon(henting.stasjon_id)?;
        Ok(found)
    }

    pub async fn delete(&self, identity: &Identity, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let found = Self::load(&mut *tx, id).await?;
        let henting = Self::load_henting(&mut *tx, found.henting_id).await?;
        identity.require_admin_or_stasjon(henting.stasjon_id)?;

        utlysning::soft_delete(&mut *tx, id, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Sign up for, or withdraw from, an offer.
    pub async fn pamelding(
        &self,
        identity: &Identity,
        id: i64,
        req: Pamelding,
    ) -> AppResult<Utlysning> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut found = Self::load(&mut *tx, id).await?;
        identity.require_admin_or_partner(found.partner_id)?;

        let mut newly_accepted = false;
        if req.to_accept {
            let henting = Self::load_henting(&mut *tx, found.henting_id).await?;
            if henting.start_tidspunkt <= now {
                return Err(AppError::validation("hentingen har allerede startet"));
            }
            if let Some(accepted) = utlysning::accepted_for_henting(&mut *tx, found.henting_id).await? {
                if accepted.id != found.id {
                    tracing::warn!(
                        "Partner {} tried to accept henting {} already taken by partner {}",
                        found.partner_id,
                        found.henting_id,
                        accepted.partner_id
                    );
                    return Err(AppError::conflict("hentingen er allerede tatt av en annen partner"));
                }
            }
            if found.partner_pameldt.is_none() {
                found.partner_pameldt = Some(now);
                newly_accepted = true;
            }
        } else {
            found.partner_pameldt = None;
            found.stasjon_godkjent = None;
        }

        utlysning::update_state(&mut *tx, &found).await?;
        tx.commit().await?;

        if newly_accepted {
            self.metrics.utlysning_pameldinger_total.inc();
            tracing::info!(
                "Partner {} signed up for ekstra henting {}",
                found.partner_id,
                found.henting_id
            );
        }
        Ok(found)
    }

    /// Station approval of a sign-up.
    pub async fn godkjenning(
        &self,
        identity: &Identity,
        id: i64,
        req: Godkjenning,
    ) -> AppResult<Utlysning> {
        let mut tx = self.pool.begin().await?;
        let mut found = Self::load(&mut *tx, id).await?;
        let henting = Self::load_henting(&mut *tx, found.henting_id).await?;
        identity.require_admin_or_stasjon(henting.stasjon_id)?;

        if req.to_approve {
            if found.partner_pameldt.is_none() {
                return Err(AppError::validation("partneren har ikke meldt seg på"));
            }
            if found.stasjon_godkjent.is_none() {
                found.stasjon_godkjent = Some(Utc::now());
            }
        } else {
            found.stasjon_godkjent = None;
        }

        utlysning::update_state(&mut *tx, &found).await?;
        tx.commit().await?;
        Ok(found)
    }

    /// `vist` only ever moves from false to true.
    pub async fn synlighet(
        &self,
        identity: &Identity,
        id: i64,
        req: SynlighetEndring,
    ) -> AppResult<Utlysning> {
        let mut tx = self.pool.begin().await?;
        let mut found = Self::load(&mut *tx, id).await?;
        identity.require_admin_or_partner(found.partner_id)?;

        if let Some(skjult) = req.skjult {
            found.partner_skjult = skjult;
        }
        if req.vist == Some(true) {
            found.partner_vist = true;
        }

        utlysning::update_state(&mut *tx, &found).await?;
        tx.commit().await?;
        Ok(found)
    }
}
