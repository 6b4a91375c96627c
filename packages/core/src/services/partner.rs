use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{Identity, Role};
use crate::error::{AppError, AppResult};
use crate::repository::henting::{self, PlanOwner};
use crate::repository::kontakt;
use crate::repository::partner::{self, Partner, Storrelse};
use crate::repository::utlysning;
use crate::services::keycloak::{GroupKind, SharedGroupManager};
use crate::services::validate_navn;

#[derive(Debug, Deserialize)]
pub struct NyPartner {
    pub navn: String,
    #[serde(default)]
    pub ideell: bool,
    #[serde(default)]
    pub storrelse: Storrelse,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartnerEndring {
    pub navn: Option<String>,
    pub ideell: Option<bool>,
    pub storrelse: Option<Storrelse>,
}

#[derive(Clone)]
pub struct PartnerService {
    pool: SqlitePool,
    groups: SharedGroupManager,
}

impl PartnerService {
    pub fn new(pool: SqlitePool, groups: SharedGroupManager) -> Self {
        Self { pool, groups }
    }

    pub async fn create(&self, identity: &Identity, req: NyPartner) -> AppResult<Partner> {
        identity.require_admin()?;
        let navn = validate_navn(&req.navn)?;

        let mut tx = self.pool.begin().await?;
        if partner::find_by_navn(&mut *tx, &navn).await?.is_some() {
            return Err(AppError::conflict(format!("partner '{}' finnes allerede", navn)));
        }

        let id = partner::insert(&mut *tx, &navn, req.ideell, req.storrelse, Utc::now()).await?;
        self.groups.create_group(GroupKind::Partner, id, &navn).await?;

        let created = partner::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("partner {}", id)))?;
        tx.commit().await?;

        tracing::info!("Partner {} created ({})", created.id, created.navn);
        Ok(created)
    }

    pub async fn list(&self, identity: &Identity, navn: Option<&str>) -> AppResult<Vec<Partner>> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;
        Ok(partner::list(&mut *conn, navn).await?)
    }

    pub async fn get(&self, identity: &Identity, id: i64) -> AppResult<Partner> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;
        partner::find(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("partner {}", id)))
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: i64,
        req: PartnerEndring,
    ) -> AppResult<Partner> {
        identity.require_admin()?;

        let mut tx = self.pool.begin().await?;
        let mut current = partner::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("partner {}", id)))?;
        let old_navn = current.navn.clone();

        if let Some(navn) = req.navn {
            let navn = validate_navn(&navn)?;
            if let Some(other) = partner::find_by_navn(&mut *tx, &navn).await? {
                if other.id != id {
                    return Err(AppError::conflict(format!("partner '{}' finnes allerede", navn)));
                }
            }
            current.navn = navn;
        }
        if let Some(ideell) = req.ideell {
            current.ideell = ideell;
        }
        if let Some(storrelse) = req.storrelse {
            current.storrelse = storrelse;
        }

        partner::update(&mut *tx, &current).await?;
        if current.navn != old_navn {
            self.groups
                .rename_group(GroupKind::Partner, &old_navn, &current.navn)
                .await?;
        }
        tx.commit().await?;

        Ok(current)
    }

    /// Soft-deletes the partner with its plans, future hentinger, offers and
    /// contacts.
    pub async fn delete(&self, identity: &Identity, id: i64) -> AppResult<()> {
        identity.require_admin()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let current = partner::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("partner {}", id)))?;

        partner::soft_delete(&mut *tx, id, now).await?;
        let plans = henting::soft_delete_henteplaner_for(&mut *tx, PlanOwner::Partner(id), now).await?;
        let kontakter = kontakt::soft_delete_for_partner(&mut *tx, id, now).await?;
        let utlysninger = utlysning::soft_delete_for_partner(&mut *tx, id, now).await?;
        self.groups.delete_group(GroupKind::Partner, &current.navn).await?;
        tx.commit().await?;

        tracing::info!(
            "Partner {} deleted along with {} henteplaner, {} utlysninger and {} kontakter",
            id,
            plans,
            utlysninger,
            kontakter
        );
        Ok(())
    }
}
