use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{Identity, Role};
use crate::error::{AppError, AppResult};
use crate::repository::henting::{self, PlanOwner};
use crate::repository::stasjon::{self, Stasjon, Stasjonstype};
use crate::repository::{kontakt, utlysning};
use crate::services::keycloak::{GroupKind, SharedGroupManager};
use crate::services::validate_navn;

#[derive(Debug, Deserialize)]
pub struct NyStasjon {
    pub navn: String,
    #[serde(default)]
    pub stasjonstype: Stasjonstype,
}

#[derive(Debug, Default, Deserialize)]
pub struct StasjonEndring {
    pub navn: Option<String>,
    pub stasjonstype: Option<Stasjonstype>,
}

#[derive(Clone)]
pub struct StasjonService {
    pool: SqlitePool,
    groups: SharedGroupManager,
}

impl StasjonService {
    pub fn new(pool: SqlitePool, groups: SharedGroupManager) -> Self {
        Self { pool, groups }
    }

    pub async fn create(&self, identity: &Identity, req: NyStasjon) -> AppResult<Stasjon> {
        identity.require_admin()?;
        let navn = validate_navn(&req.navn)?;

        let mut tx = self.pool.begin().await?;
        if stasjon::find_by_navn(&mut *tx, &navn).await?.is_some() {
            return Err(AppError::conflict(format!("stasjon '{}' finnes allerede", navn)));
        }

        let id = stasjon::insert(&mut *tx, &navn, req.stasjonstype, Utc::now()).await?;
        self.groups.create_group(GroupKind::Stasjon, id, &navn).await?;

        let created = stasjon::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("stasjon {}", id)))?;
        tx.commit().await?;

        tracing::info!("Stasjon {} created ({})", created.id, created.navn);
        Ok(created)
    }

    pub async fn list(&self, identity: &Identity, navn: Option<&str>) -> AppResult<Vec<Stasjon>> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;
        Ok(stasjon::list(&mut *conn, navn).await?)
    }

    pub async fn get(&self, identity: &Identity, id: i64) -> AppResult<Stasjon> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;
        stasjon::find(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("stasjon {}", id)))
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: i64,
        req: StasjonEndring,
    ) -> AppResult<Stasjon> {
        identity.require_admin()?;

        let mut tx = self.pool.begin().await?;
        let mut current = stasjon::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("stasjon {}", id)))?;
        let old_navn = current.navn.clone();

        if let Some(navn) = req.navn {
            let navn = validate_navn(&navn)?;
            if let Some(other) = stasjon::find_by_navn(&mut *tx, &navn).await? {
                if other.id != id {
                    return Err(AppError::conflict(format!("stasjon '{}' finnes allerede", navn)));
                }
            }
            current.navn = navn;
        }
        if let Some(stasjonstype) = req.stasjonstype {
            current.stasjonstype = stasjonstype;
        }

        stasjon::update(&mut *tx, &current).await?;
        if current.navn != old_navn {
            self.groups
                .rename_group(GroupKind::Stasjon, &old_navn, &current.navn)
                .await?;
        }
        tx.commit().await?;

        Ok(current)
    }

    /// Soft-deletes the station with its plans, future hentinger, ekstra
    /// hentinger (and their utlysninger) and contacts.
    pub async fn delete(&self, identity: &Identity, id: i64) -> AppResult<()> {
        identity.require_admin()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let current = stasjon::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("stasjon {}", id)))?;

        stasjon::soft_delete(&mut *tx, id, now).await?;
        let plans = henting::soft_delete_henteplaner_for(&mut *tx, PlanOwner::Stasjon(id), now).await?;

        let ekstra = henting::ekstra_ids_for_stasjon(&mut *tx, id).await?;
        for henting_id in &ekstra {
            henting::soft_delete_ekstra(&mut *tx, *henting_id, now).await?;
            utlysning::soft_delete_for_henting(&mut *tx, *henting_id, now).await?;
        }

        kontakt::soft_delete_for_stasjon(&mut *tx, id, now).await?;
        self.groups.delete_group(GroupKind::Stasjon, &current.navn).await?;
        tx.commit().await?;

        tracing::info!(
            "Stasjon {} deleted along with {} henteplaner and {} ekstra hentinger",
            id,
            plans,
            ekstra.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::db::create_pool;
    use crate::repository::henting::EkstraHenting;
    use crate::services::keycloak::testing::RecordingGroupManager;

    #[tokio::test]
    async fn create_defaults_to_gjenbruk() {
        let groups = Arc::new(RecordingGroupManager::default());
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let service = StasjonService::new(pool, groups.clone());

        let created = service
            .create(
                &Identity::admin(),
                serde_json::from_value(serde_json::json!({ "navn": "Grønmo" })).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(created.stasjonstype, Stasjonstype::Gjenbruk);
        assert_eq!(
            groups.calls(),
            vec![format!("create:stasjoner:{}:Grønmo", created.id)]
        );
    }

    #[tokio::test]
    async fn station_role_cannot_rename_itself() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let service = StasjonService::new(pool, Arc::new(RecordingGroupManager::default()));
        let created = service
            .create(
                &Identity::admin(),
                NyStasjon {
                    navn: "Grønmo".into(),
                    stasjonstype: Stasjonstype::Mini,
                },
            )
            .await
            .unwrap();

        let err = service
            .update(
                &Identity::stasjon(created.id),
                created.id,
                StasjonEndring {
                    navn: Some("Nytt navn".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_ekstra_hentinger() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let service = StasjonService::new(pool.clone(), Arc::new(RecordingGroupManager::default()));
        let created = service
            .create(
                &Identity::admin(),
                NyStasjon {
                    navn: "Haraldrud".into(),
                    stasjonstype: Stasjonstype::Gjenbruk,
                },
            )
            .await
            .unwrap();

        let start = Utc::now() + Duration::days(1);
        let henting_id = {
            let mut conn = pool.acquire().await.unwrap();
            henting::insert_ekstra(
                &mut conn,
                &EkstraHenting {
                    id: 0,
                    stasjon_id: created.id,
                    start_tidspunkt: start,
                    slutt_tidspunkt: start + Duration::hours(1),
                    merknad: None,
                    kategorier: Vec::new(),
                    godkjent_utlysning: None,
                    utlysninger: None,
                },
                Utc::now(),
            )
            .await
            .unwrap()
        };

        service.delete(&Identity::admin(), created.id).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert!(henting::find_ekstra(&mut conn, henting_id).await.unwrap().is_none());
    }
}
