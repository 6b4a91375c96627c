use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{Identity, Role};
use crate::error::{AppError, AppResult};
use crate::repository::kategori::{self, Kategori};
use crate::services::validate_navn;

fn default_vektkategori() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct NyKategori {
    pub navn: String,
    #[serde(default = "default_vektkategori")]
    pub vektkategori: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct KategoriEndring {
    pub navn: Option<String>,
    pub vektkategori: Option<bool>,
}

#[derive(Clone)]
pub struct KategoriService {
    pool: SqlitePool,
}

impl KategoriService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, identity: &Identity, req: NyKategori) -> AppResult<Kategori> {
        identity.require_admin()?;
        let navn = validate_navn(&req.navn)?;

        let mut tx = self.pool.begin().await?;
        if kategori::find_by_navn(&mut *tx, &navn).await?.is_some() {
            return Err(AppError::conflict(format!("kategori '{}' finnes allerede", navn)));
        }
        let id = kategori::insert(&mut *tx, &navn, req.vektkategori, Utc::now()).await?;
        let created = kategori::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("kategori {}", id)))?;
        tx.commit().await?;

        Ok(created)
    }

    pub async fn list(&self, identity: &Identity) -> AppResult<Vec<Kategori>> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;
        Ok(kategori::list(&mut *conn).await?)
    }

    pub async fn get(&self, identity: &Identity, id: i64) -> AppResult<Kategori> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;
        kategori::find(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("kategori {}", id)))
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: i64,
        req: KategoriEndring,
    ) -> AppResult<Kategori> {
        identity.require_admin()?;

        let mut tx = self.pool.begin().await?;
        let mut current = kategori::find(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("kategori {}", id)))?;

        if let Some(navn) = req.navn {
            let navn = validate_navn(&navn)?;
            if let Some(other) = kategori::find_by_navn(&mut *tx, &navn).await? {
                if other.id != id {
                    return Err(AppError::conflict(format!("kategori '{}' finnes allerede", navn)));
                }
            }
            current.navn = navn;
        }
        if let Some(vektkategori) = req.vektkategori {
            current.vektkategori = vektkategori;
        }

        kategori::update(&mut *tx, &current).await?;
        tx.commit().await?;
        Ok(current)
    }

    /// Existing tags and weights keep pointing at the deleted row.
    pub async fn delete(&self, identity: &Identity, id: i64) -> AppResult<()> {
        identity.require_admin()?;
        let mut conn = self.pool.acquire().await?;
        if !kategori::soft_delete(&mut *conn, id, Utc::now()).await? {
            return Err(AppError::not_found(format!("kategori {}", id)));
        }
        Ok(())
    }
}
