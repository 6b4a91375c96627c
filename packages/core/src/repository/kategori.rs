//! `kategorier` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::sok_key;

/// A waste/reuse category. Only weight categories accept weight registrations.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Kategori {
    pub id: i64,
    pub navn: String,
    pub vektkategori: bool,
    pub opprettet: DateTime<Utc>,
}

const SELECT_KATEGORI: &str = "SELECT id, navn, vektkategori, opprettet FROM kategorier";

pub async fn insert(
    conn: &mut SqliteConnection,
    navn: &str,
    vektkategori: bool,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO kategorier (navn, navn_sok, vektkategori, opprettet) VALUES (?, ?, ?, ?)",
    )
    .bind(navn)
    .bind(sok_key(navn))
    .bind(vektkategori)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Kategori>, sqlx::Error> {
    sqlx::query_as::<_, Kategori>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_KATEGORI
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn find_by_navn(
    conn: &mut SqliteConnection,
    navn: &str,
) -> Result<Option<Kategori>, sqlx::Error> {
    sqlx::query_as::<_, Kategori>(&format!(
        "{} WHERE navn_sok = ? AND slettet_tidspunkt IS NULL",
        SELECT_KATEGORI
    ))
    .bind(sok_key(navn))
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Kategori>, sqlx::Error> {
    sqlx::query_as::<_, Kategori>(&format!(
        "{} WHERE slettet_tidspunkt IS NULL ORDER BY navn_sok ASC, id ASC",
        SELECT_KATEGORI
    ))
    .fetch_all(&mut *conn)
    .await
}

pub async fn update(conn: &mut SqliteConnection, kategori: &Kategori) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE kategorier SET navn = ?, navn_sok = ?, vektkategori = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(&kategori.navn)
    .bind(sok_key(&kategori.navn))
    .bind(kategori.vektkategori)
    .bind(kategori.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn soft_delete(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE kategorier SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    #[tokio::test]
    async fn list_is_sorted_and_skips_deleted() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let moebler = insert(&mut conn, "Møbler", true, Utc::now()).await.unwrap();
        insert(&mut conn, "Bøker", true, Utc::now()).await.unwrap();
        insert(&mut conn, "Annet", false, Utc::now()).await.unwrap();
        soft_delete(&mut conn, moebler, Utc::now()).await.unwrap();

        let names: Vec<_> = list(&mut conn)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.navn)
            .collect();
        assert_eq!(names, vec!["Annet", "Bøker"]);
    }

    #[tokio::test]
    async fn vektkategori_flag_roundtrips() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let id = insert(&mut conn, "Diverse", false, Utc::now()).await.unwrap();

        let kategori = find(&mut conn, id).await.unwrap().unwrap();
        assert!(!kategori.vektkategori);
    }
}
