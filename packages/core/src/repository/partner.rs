//! `partnere` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::{contains_pattern, sok_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Storrelse {
    Liten,
    Middels,
    Stor,
}

impl Default for Storrelse {
    fn default() -> Self {
        Storrelse::Liten
    }
}

/// A reuse organization that collects from stations.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Partner {
    pub id: i64,
    pub navn: String,
    pub ideell: bool,
    pub storrelse: Storrelse,
    pub opprettet: DateTime<Utc>,
}

const SELECT_PARTNER: &str = "SELECT id, navn, ideell, storrelse, opprettet FROM partnere";

pub async fn insert(
    conn: &mut SqliteConnection,
    navn: &str,
    ideell: bool,
    storrelse: Storrelse,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO partnere (navn, navn_sok, ideell, storrelse, opprettet) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(navn)
    .bind(sok_key(navn))
    .bind(ideell)
    .bind(storrelse)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Partner>, sqlx::Error> {
    sqlx::query_as::<_, Partner>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_PARTNER
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Live partner with exactly this name, compared case-insensitively.
pub async fn find_by_navn(
    conn: &mut SqliteConnection,
    navn: &str,
) -> Result<Option<Partner>, sqlx::Error> {
    sqlx::query_as::<_, Partner>(&format!(
        "{} WHERE navn_sok = ? AND slettet_tidspunkt IS NULL",
        SELECT_PARTNER
    ))
    .bind(sok_key(navn))
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list(
    conn: &mut SqliteConnection,
    navn_filter: Option<&str>,
) -> Result<Vec<Partner>, sqlx::Error> {
    let mut conditions = vec!["slettet_tidspunkt IS NULL"];
    if navn_filter.is_some() {
        conditions.push("navn_sok LIKE ? ESCAPE '\\'");
    }

    let sql = format!(
        "{} WHERE {} ORDER BY navn_sok ASC, id ASC",
        SELECT_PARTNER,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, Partner>(&sql);
    if let Some(navn) = navn_filter {
        q = q.bind(contains_pattern(navn));
    }
    q.fetch_all(&mut *conn).await
}

/// Returns `true` if a live row was updated.
pub async fn update(conn: &mut SqliteConnection, partner: &Partner) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE partnere SET navn = ?, navn_sok = ?, ideell = ?, storrelse = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(&partner.navn)
    .bind(sok_key(&partner.navn))
    .bind(partner.ideell)
    .bind(partner.storrelse)
    .bind(partner.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns `true` if a live row was soft-deleted.
pub async fn soft_delete(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE partnere SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}
