//! `stasjoner` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::{contains_pattern, sok_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Stasjonstype {
    Gjenbruk,
    Mini,
}

impl Default for Stasjonstype {
    fn default() -> Self {
        Stasjonstype::Gjenbruk
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stasjon {
    pub id: i64,
    pub navn: String,
    pub stasjonstype: Stasjonstype,
    pub opprettet: DateTime<Utc>,
}

const SELECT_STASJON: &str = "SELECT id, navn, stasjonstype, opprettet FROM stasjoner";

pub async fn insert(
    conn: &mut SqliteConnection,
    navn: &str,
    stasjonstype: Stasjonstype,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO stasjoner (navn, navn_sok, stasjonstype, opprettet) VALUES (?, ?, ?, ?)",
    )
    .bind(navn)
    .bind(sok_key(navn))
    .bind(stasjonstype)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Stasjon>, sqlx::Error> {
    sqlx::query_as::<_, Stasjon>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_STASJON
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn find_by_navn(
    conn: &mut SqliteConnection,
    navn: &str,
) -> Result<Option<Stasjon>, sqlx::Error> {
    sqlx::query_as::<_, Stasjon>(&format!(
        "{} WHERE navn_sok = ? AND slettet_tidspunkt IS NULL",
        SELECT_STASJON
    ))
    .bind(sok_key(navn))
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list(
    conn: &mut SqliteConnection,
    navn_filter: Option<&str>,
) -> Result<Vec<Stasjon>, sqlx::Error> {
    let mut conditions = vec!["slettet_tidspunkt IS NULL"];
    if navn_filter.is_some() {
        conditions.push("navn_sok LIKE ? ESCAPE '\\'");
    }

    let sql = format!(
        "{} WHERE {} ORDER BY navn_sok ASC, id ASC",
        SELECT_STASJON,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, Stasjon>(&sql);
    if let Some(navn) = navn_filter {
        q = q.bind(contains_pattern(navn));
    }
    q.fetch_all(&mut *conn).await
}

pub async fn update(conn: &mut SqliteConnection, stasjon: &Stasjon) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE stasjoner SET navn = ?, navn_sok = ?, stasjonstype = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(&stasjon.navn)
    .bind(sok_key(&stasjon.navn))
    .bind(stasjon.stasjonstype)
    .bind(stasjon.id)
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
        "UPDATE stasjoner SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}
