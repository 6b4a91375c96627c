//! `kontakter` and `verifiseringer` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// Contact person for a partner or a station (exactly one of the two).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Kontakt {
    pub id: i64,
    pub navn: String,
    pub telefon: String,
    pub epost: String,
    pub rolle: Option<String>,
    pub partner_id: Option<i64>,
    pub stasjon_id: Option<i64>,
    pub opprettet: DateTime<Utc>,
}

/// Pending codes and verified flags for one contact. Never serialized.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Verifisering {
    pub kontakt_id: i64,
    pub telefon_kode: Option<String>,
    pub epost_kode: Option<String>,
    pub telefon_verifisert: bool,
    pub epost_verifisert: bool,
}

const SELECT_KONTAKT: &str = "SELECT id, navn, telefon, epost, rolle, partner_id, stasjon_id, opprettet
     FROM kontakter";

pub async fn insert(conn: &mut SqliteConnection, kontakt: &Kontakt) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO kontakter (navn, telefon, epost, rolle, partner_id, stasjon_id, opprettet)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&kontakt.navn)
    .bind(&kontakt.telefon)
    .bind(&kontakt.epost)
    .bind(&kontakt.rolle)
    .bind(kontakt.partner_id)
    .bind(kontakt.stasjon_id)
    .bind(kontakt.opprettet)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Kontakt>, sqlx::Error> {
    sqlx::query_as::<_, Kontakt>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_KONTAKT
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list(
    conn: &mut SqliteConnection,
    partner_id: Option<i64>,
    stasjon_id: Option<i64>,
) -> Result<Vec<Kontakt>, sqlx::Error> {
    let mut conditions = vec!["slettet_tidspunkt IS NULL"];
    if partner_id.is_some() {
        conditions.push("partner_id = ?");
    }
    if stasjon_id.is_some() {
        conditions.push("stasjon_id = ?");
    }

    let sql = format!(
        "{} WHERE {} ORDER BY id ASC",
        SELECT_KONTAKT,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, Kontakt>(&sql);
    if let Some(id) = partner_id {
        q = q.bind(id);
    }
    if let Some(id) = stasjon_id {
        q = q.bind(id);
    }
    q.fetch_all(&mut *conn).await
}

pub async fn update(conn: &mut SqliteConnection, kontakt: &Kontakt) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE kontakter SET navn = ?, telefon = ?, epost = ?, rolle = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(&kontakt.navn)
    .bind(&kontakt.telefon)
    .bind(&kontakt.epost)
    .bind(&kontakt.rolle)
    .bind(kontakt.id)
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
        "UPDATE kontakter SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Soft-delete all contacts of a partner. Returns the number of rows touched.
pub async fn soft_delete_for_partner(
    conn: &mut SqliteConnection,
    partner_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE kontakter SET slettet_tidspunkt = ?
         WHERE partner_id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(partner_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn soft_delete_for_stasjon(
    conn: &mut SqliteConnection,
    stasjon_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE kontakter SET slettet_tidspunkt = ?
         WHERE stasjon_id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(stasjon_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// ---- Verifisering ----

pub async fn insert_verifisering(
    conn: &mut SqliteConnection,
    verifisering: &Verifisering,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO verifiseringer
         (kontakt_id, telefon_kode, epost_kode, telefon_verifisert, epost_verifisert)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(verifisering.kontakt_id)
    .bind(&verifisering.telefon_kode)
    .bind(&verifisering.epost_kode)
    .bind(verifisering.telefon_verifisert)
    .bind(verifisering.epost_verifisert)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn find_verifisering(
    conn: &mut SqliteConnection,
    kontakt_id: i64,
) -> Result<Option<Verifisering>, sqlx::Error> {
    sqlx::query_as::<_, Verifisering>(
        "SELECT kontakt_id, telefon_kode, epost_kode, telefon_verifisert, epost_verifisert
         FROM verifiseringer WHERE kontakt_id = ?",
    )
    .bind(kontakt_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn update_verifisering(
    conn: &mut SqliteConnection,
    verifisering: &Verifisering,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE verifiseringer
         SET telefon_kode = ?, epost_kode = ?, telefon_verifisert = ?, epost_verifisert = ?
         WHERE kontakt_id = ?",
    )
    .bind(&verifisering.telefon_kode)
    .bind(&verifisering.epost_kode)
    .bind(verifisering.telefon_verifisert)
    .bind(verifisering.epost_verifisert)
    .bind(verifisering.kontakt_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
