//! `utlysninger` table: offers of an ekstra henting to a partner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// Row filter (over alias `u`) for what a partner may see: its own, not
/// hidden, and either nobody has signed up or it is the signed-up row.
/// The caller appends `u.partner_id = ?`.
pub(crate) const VISIBLE_TO_PARTNER: &str = "u.slettet_tidspunkt IS NULL
     AND u.partner_skjult = 0
     AND (u.partner_pameldt IS NOT NULL OR NOT EXISTS (
         SELECT 1 FROM utlysninger a
         WHERE a.henting_id = u.henting_id
           AND a.partner_pameldt IS NOT NULL
           AND a.slettet_tidspunkt IS NULL))";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Utlysning {
    pub id: i64,
    pub partner_id: i64,
    pub henting_id: i64,
    pub partner_pameldt: Option<DateTime<Utc>>,
    pub stasjon_godkjent: Option<DateTime<Utc>>,
    pub partner_skjult: bool,
    pub partner_vist: bool,
    pub opprettet: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UtlysningFilter {
    pub partner_id: Option<i64>,
    pub henting_id: Option<i64>,
    pub pameldt: Option<bool>,
    /// Apply the partner visibility rule for this partner.
    pub synlig_for_partner: Option<i64>,
}

const SELECT_UTLYSNING: &str = "SELECT u.id, u.partner_id, u.henting_id, u.partner_pameldt,
     u.stasjon_godkjent, u.partner_skjult, u.partner_vist, u.opprettet
     FROM utlysninger u";

pub async fn insert(
    conn: &mut SqliteConnection,
    partner_id: i64,
    henting_id: i64,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO utlysninger (partner_id, henting_id, opprettet) VALUES (?, ?, ?)",
    )
    .bind(partner_id)
    .bind(henting_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Utlysning>, sqlx::Error> {
    sqlx::query_as::<_, Utlysning>(&format!(
        "{} WHERE u.id = ? AND u.slettet_tidspunkt IS NULL",
        SELECT_UTLYSNING
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list(
    conn: &mut SqliteConnection,
    filter: &UtlysningFilter,
) -> Result<Vec<Utlysning>, sqlx::Error> {
    let mut conditions = vec!["u.slettet_tidspunkt IS NULL"];
    if filter.partner_id.is_some() {
        conditions.push("u.partner_id = ?");
    }
    if filter.henting_id.is_some() {
        conditions.push("u.henting_id = ?");
    }
    match filter.pameldt {
        Some(true) => conditions.push("u.partner_pameldt IS NOT NULL"),
        Some(false) => conditions.push("u.partner_pameldt IS NULL"),
        None => {}
    }
    if filter.synlig_for_partner.is_some() {
        conditions.push("u.partner_id = ?");
        conditions.push(VISIBLE_TO_PARTNER);
    }

    let sql = format!(
        "{} WHERE {} ORDER BY u.id ASC",
        SELECT_UTLYSNING,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, Utlysning>(&sql);
    if let Some(id) = filter.partner_id {
        q = q.bind(id);
    }
    if let Some(id) = filter.henting_id {
        q = q.bind(id);
    }
    if let Some(id) = filter.synlig_for_partner {
        q = q.bind(id);
    }
    q.fetch_all(&mut *conn).await
}

/// The live utlysning on this henting that a partner has signed up for.
pub async fn accepted_for_henting(
    conn: &mut SqliteConnection,
    henting_id: i64,
) -> Result<Option<Utlysning>, sqlx::Error> {
    sqlx::query_as::<_, Utlysning>(&format!(
        "{} WHERE u.henting_id = ? AND u.partner_pameldt IS NOT NULL
           AND u.slettet_tidspunkt IS NULL
         ORDER BY u.partner_pameldt ASC LIMIT 1",
        SELECT_UTLYSNING
    ))
    .bind(henting_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Persist the four state fields.
pub async fn update_state(
    conn: &mut SqliteConnection,
    utlysning: &Utlysning,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE utlysninger
         SET partner_pameldt = ?, stasjon_godkjent = ?, partner_skjult = ?, partner_vist = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(utlysning.partner_pameldt)
    .bind(utlysning.stasjon_godkjent)
    .bind(utlysning.partner_skjult)
    .bind(utlysning.partner_vist)
    .bind(utlysning.id)
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
        "UPDATE utlysninger SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn soft_delete_for_henting(
    conn: &mut SqliteConnection,
    henting_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE utlysninger SET slettet_tidspunkt = ?
         WHERE henting_id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(henting_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Withdraws every live offer made to a partner, accepted ones included.
pub async fn soft_delete_for_partner(
    conn: &mut SqliteConnection,
    partner_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE utlysninger SET slettet_tidspunkt = ?
         WHERE partner_id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(partner_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
