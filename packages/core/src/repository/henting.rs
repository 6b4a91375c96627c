//! `henteplaner`, `planlagte_hentinger` and `ekstra_hentinger` with their
//! category link tables.
//!
//! A henteplan is the recurring agreement between a partner and a station;
//! its planlagte hentinger are generated rows, one per pickup window.
//! Ekstra hentinger are one-off pickups offered to partners via utlysninger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection};

use super::utlysning::{Utlysning, VISIBLE_TO_PARTNER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Frekvens {
    Enkelt,
    Ukentlig,
    Annenhver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum HentingType {
    Planlagt,
    Ekstra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HenteplanKategori {
    pub kategori_id: i64,
    pub merknad: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Henteplan {
    pub id: i64,
    pub partner_id: i64,
    pub stasjon_id: i64,
    pub frekvens: Frekvens,
    pub start_tidspunkt: DateTime<Utc>,
    pub slutt_tidspunkt: DateTime<Utc>,
    pub ukedag: Option<u32>,
    pub merknad: Option<String>,
    pub kategorier: Vec<HenteplanKategori>,
}

impl<'r> FromRow<'r, SqliteRow> for Henteplan {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            partner_id: row.try_get("partner_id")?,
            stasjon_id: row.try_get("stasjon_id")?,
            frekvens: row.try_get("frekvens")?,
            start_tidspunkt: row.try_get("start_tidspunkt")?,
            slutt_tidspunkt: row.try_get("slutt_tidspunkt")?,
            ukedag: row.try_get("ukedag")?,
            merknad: row.try_get("merknad")?,
            kategorier: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlanlagtHenting {
    pub id: i64,
    pub henteplan_id: i64,
    pub start_tidspunkt: DateTime<Utc>,
    pub slutt_tidspunkt: DateTime<Utc>,
    pub merknad: Option<String>,
    pub avlyst: Option<DateTime<Utc>>,
    pub aarsak: Option<String>,
    pub partner_id: i64,
    pub stasjon_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EkstraHentingKategori {
    pub kategori_id: i64,
    pub mengde: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EkstraHenting {
    pub id: i64,
    pub stasjon_id: i64,
    pub start_tidspunkt: DateTime<Utc>,
    pub slutt_tidspunkt: DateTime<Utc>,
    pub merknad: Option<String>,
    pub kategorier: Vec<EkstraHentingKategori>,
    /// The utlysning a partner has signed up for, if any.
    pub godkjent_utlysning: Option<Utlysning>,
    /// All offers; only filled for admin and station callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utlysninger: Option<Vec<Utlysning>>,
}

impl<'r> FromRow<'r, SqliteRow> for EkstraHenting {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            stasjon_id: row.try_get("stasjon_id")?,
            start_tidspunkt: row.try_get("start_tidspunkt")?,
            slutt_tidspunkt: row.try_get("slutt_tidspunkt")?,
            merknad: row.try_get("merknad")?,
            kategorier: Vec::new(),
            godkjent_utlysning: None,
            utlysninger: None,
        })
    }
}

/// What weight registration needs to know about a henting of either kind.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HentingRef {
    pub stasjon_id: i64,
    /// Plan partner (planlagt) or the signed-up partner (ekstra).
    pub partner_id: Option<i64>,
    pub start_tidspunkt: DateTime<Utc>,
    pub avlyst: bool,
}

// ---- Henteplan ----

const SELECT_HENTEPLAN: &str = "SELECT id, partner_id, stasjon_id, frekvens, start_tidspunkt,
     slutt_tidspunkt, ukedag, merknad FROM henteplaner";

pub async fn insert_henteplan(
    conn: &mut SqliteConnection,
    plan: &Henteplan,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO henteplaner
         (partner_id, stasjon_id, frekvens, start_tidspunkt, slutt_tidspunkt, ukedag, merknad, opprettet)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(plan.partner_id)
    .bind(plan.stasjon_id)
    .bind(plan.frekvens)
    .bind(plan.start_tidspunkt)
    .bind(plan.slutt_tidspunkt)
    .bind(plan.ukedag)
    .bind(&plan.merknad)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    replace_henteplan_kategorier(conn, id, &plan.kategorier).await?;
    Ok(id)
}

pub async fn replace_henteplan_kategorier(
    conn: &mut SqliteConnection,
    henteplan_id: i64,
    kategorier: &[HenteplanKategori],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM henteplan_kategorier WHERE henteplan_id = ?")
        .bind(henteplan_id)
        .execute(&mut *conn)
        .await?;

    for kategori in kategorier {
        sqlx::query(
            "INSERT INTO henteplan_kategorier (henteplan_id, kategori_id, merknad) VALUES (?, ?, ?)",
        )
        .bind(henteplan_id)
        .bind(kategori.kategori_id)
        .bind(&kategori.merknad)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn henteplan_kategorier(
    conn: &mut SqliteConnection,
    henteplan_id: i64,
) -> Result<Vec<HenteplanKategori>, sqlx::Error> {
    sqlx::query_as::<_, HenteplanKategori>(
        "SELECT kategori_id, merknad FROM henteplan_kategorier
         WHERE henteplan_id = ? ORDER BY kategori_id ASC",
    )
    .bind(henteplan_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn find_henteplan(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Henteplan>, sqlx::Error> {
    let plan = sqlx::query_as::<_, Henteplan>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_HENTEPLAN
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match plan {
        Some(mut plan) => {
            plan.kategorier = henteplan_kategorier(conn, plan.id).await?;
            Ok(Some(plan))
        }
        None => Ok(None),
    }
}

pub async fn list_henteplaner(
    conn: &mut SqliteConnection,
    partner_id: Option<i64>,
    stasjon_id: Option<i64>,
) -> Result<Vec<Henteplan>, sqlx::Error> {
    let mut conditions = vec!["slettet_tidspunkt IS NULL"];
    if partner_id.is_some() {
        conditions.push("partner_id = ?");
    }
    if stasjon_id.is_some() {
        conditions.push("stasjon_id = ?");
    }

    let sql = format!(
        "{} WHERE {} ORDER BY start_tidspunkt ASC, id ASC",
        SELECT_HENTEPLAN,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, Henteplan>(&sql);
    if let Some(id) = partner_id {
        q = q.bind(id);
    }
    if let Some(id) = stasjon_id {
        q = q.bind(id);
    }
    let mut plans = q.fetch_all(&mut *conn).await?;

    for plan in &mut plans {
        plan.kategorier = henteplan_kategorier(conn, plan.id).await?;
    }
    Ok(plans)
}

/// Persist `slutt_tidspunkt` and `merknad`; the schedule itself is immutable.
pub async fn update_henteplan(
    conn: &mut SqliteConnection,
    plan: &Henteplan,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE henteplaner SET slutt_tidspunkt = ?, merknad = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(plan.slutt_tidspunkt)
    .bind(&plan.merknad)
    .bind(plan.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Soft-delete a plan and its hentinger that start after `now`.
pub async fn soft_delete_henteplan(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE henteplaner SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    soft_delete_planlagte_starting_after(conn, id, now, now).await?;
    Ok(true)
}

/// Soft-delete every plan owned by a partner (`partner_id`) or station
/// (`stasjon_id`), cascading to their future hentinger.
pub async fn soft_delete_henteplaner_for(
    conn: &mut SqliteConnection,
    owner: PlanOwner,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let (column, owner_id) = match owner {
        PlanOwner::Partner(id) => ("partner_id", id),
        PlanOwner::Stasjon(id) => ("stasjon_id", id),
    };

    let ids: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT id FROM henteplaner WHERE {} = ? AND slettet_tidspunkt IS NULL",
        column
    ))
    .bind(owner_id)
    .fetch_all(&mut *conn)
    .await?;

    for id in &ids {
        soft_delete_henteplan(conn, *id, now).await?;
    }
    Ok(ids.len() as u64)
}

#[derive(Debug, Clone, Copy)]
pub enum PlanOwner {
    Partner(i64),
    Stasjon(i64),
}

// ---- PlanlagtHenting ----

const SELECT_PLANLAGT: &str = "SELECT ph.id, ph.henteplan_id, ph.start_tidspunkt, ph.slutt_tidspunkt,
     ph.merknad, ph.avlyst, ph.aarsak, hp.partner_id, hp.stasjon_id
     FROM planlagte_hentinger ph
     JOIN henteplaner hp ON hp.id = ph.henteplan_id";

#[derive(Debug, Clone, Default)]
pub struct PlanlagtFilter {
    pub henteplan_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub stasjon_id: Option<i64>,
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
}

pub async fn insert_planlagte(
    conn: &mut SqliteConnection,
    henteplan_id: i64,
    windows: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Result<u64, sqlx::Error> {
    for (start, slutt) in windows {
        sqlx::query(
            "INSERT INTO planlagte_hentinger (henteplan_id, start_tidspunkt, slutt_tidspunkt)
             VALUES (?, ?, ?)",
        )
        .bind(henteplan_id)
        .bind(start)
        .bind(slutt)
        .execute(&mut *conn)
        .await?;
    }
    Ok(windows.len() as u64)
}

pub async fn find_planlagt(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<PlanlagtHenting>, sqlx::Error> {
    sqlx::query_as::<_, PlanlagtHenting>(&format!(
        "{} WHERE ph.id = ? AND ph.slettet_tidspunkt IS NULL",
        SELECT_PLANLAGT
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_planlagte(
    conn: &mut SqliteConnection,
    filter: &PlanlagtFilter,
) -> Result<Vec<PlanlagtHenting>, sqlx::Error> {
    let mut conditions = vec!["ph.slettet_tidspunkt IS NULL"];
    if filter.henteplan_id.is_some() {
        conditions.push("ph.henteplan_id = ?");
    }
    if filter.partner_id.is_some() {
        conditions.push("hp.partner_id = ?");
    }
    if filter.stasjon_id.is_some() {
        conditions.push("hp.stasjon_id = ?");
    }
    if filter.fra.is_some() {
        conditions.push("ph.start_tidspunkt >= ?");
    }
    if filter.til.is_some() {
        conditions.push("ph.start_tidspunkt < ?");
    }

    let sql = format!(
        "{} WHERE {} ORDER BY ph.start_tidspunkt ASC, ph.id ASC",
        SELECT_PLANLAGT,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, PlanlagtHenting>(&sql);
    if let Some(id) = filter.henteplan_id {
        q = q.bind(id);
    }
    if let Some(id) = filter.partner_id {
        q = q.bind(id);
    }
    if let Some(id) = filter.stasjon_id {
        q = q.bind(id);
    }
    if let Some(fra) = filter.fra {
        q = q.bind(fra);
    }
    if let Some(til) = filter.til {
        q = q.bind(til);
    }
    q.fetch_all(&mut *conn).await
}

/// Persist merknad and cancellation fields.
pub async fn update_planlagt(
    conn: &mut SqliteConnection,
    henting: &PlanlagtHenting,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE planlagte_hentinger SET merknad = ?, avlyst = ?, aarsak = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(&henting.merknad)
    .bind(henting.avlyst)
    .bind(&henting.aarsak)
    .bind(henting.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_planlagt_slutt(
    conn: &mut SqliteConnection,
    id: i64,
    slutt: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE planlagte_hentinger SET slutt_tidspunkt = ? WHERE id = ?")
        .bind(slutt)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn soft_delete_planlagte_starting_after(
    conn: &mut SqliteConnection,
    henteplan_id: i64,
    after: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE planlagte_hentinger SET slettet_tidspunkt = ?
         WHERE henteplan_id = ? AND start_tidspunkt > ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(henteplan_id)
    .bind(after)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn latest_planlagt_start(
    conn: &mut SqliteConnection,
    henteplan_id: i64,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT start_tidspunkt FROM planlagte_hentinger
         WHERE henteplan_id = ? AND slettet_tidspunkt IS NULL
         ORDER BY start_tidspunkt DESC LIMIT 1",
    )
    .bind(henteplan_id)
    .fetch_optional(&mut *conn)
    .await
}

// ---- EkstraHenting ----

const SELECT_EKSTRA: &str =
    "SELECT id, stasjon_id, start_tidspunkt, slutt_tidspunkt, merknad FROM ekstra_hentinger";

#[derive(Debug, Clone, Default)]
pub struct EkstraFilter {
    pub stasjon_id: Option<i64>,
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
    /// Restrict to hentinger with an utlysning visible to this partner.
    pub synlig_for_partner: Option<i64>,
}

pub async fn insert_ekstra(
    conn: &mut SqliteConnection,
    henting: &EkstraHenting,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO ekstra_hentinger (stasjon_id, start_tidspunkt, slutt_tidspunkt, merknad, opprettet)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(henting.stasjon_id)
    .bind(henting.start_tidspunkt)
    .bind(henting.slutt_tidspunkt)
    .bind(&henting.merknad)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    replace_ekstra_kategorier(conn, id, &henting.kategorier).await?;
    Ok(id)
}

pub async fn replace_ekstra_kategorier(
    conn: &mut SqliteConnection,
    henting_id: i64,
    kategorier: &[EkstraHentingKategori],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM ekstra_henting_kategorier WHERE ekstra_henting_id = ?")
        .bind(henting_id)
        .execute(&mut *conn)
        .await?;

    for kategori in kategorier {
        sqlx::query(
            "INSERT INTO ekstra_henting_kategorier (ekstra_henting_id, kategori_id, mengde)
             VALUES (?, ?, ?)",
        )
        .bind(henting_id)
        .bind(kategori.kategori_id)
        .bind(kategori.mengde)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn ekstra_kategorier(
    conn: &mut SqliteConnection,
    henting_id: i64,
) -> Result<Vec<EkstraHentingKategori>, sqlx::Error> {
    sqlx::query_as::<_, EkstraHentingKategori>(
        "SELECT kategori_id, mengde FROM ekstra_henting_kategorier
         WHERE ekstra_henting_id = ? ORDER BY kategori_id ASC",
    )
    .bind(henting_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn find_ekstra(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<EkstraHenting>, sqlx::Error> {
    let henting = sqlx::query_as::<_, EkstraHenting>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_EKSTRA
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match henting {
        Some(mut henting) => {
            henting.kategorier = ekstra_kategorier(conn, henting.id).await?;
            Ok(Some(henting))
        }
        None => Ok(None),
    }
}

pub async fn list_ekstra(
    conn: &mut SqliteConnection,
    filter: &EkstraFilter,
) -> Result<Vec<EkstraHenting>, sqlx::Error> {
    let visible = format!(
        "id IN (SELECT u.henting_id FROM utlysninger u WHERE u.partner_id = ? AND {})",
        VISIBLE_TO_PARTNER
    );

    let mut conditions = vec!["slettet_tidspunkt IS NULL"];
    if filter.stasjon_id.is_some() {
        conditions.push("stasjon_id = ?");
    }
    if filter.fra.is_some() {
        conditions.push("start_tidspunkt >= ?");
    }
    if filter.til.is_some() {
        conditions.push("start_tidspunkt < ?");
    }
    if filter.synlig_for_partner.is_some() {
        conditions.push(&visible);
    }

    let sql = format!(
        "{} WHERE {} ORDER BY start_tidspunkt ASC, id ASC",
        SELECT_EKSTRA,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, EkstraHenting>(&sql);
    if let Some(id) = filter.stasjon_id {
        q = q.bind(id);
    }
    if let Some(fra) = filter.fra {
        q = q.bind(fra);
    }
    if let Some(til) = filter.til {
        q = q.bind(til);
    }
    if let Some(partner_id) = filter.synlig_for_partner {
        q = q.bind(partner_id);
    }
    let mut hentinger = q.fetch_all(&mut *conn).await?;

    for henting in &mut hentinger {
        henting.kategorier = ekstra_kategorier(conn, henting.id).await?;
    }
    Ok(hentinger)
}

pub async fn update_ekstra(
    conn: &mut SqliteConnection,
    henting: &EkstraHenting,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE ekstra_hentinger SET start_tidspunkt = ?, slutt_tidspunkt = ?, merknad = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(henting.start_tidspunkt)
    .bind(henting.slutt_tidspunkt)
    .bind(&henting.merknad)
    .bind(henting.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }
    replace_ekstra_kategorier(conn, henting.id, &henting.kategorier).await?;
    Ok(true)
}

pub async fn soft_delete_ekstra(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE ekstra_hentinger SET slettet_tidspunkt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn ekstra_ids_for_stasjon(
    conn: &mut SqliteConnection,
    stasjon_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM ekstra_hentinger WHERE stasjon_id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(stasjon_id)
    .fetch_all(&mut *conn)
    .await
}

// ---- Either kind ----

pub async fn henting_ref(
    conn: &mut SqliteConnection,
    henting_type: HentingType,
    id: i64,
) -> Result<Option<HentingRef>, sqlx::Error> {
    let sql = match henting_type {
        HentingType::Planlagt => {
            "SELECT hp.stasjon_id, hp.partner_id, ph.start_tidspunkt,
                    (ph.avlyst IS NOT NULL) AS avlyst
             FROM planlagte_hentinger ph
             JOIN henteplaner hp ON hp.id = ph.henteplan_id
             WHERE ph.id = ? AND ph.slettet_tidspunkt IS NULL"
        }
        HentingType::Ekstra => {
            "SELECT eh.stasjon_id,
                    (SELECT u.partner_id FROM utlysninger u
                     WHERE u.henting_id = eh.id AND u.partner_pameldt IS NOT NULL
                       AND u.slettet_tidspunkt IS NULL
                     LIMIT 1) AS partner_id,
                    eh.start_tidspunkt,
                    0 AS avlyst
             FROM ekstra_hentinger eh
             WHERE eh.id = ? AND eh.slettet_tidspunkt IS NULL"
        }
    };

    sqlx::query_as::<_, HentingRef>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}
