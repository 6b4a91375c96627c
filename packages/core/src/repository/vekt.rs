//! `vektregistreringer` table and the weight report aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::henting::HentingType;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vektregistrering {
    pub id: i64,
    pub henting_type: HentingType,
    pub henting_id: i64,
    pub kategori_id: i64,
    /// Kilograms.
    pub vekt: f64,
    pub registrert_tidspunkt: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct VektFilter {
    pub henting_type: Option<HentingType>,
    pub henting_id: Option<i64>,
    pub kategori_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct RapportFilter {
    pub stasjon_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
}

/// One line of the weight report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KategoriSum {
    pub kategori_id: i64,
    pub kategori_navn: String,
    pub vekt_kg: f64,
    pub antall: i64,
}

const SELECT_VEKT: &str = "SELECT id, henting_type, henting_id, kategori_id, vekt, registrert_tidspunkt
     FROM vektregistreringer";

pub async fn insert(
    conn: &mut SqliteConnection,
    registrering: &Vektregistrering,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO vektregistreringer
         (henting_type, henting_id, kategori_id, vekt, registrert_tidspunkt)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(registrering.henting_type)
    .bind(registrering.henting_id)
    .bind(registrering.kategori_id)
    .bind(registrering.vekt)
    .bind(registrering.registrert_tidspunkt)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Vektregistrering>, sqlx::Error> {
    sqlx::query_as::<_, Vektregistrering>(&format!(
        "{} WHERE id = ? AND slettet_tidspunkt IS NULL",
        SELECT_VEKT
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list(
    conn: &mut SqliteConnection,
    filter: &VektFilter,
) -> Result<Vec<Vektregistrering>, sqlx::Error> {
    let mut conditions = vec!["slettet_tidspunkt IS NULL"];
    if filter.henting_type.is_some() {
        conditions.push("henting_type = ?");
    }
    if filter.henting_id.is_some() {
        conditions.push("henting_id = ?");
    }
    if filter.kategori_id.is_some() {
        conditions.push("kategori_id = ?");
    }

    let sql = format!(
        "{} WHERE {} ORDER BY registrert_tidspunkt ASC, id ASC",
        SELECT_VEKT,
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, Vektregistrering>(&sql);
    if let Some(t) = filter.henting_type {
        q = q.bind(t);
    }
    if let Some(id) = filter.henting_id {
        q = q.bind(id);
    }
    if let Some(id) = filter.kategori_id {
        q = q.bind(id);
    }
    q.fetch_all(&mut *conn).await
}

pub async fn update_vekt(
    conn: &mut SqliteConnection,
    id: i64,
    vekt: f64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE vektregistreringer SET vekt = ? WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(vekt)
    .bind(id)
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
        "UPDATE vektregistreringer SET slettet_tidspunkt = ?
         WHERE id = ? AND slettet_tidspunkt IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Summed kilograms per kategori, heaviest first.
///
/// A registration belongs to a station through its henting, and to a
/// partner through the henteplan (planlagt) or the signed-up utlysning
/// (ekstra). Deleted kategorier still report under their name.
pub async fn rapport(
    conn: &mut SqliteConnection,
    filter: &RapportFilter,
) -> Result<Vec<KategoriSum>, sqlx::Error> {
    let mut conditions = vec!["v.slettet_tidspunkt IS NULL"];
    if filter.stasjon_id.is_some() {
        conditions.push("COALESCE(hp.stasjon_id, eh.stasjon_id) = ?");
    }
    if filter.partner_id.is_some() {
        conditions.push(
            "(hp.partner_id = ? OR (eh.id IS NOT NULL AND EXISTS (
                SELECT 1 FROM utlysninger u
                WHERE u.henting_id = eh.id AND u.partner_id = ?
                  AND u.partner_pameldt IS NOT NULL AND u.slettet_tidspunkt IS NULL)))",
        );
    }
    if filter.fra.is_some() {
        conditions.push("v.registrert_tidspunkt >= ?");
    }
    if filter.til.is_some() {
        conditions.push("v.registrert_tidspunkt < ?");
    }

    let sql = format!(
        "SELECT v.kategori_id, k.navn AS kategori_navn,
                TOTAL(v.vekt) AS vekt_kg, COUNT(*) AS antall
         FROM vektregistreringer v
         JOIN kategorier k ON k.id = v.kategori_id
         LEFT JOIN planlagte_hentinger ph
                ON v.henting_type = 'PLANLAGT' AND ph.id = v.henting_id
         LEFT JOIN henteplaner hp ON hp.id = ph.henteplan_id
         LEFT JOIN ekstra_hentinger eh
                ON v.henting_type = 'EKSTRA' AND eh.id = v.henting_id
         WHERE {}
         GROUP BY v.kategori_id, k.navn
         ORDER BY vekt_kg DESC, v.kategori_id ASC",
        conditions.join(" AND ")
    );

    let mut q = sqlx::query_as::<_, KategoriSum>(&sql);
    if let Some(id) = filter.stasjon_id {
        q = q.bind(id);
    }
    if let Some(id) = filter.partner_id {
        q = q.bind(id).bind(id);
    }
    if let Some(fra) = filter.fra {
        q = q.bind(fra);
    }
    if let Some(til) = filter.til {
        q = q.bind(til);
    }
    q.fetch_all(&mut *conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::db::create_pool;
    use crate::repository::henting::{self, EkstraHenting, Frekvens, Henteplan};
    use crate::repository::{kategori, partner, stasjon, utlysning};

    struct Seeded {
        partner_id: i64,
        other_partner_id: i64,
        stasjon_id: i64,
        planlagt_id: i64,
        ekstra_id: i64,
        moebler: i64,
        boeker: i64,
    }

    async fn seed(conn: &mut SqliteConnection) -> Seeded {
        let now = Utc::now();
        let partner_id = partner::insert(conn, "Fretex", true, partner::Storrelse::Liten, now)
            .await
            .unwrap();
        let other_partner_id =
            partner::insert(conn, "Kirkens Bymisjon", true, partner::Storrelse::Liten, now)
                .await
                .unwrap();
        let stasjon_id = stasjon::insert(conn, "Haraldrud", stasjon::Stasjonstype::Gjenbruk, now)
            .await
            .unwrap();
        let moebler = kategori::insert(conn, "Møbler", true, now).await.unwrap();
        let boeker = kategori::insert(conn, "Bøker", true, now).await.unwrap();

        let start = now - Duration::days(1);
        let plan = Henteplan {
            id: 0,
            partner_id,
            stasjon_id,
            frekvens: Frekvens::Enkelt,
            start_tidspunkt: start,
            slutt_tidspunkt: start + Duration::hours(1),
            ukedag: None,
            merknad: None,
            kategorier: Vec::new(),
        };
        let plan_id = henting::insert_henteplan(conn, &plan, now).await.unwrap();
        henting::insert_planlagte(conn, plan_id, &[(start, start + Duration::hours(1))])
            .await
            .unwrap();
        let planlagt_id = henting::list_planlagte(conn, &Default::default())
            .await
            .unwrap()[0]
            .id;

        let ekstra = EkstraHenting {
            id: 0,
            stasjon_id,
            start_tidspunkt: start,
            slutt_tidspunkt: start + Duration::hours(1),
            merknad: None,
            kategorier: Vec::new(),
            godkjent_utlysning: None,
            utlysninger: None,
        };
        let ekstra_id = henting::insert_ekstra(conn, &ekstra, now).await.unwrap();
        let u = utlysning::insert(conn, other_partner_id, ekstra_id, now)
            .await
            .unwrap();
        let mut u = utlysning::find(conn, u).await.unwrap().unwrap();
        u.partner_pameldt = Some(now);
        utlysning::update_state(conn, &u).await.unwrap();

        Seeded {
            partner_id,
            other_partner_id,
            stasjon_id,
            planlagt_id,
            ekstra_id,
            moebler,
            boeker,
        }
    }

    fn registrering(henting_type: HentingType, henting_id: i64, kategori_id: i64, vekt: f64) -> Vektregistrering {
        Vektregistrering {
            id: 0,
            henting_type,
            henting_id,
            kategori_id,
            vekt,
            registrert_tidspunkt: Utc::now(),
        }
    }

    #[tokio::test]
    async fn non_positive_weight_violates_check() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let s = seed(&mut conn).await;

        let r = registrering(HentingType::Planlagt, s.planlagt_id, s.moebler, 0.0);
        assert!(insert(&mut conn, &r).await.is_err());
    }

    #[tokio::test]
    async fn rapport_groups_sorts_and_attributes_partners() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let s = seed(&mut conn).await;

        for r in [
            registrering(HentingType::Planlagt, s.planlagt_id, s.moebler, 10.0),
            registrering(HentingType::Planlagt, s.planlagt_id, s.boeker, 2.5),
            registrering(HentingType::Ekstra, s.ekstra_id, s.boeker, 30.0),
        ] {
            insert(&mut conn, &r).await.unwrap();
        }

        let all = rapport(&mut conn, &RapportFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kategori_id, s.boeker);
        assert_eq!(all[0].vekt_kg, 32.5);
        assert_eq!(all[0].antall, 2);

        let plan_partner = rapport(
            &mut conn,
            &RapportFilter {
                partner_id: Some(s.partner_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(plan_partner[0].kategori_id, s.moebler);
        assert_eq!(plan_partner[0].vekt_kg, 10.0);

        let ekstra_partner = rapport(
            &mut conn,
            &RapportFilter {
                partner_id: Some(s.other_partner_id),
                stasjon_id: Some(s.stasjon_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ekstra_partner.len(), 1);
        assert_eq!(ekstra_partner[0].vekt_kg, 30.0);
    }

    #[tokio::test]
    async fn rapport_respects_time_window_and_deletes() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let s = seed(&mut conn).await;

        let mut old = registrering(HentingType::Planlagt, s.planlagt_id, s.moebler, 5.0);
        old.registrert_tidspunkt = Utc::now() - Duration::days(10);
        insert(&mut conn, &old).await.unwrap();
        let gone = insert(
            &mut conn,
            &registrering(HentingType::Planlagt, s.planlagt_id, s.moebler, 7.0),
        )
        .await
        .unwrap();
        soft_delete(&mut conn, gone, Utc::now()).await.unwrap();

        let recent = rapport(
            &mut conn,
            &RapportFilter {
                fra: Some(Utc::now() - Duration::days(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(recent.is_empty());

        let everything = rapport(&mut conn, &RapportFilter::default()).await.unwrap();
        assert_eq!(everything[0].vekt_kg, 5.0);
    }
}
