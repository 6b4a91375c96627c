//! Henteplaner with their generated schedule, planlagte hentinger and
//! ekstra hentinger.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::repository::henting::{
    self, EkstraFilter, EkstraHenting, EkstraHentingKategori, Frekvens, Henteplan,
    HenteplanKategori, PlanlagtFilter, PlanlagtHenting,
};
use crate::repository::utlysning::{self, UtlysningFilter};
use crate::repository::{kategori, partner, stasjon};
use crate::services::scope_owner;

pub type Window = (DateTime<Utc>, DateTime<Utc>);

/// Pickup windows for a plan.
///
/// Each window uses the time of day of `start` and `slutt`. Weekly series
/// begin on the first `ukedag` (1 = Monday) on or after the start date and
/// end on the slutt date.
pub fn generate_windows(
    frekvens: Frekvens,
    start: DateTime<Utc>,
    slutt: DateTime<Utc>,
    ukedag: Option<u32>,
) -> AppResult<Vec<Window>> {
    if start >= slutt {
        return Err(AppError::validation(
            "start_tidspunkt må være før slutt_tidspunkt",
        ));
    }
    let latest = start
        .checked_add_months(Months::new(12))
        .ok_or_else(|| AppError::validation("ugyldig start_tidspunkt"))?;
    if slutt > latest {
        return Err(AppError::validation(
            "en henteplan kan ikke vare lenger enn ett år",
        ));
    }

    let (fra_tid, til_tid) = (start.time(), slutt.time());
    if til_tid <= fra_tid {
        return Err(AppError::validation("sluttid må være etter starttid"));
    }

    let step = match frekvens {
        Frekvens::Enkelt => {
            if start.date_naive() != slutt.date_naive() {
                return Err(AppError::validation(
                    "en enkelt henting må starte og slutte samme dag",
                ));
            }
            return Ok(vec![(start, slutt)]);
        }
        Frekvens::Ukentlig => 7,
        Frekvens::Annenhver => 14,
    };

    let ukedag = ukedag
        .filter(|d| (1..=7).contains(d))
        .ok_or_else(|| AppError::validation("ukedag må være mellom 1 og 7"))?;

    let first = start.date_naive();
    let offset = (ukedag + 7 - first.weekday().number_from_monday()) % 7;
    let mut date = first + Duration::days(offset as i64);
    let last = slutt.date_naive();

    let mut windows = Vec::new();
    while date <= last {
        windows.push((
            Utc.from_utc_datetime(&date.and_time(fra_tid)),
            Utc.from_utc_datetime(&date.and_time(til_tid)),
        ));
        date = date + Duration::days(step);
    }

    if windows.is_empty() {
        return Err(AppError::validation("ingen hentinger i perioden"));
    }
    Ok(windows)
}

#[derive(Debug, Deserialize)]
pub struct NyHenteplan {
    pub partner_id: i64,
    pub stasjon_id: i64,
    pub frekvens: Frekvens,
    pub start_tidspunkt: DateTime<Utc>,
    pub slutt_tidspunkt: DateTime<Utc>,
    pub ukedag: Option<u32>,
    pub merknad: Option<String>,
    #[serde(default)]
    pub kategorier: Vec<HenteplanKategori>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HenteplanEndring {
    pub slutt_tidspunkt: Option<DateTime<Utc>>,
    pub merknad: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HenteplanQuery {
    pub partner_id: Option<i64>,
    pub stasjon_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanlagtQuery {
    pub henteplan_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub stasjon_id: Option<i64>,
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanlagtEndring {
    pub avlys: Option<bool>,
    pub aarsak: Option<String>,
    pub merknad: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NyEkstraHenting {
    pub stasjon_id: i64,
    pub start_tidspunkt: DateTime<Utc>,
    pub slutt_tidspunkt: DateTime<Utc>,
    pub merknad: Option<String>,
    #[serde(default)]
    pub kategorier: Vec<EkstraHentingKategori>,
    /// Partners to offer the henting to right away.
    #[serde(default)]
    pub partnere: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EkstraEndring {
    pub start_tidspunkt: Option<DateTime<Utc>>,
    pub slutt_tidspunkt: Option<DateTime<Utc>>,
    pub merknad: Option<String>,
    pub kategorier: Option<Vec<EkstraHentingKategori>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EkstraQuery {
    pub stasjon_id: Option<i64>,
    pub fra: Option<DateTime<Utc>>,
    pub til: Option<DateTime<Utc>>,
}

async fn require_kategorier(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> AppResult<()> {
    let mut seen = HashSet::new();
    for &id in ids {
        if !seen.insert(id) {
            return Err(AppError::validation(format!("kategori {} er oppgitt flere ganger", id)));
        }
        if kategori::find(&mut *conn, id).await?.is_none() {
            return Err(AppError::validation(format!("ukjent kategori {}", id)));
        }
    }
    Ok(())
}

fn validate_mengder(kategorier: &[EkstraHentingKategori]) -> AppResult<()> {
    for k in kategorier {
        if let Some(mengde) = k.mengde {
            if !mengde.is_finite() || mengde <= 0.0 {
                return Err(AppError::validation("mengde må være større enn 0"));
            }
        }
    }
    Ok(())
}

fn owns_plan(identity: &Identity, partner_id: i64, stasjon_id: i64) -> bool {
    identity.is_admin() || identity.is_partner(partner_id) || identity.is_stasjon(stasjon_id)
}

#[derive(Clone)]
pub struct HentingService {
    pool: SqlitePool,
}

impl HentingService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---- Henteplan ----

    pub async fn create_henteplan(
        &self,
        identity: &Identity,
        req: NyHenteplan,
    ) -> AppResult<Henteplan> {
        identity.require_admin()?;
        let windows = generate_windows(
            req.frekvens,
            req.start_tidspunkt,
            req.slutt_tidspunkt,
            req.ukedag,
        )?;

        let mut tx = self.pool.begin().await?;
        if partner::find(&mut *tx, req.partner_id).await?.is_none() {
            return Err(AppError::validation(format!("ukjent partner {}", req.partner_id)));
        }
        if stasjon::find(&mut *tx, req.stasjon_id).await?.is_none() {
            return Err(AppError::validation(format!("ukjent stasjon {}", req.stasjon_id)));
        }
        let ids: Vec<i64> = req.kategorier.iter().map(|k| k.kategori_id).collect();
        require_kategorier(&mut *tx, &ids).await?;

        let plan = Henteplan {
            id: 0,
            partner_id: req.partner_id,
            stasjon_id: req.stasjon_id,
            frekvens: req.frekvens,
            start_tidspunkt: req.start_tidspunkt,
            slutt_tidspunkt: req.slutt_tidspunkt,
            ukedag: match req.frekvens {
                Frekvens::Enkelt => None,
                _ => req.ukedag,
            },
            merknad: req.merknad,
            kategorier: req.kategorier,
        };
        let id = henting::insert_henteplan(&mut *tx, &plan, Utc::now()).await?;
        let generated = henting::insert_planlagte(&mut *tx, id, &windows).await?;
        let created = henting::find_henteplan(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("henteplan {}", id)))?;
        tx.commit().await?;

        tracing::info!("Henteplan {} created with {} hentinger", id, generated);
        Ok(created)
    }

    pub async fn list_henteplaner(
        &self,
        identity: &Identity,
        query: HenteplanQuery,
    ) -> AppResult<Vec<Henteplan>> {
        let (partner_id, stasjon_id) = scope_owner(identity, query.partner_id, query.stasjon_id)?;
        let mut conn = self.pool.acquire().await?;
        Ok(henting::list_henteplaner(&mut *conn, partner_id, stasjon_id).await?)
    }

    pub async fn get_henteplan(&self, identity: &Identity, id: i64) -> AppResult<Henteplan> {
        let mut conn = self.pool.acquire().await?;
        let plan = henting::find_henteplan(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("henteplan {}", id)))?;
        if !owns_plan(identity, plan.partner_id, plan.stasjon_id) {
            return Err(AppError::forbidden("ingen tilgang til henteplan"));
        }
        Ok(plan)
    }

    /// A new slutt shortens or extends the generated series. For weekly
    /// plans only the date of the new slutt is used; the time of day stays.
    pub async fn update_henteplan(
        &self,
        identity: &Identity,
        id: i64,
        req: HenteplanEndring,
    ) -> AppResult<Henteplan> {
        identity.require_admin()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let mut plan = henting::find_henteplan(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("henteplan {}", id)))?;

        if let Some(requested) = req.slutt_tidspunkt {
            let slutt = match plan.frekvens {
                Frekvens::Enkelt => requested,
                _ => Utc.from_utc_datetime(
                    &requested
                        .date_naive()
                        .and_time(plan.slutt_tidspunkt.time()),
                ),
            };
            let windows = generate_windows(plan.frekvens, plan.start_tidspunkt, slutt, plan.ukedag)?;

            if plan.frekvens == Frekvens::Enkelt {
                let existing = henting::list_planlagte(
                    &mut *tx,
                    &PlanlagtFilter {
                        henteplan_id: Some(id),
                        ..Default::default()
                    },
                )
                .await?;
                for h in existing {
                    henting::update_planlagt_slutt(&mut *tx, h.id, slutt).await?;
                }
            } else {
                let removed =
                    henting::soft_delete_planlagte_starting_after(&mut *tx, id, slutt, now).await?;
                let latest = henting::latest_planlagt_start(&mut *tx, id).await?;
                let missing: Vec<Window> = windows
                    .into_iter()
                    .filter(|(start, _)| latest.map_or(true, |l| *start > l))
                    .collect();
                let added = henting::insert_planlagte(&mut *tx, id, &missing).await?;
                tracing::info!(
                    "Henteplan {} new slutt {}: {} hentinger removed, {} added",
                    id,
                    slutt,
                    removed,
                    added
                );
            }
            plan.slutt_tidspunkt = slutt;
        }
        if let Some(merknad) = req.merknad {
            plan.merknad = Some(merknad);
        }

        henting::update_henteplan(&mut *tx, &plan).await?;
        tx.commit().await?;
        Ok(plan)
    }

    pub async fn delete_henteplan(&self, identity: &Identity, id: i64) -> AppResult<()> {
        identity.require_admin()?;
        let mut tx = self.pool.begin().await?;
        if !henting::soft_delete_henteplan(&mut *tx, id, Utc::now()).await? {
            return Err(AppError::not_found(format!("henteplan {}", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- PlanlagtHenting ----

    pub async fn list_planlagte(
        &self,
        identity: &Identity,
        query: PlanlagtQuery,
    ) -> AppResult<Vec<PlanlagtHenting>> {
        let (partner_id, stasjon_id) = scope_owner(identity, query.partner_id, query.stasjon_id)?;
        let filter = PlanlagtFilter {
            henteplan_id: query.henteplan_id,
            partner_id,
            stasjon_id,
            fra: query.fra,
            til: query.til,
        };
        let mut conn = self.pool.acquire().await?;
        Ok(henting::list_planlagte(&mut *conn, &filter).await?)
    }

    pub async fn get_planlagt(&self, identity: &Identity, id: i64) -> AppResult<PlanlagtHenting> {
        let mut conn = self.pool.acquire().await?;
        let found = henting::find_planlagt(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("planlagt henting {}", id)))?;
        if !owns_plan(identity, found.partner_id, found.stasjon_id) {
            return Err(AppError::forbidden("ingen tilgang til henting"));
        }
        Ok(found)
    }

    pub async fn update_planlagt(
        &self,
        identity: &Identity,
        id: i64,
        req: PlanlagtEndring,
    ) -> AppResult<PlanlagtHenting> {
        let mut tx = self.pool.begin().await?;
        let mut found = henting::find_planlagt(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("planlagt henting {}", id)))?;
        if !owns_plan(identity, found.partner_id, found.stasjon_id) {
            return Err(AppError::forbidden("ingen tilgang til henting"));
        }

        match req.avlys {
            Some(true) => {
                let aarsak = req
                    .aarsak
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| AppError::validation("aarsak må oppgis ved avlysning"))?;
                found.avlyst = Some(Utc::now());
                found.aarsak = Some(aarsak);
                tracing::info!("Planlagt henting {} cancelled by {}", id, identity.subject);
            }
            Some(false) => {
                found.avlyst = None;
                found.aarsak = None;
            }
            None => {}
        }
        if let Some(merknad) = req.merknad {
            found.merknad = Some(merknad);
        }

        henting::update_planlagt(&mut *tx, &found).await?;
        tx.commit().await?;
        Ok(found)
    }

    // ---- EkstraHenting ----

    /// Attach the signed-up utlysning, and all offers for admin or station.
    async fn decorate(
        conn: &mut SqliteConnection,
        identity: &Identity,
        mut found: EkstraHenting,
    ) -> AppResult<EkstraHenting> {
        found.godkjent_utlysning = utlysning::accepted_for_henting(&mut *conn, found.id).await?;
        if identity.is_admin() || identity.is_stasjon(found.stasjon_id) {
            let filter = UtlysningFilter {
                henting_id: Some(found.id),
                ..Default::default()
            };
            found.utlysninger = Some(utlysning::list(&mut *conn, &filter).await?);
        }
        Ok(found)
    }

    async fn load_ekstra(conn: &mut SqliteConnection, id: i64) -> AppResult<EkstraHenting> {
        henting::find_ekstra(conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("ekstra henting {}", id)))
    }

    pub async fn create_ekstra(
        &self,
        identity: &Identity,
        req: NyEkstraHenting,
    ) -> AppResult<EkstraHenting> {
        identity.require_admin_or_stasjon(req.stasjon_id)?;
        if req.start_tidspunkt >= req.slutt_tidspunkt {
            return Err(AppError::validation(
                "start_tidspunkt må være før slutt_tidspunkt",
            ));
        }
        validate_mengder(&req.kategorier)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if stasjon::find(&mut *tx, req.stasjon_id).await?.is_none() {
            return Err(AppError::validation(format!("ukjent stasjon {}", req.stasjon_id)));
        }
        let ids: Vec<i64> = req.kategorier.iter().map(|k| k.kategori_id).collect();
        require_kategorier(&mut *tx, &ids).await?;

        let new = EkstraHenting {
            id: 0,
            stasjon_id: req.stasjon_id,
            start_tidspunkt: req.start_tidspunkt,
            slutt_tidspunkt: req.slutt_tidspunkt,
            merknad: req.merknad,
            kategorier: req.kategorier,
            godkjent_utlysning: None,
            utlysninger: None,
        };
        let id = henting::insert_ekstra(&mut *tx, &new, now).await?;

        for partner_id in &req.partnere {
            if partner::find(&mut *tx, *partner_id).await?.is_none() {
                return Err(AppError::validation(format!("ukjent partner {}", partner_id)));
            }
            utlysning::insert(&mut *tx, *partner_id, id, now).await?;
        }

        let created = Self::load_ekstra(&mut *tx, id).await?;
        let created = Self::decorate(&mut *tx, identity, created).await?;
        tx.commit().await?;

        tracing::info!(
            "Ekstra henting {} created and offered to {} partnere",
            id,
            req.partnere.len()
        );
        Ok(created)
    }

    /// Partners only see hentinger they hold a visible utlysning for.
    pub async fn list_ekstra(
        &self,
        identity: &Identity,
        query: EkstraQuery,
    ) -> AppResult<Vec<EkstraHenting>> {
        let (partner_id, stasjon_id) = scope_owner(identity, None, query.stasjon_id)?;
        let filter = EkstraFilter {
            stasjon_id,
            fra: query.fra,
            til: query.til,
            synlig_for_partner: partner_id,
        };

        let mut conn = self.pool.acquire().await?;
        let found = henting::list_ekstra(&mut *conn, &filter).await?;
        let mut decorated = Vec::with_capacity(found.len());
        for h in found {
            decorated.push(Self::decorate(&mut *conn, identity, h).await?);
        }
        Ok(decorated)
    }

    pub async fn get_ekstra(&self, identity: &Identity, id: i64) -> AppResult<EkstraHenting> {
        let mut conn = self.pool.acquire().await?;
        let found = Self::load_ekstra(&mut *conn, id).await?;

        let allowed = if identity.is_admin() || identity.is_stasjon(found.stasjon_id) {
            true
        } else if let Some(partner_id) = identity.partner_id() {
            let filter = UtlysningFilter {
                henting_id: Some(id),
                synlig_for_partner: Some(partner_id),
                ..Default::default()
            };
            !utlysning::list(&mut *conn, &filter).await?.is_empty()
        } else {
            false
        };
        if !allowed {
            return Err(AppError::forbidden("ingen tilgang til henting"));
        }

        Self::decorate(&mut *conn, identity, found).await
    }

    pub async fn update_ekstra(
        &self,
        identity: &Identity,
        id: i64,
        req: EkstraEndring,
    ) -> AppResult<EkstraHenting> {
        let mut tx = self.pool.begin().await?;
        let mut found = Self::load_ekstra(&mut *tx, id).await?;
        identity.require_admin_or_stasjon(found.stasjon_id)?;

        if let Some(start) = req.start_tidspunkt {
            found.start_tidspunkt = start;
        }
        if let Some(slutt) = req.slutt_tidspunkt {
            found.slutt_tidspunkt = slutt;
        }
        if found.start_tidspunkt >= found.slutt_tidspunkt {
            return Err(AppError::validation(
                "start_tidspunkt må være før slutt_tidspunkt",
            ));
        }
        if let Some(merknad) = req.merknad {
            found.merknad = Some(merknad);
        }
        if let Some(kategorier) = req.kategorier {
            validate_mengder(&kategorier)?;
            let ids: Vec<i64> = kategorier.iter().map(|k| k.kategori_id).collect();
            require_kategorier(&mut *tx, &ids).await?;
            found.kategorier = kategorier;
        }

        henting::update_ekstra(&mut *tx, &found).await?;
        let updated = Self::decorate(&mut *tx, identity, found).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete_ekstra(&self, identity: &Identity, id: i64) -> AppResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let found = Self::load_ekstra(&mut *tx, id).await?;
        identity.require_admin_or_stasjon(found.stasjon_id)?;

        henting::soft_delete_ekstra(&mut *tx, id, now).await?;
        let offers = utlysning::soft_delete_for_henting(&mut *tx, id, now).await?;
        tx.commit().await?;

        tracing::info!("Ekstra henting {} deleted with {} utlysninger", id, offers);
        Ok(())
    }
}
