use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::{Identity, Role};
use crate::error::{AppError, AppResult};
use crate::metrics::AppMetrics;
use crate::repository::henting::{self, HentingRef, HentingType};
use crate::repository::kategori;
use crate::repository::vekt::{self, VektFilter, Vektregistrering};

#[derive(Debug, Deserialize)]
pub struct NyVektregistrering {
    pub henting_type: HentingType,
    pub henting_id: i64,
    pub kategori_id: i64,
    pub vekt: f64,
}

#[derive(Debug, Deserialize)]
pub struct VektLinje {
    pub kategori_id: i64,
    pub vekt: f64,
}

#[derive(Debug, Deserialize)]
pub struct VektBatch {
    pub henting_type: HentingType,
    pub henting_id: i64,
    pub vekter: Vec<VektLinje>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VektQuery {
    pub henting_type: Option<HentingType>,
    pub henting_id: Option<i64>,
    pub kategori_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VektEndring {
    pub vekt: f64,
}

fn validate_vekt(vekt: f64) -> AppResult<()> {
    if vekt.is_finite() && vekt > 0.0 {
        Ok(())
    } else {
        Err(AppError::validation("vekt må være et tall større enn 0"))
    }
}

fn can_register(identity: &Identity, henting: &HentingRef) -> bool {
    identity.is_admin()
        || identity.is_stasjon(henting.stasjon_id)
        || henting.partner_id.map_or(false, |id| identity.is_partner(id))
}

async fn load_henting(
    conn: &mut SqliteConnection,
    identity: &Identity,
    henting_type: HentingType,
    henting_id: i64,
) -> AppResult<HentingRef> {
    let found = henting::henting_ref(conn, henting_type, henting_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{:?} henting {}", henting_type, henting_id)))?;
    if !can_register(identity, &found) {
        return Err(AppError::forbidden("ingen tilgang til henting"));
    }
    Ok(found)
}

#[derive(Clone)]
pub struct VektService {
    pool: SqlitePool,
    metrics: Arc<AppMetrics>,
}

impl VektService {
    pub fn new(pool: SqlitePool, metrics: Arc<AppMetrics>) -> Self {
        Self { pool, metrics }
    }

    /// Checks shared by single and batch registration.
    async fn registerable(
        conn: &mut SqliteConnection,
        identity: &Identity,
        henting_type: HentingType,
        henting_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let found = load_henting(&mut *conn, identity, henting_type, henting_id).await?;
        if found.avlyst {
            return Err(AppError::validation("hentingen er avlyst"));
        }
        if found.start_tidspunkt > now {
            return Err(AppError::validation("hentingen har ikke startet"));
        }
        Ok(())
    }

    async fn insert_line(
        conn: &mut SqliteConnection,
        henting_type: HentingType,
        henting_id: i64,
        linje: &VektLinje,
        now: DateTime<Utc>,
    ) -> AppResult<Vektregistrering> {
        validate_vekt(linje.vekt)?;
        let kategori = kategori::find(&mut *conn, linje.kategori_id)
            .await?
            .ok_or_else(|| AppError::validation(format!("ukjent kategori {}", linje.kategori_id)))?;
        if !kategori.vektkategori {
            return Err(AppError::validation(format!(
                "kategori '{}' registrerer ikke vekt",
                kategori.navn
            )));
        }

        let mut registrering = Vektregistrering {
            id: 0,
            henting_type,
            henting_id,
            kategori_id: linje.kategori_id,
            vekt: linje.vekt,
            registrert_tidspunkt: now,
        };
        registrering.id = vekt::insert(conn, &registrering).await?;
        Ok(registrering)
    }

    pub async fn register(
        &self,
        identity: &Identity,
        req: NyVektregistrering,
    ) -> AppResult<Vektregistrering> {
        let batch = VektBatch {
            henting_type: req.henting_type,
            henting_id: req.henting_id,
            vekter: vec![VektLinje {
                kategori_id: req.kategori_id,
                vekt: req.vekt,
            }],
        };
        let mut created = self.register_batch(identity, batch).await?;
        created
            .pop()
            .ok_or_else(|| AppError::not_found("vektregistrering"))
    }

    pub async fn register_batch(
        &self,
        identity: &Identity,
        req: VektBatch,
    ) -> AppResult<Vec<Vektregistrering>> {
        if req.vekter.is_empty() {
            return Err(AppError::validation("vekter kan ikke være tom"));
        }
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        Self::registerable(&mut *tx, identity, req.henting_type, req.henting_id, now).await?;

        let mut created = Vec::with_capacity(req.vekter.len());
        for linje in &req.vekter {
            created.push(
                Self::insert_line(&mut *tx, req.henting_type, req.henting_id, linje, now).await?,
            );
        }
        tx.commit().await?;

        let kg: f64 = created.iter().map(|r| r.vekt).sum();
        self.metrics.vekt_registrert_kg_total.inc_by(kg);
        tracing::info!(
            "{} kg registered on {:?} henting {} ({} lines)",
            kg,
            req.henting_type,
            req.henting_id,
            created.len()
        );
        Ok(created)
    }

    /// Admin may list everything; others must name a henting they take part in.
    pub async fn list(&self, identity: &Identity, query: VektQuery) -> AppResult<Vec<Vektregistrering>> {
        identity.require_any(&Role::ALL)?;
        let mut conn = self.pool.acquire().await?;

        if !identity.is_admin() {
            match (query.henting_type, query.henting_id) {
                (Some(t), Some(id)) => {
                    load_henting(&mut *conn, identity, t, id).await?;
                }
                _ => {
                    return Err(AppError::validation(
                        "henting_type og henting_id må oppgis",
                    ))
                }
            }
        }

        let filter = VektFilter {
            henting_type: query.henting_type,
            henting_id: query.henting_id,
            kategori_id: query.kategori_id,
        };
        Ok(vekt::list(&mut *conn, &filter).await?)
    }

    async fn load_own(
        conn: &mut SqliteConnection,
        identity: &Identity,
        id: i64,
    ) -> AppResult<Vektregistrering> {
        let found = vekt::find(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("vektregistrering {}", id)))?;
        load_henting(conn, identity, found.henting_type, found.henting_id).await?;
        Ok(found)
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: i64,
        req: VektEndring,
    ) -> AppResult<Vektregistrering> {
        validate_vekt(req.vekt)?;
        let mut tx = self.pool.begin().await?;
        let mut found = Self::load_own(&mut *tx, identity, id).await?;

        vekt::update_vekt(&mut *tx, id, req.vekt).await?;
        tx.commit().await?;

        found.vekt = req.vekt;
        Ok(found)
    }

    pub async fn delete(&self, identity: &Identity, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::load_own(&mut *tx, identity, id).await?;
        vekt::soft_delete(&mut *tx, id, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::create_pool;
    use crate::repository::henting::{Frekvens, Henteplan, PlanlagtFilter};
    use crate::repository::partner::{self, Storrelse};
    use crate::repository::stasjon::{self, Stasjonstype};
    use crate::services::uttak::{UttakQuery, UttakService};

    struct Fixture {
        service: VektService,
        metrics: Arc<AppMetrics>,
        pool: SqlitePool,
        partner_id: i64,
        stasjon_id: i64,
        moebler: i64,
        diverse: i64,
    }

    async fn fixture() -> Fixture {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        let partner_id = partner::insert(&mut conn, "Fretex", true, Storrelse::Liten, now)
            .await
            .unwrap();
        let stasjon_id = stasjon::insert(&mut conn, "Haraldrud", Stasjonstype::Gjenbruk, now)
            .await
            .unwrap();
        let moebler = kategori::insert(&mut conn, "Møbler", true, now).await.unwrap();
        let diverse = kategori::insert(&mut conn, "Diverse", false, now).await.unwrap();
        drop(conn);

        let metrics = Arc::new(AppMetrics::new().unwrap());
        Fixture {
            service: VektService::new(pool.clone(), metrics.clone()),
            metrics,
            pool,
            partner_id,
            stasjon_id,
            moebler,
            diverse,
        }
    }

    /// A henteplan with one planlagt henting starting at `start`.
    async fn planlagt_at(f: &Fixture, start: DateTime<Utc>) -> i64 {
        let mut conn = f.pool.acquire().await.unwrap();
        let plan = Henteplan {
            id: 0,
            partner_id: f.partner_id,
            stasjon_id: f.stasjon_id,
            frekvens: Frekvens::Enkelt,
            start_tidspunkt: start,
            slutt_tidspunkt: start + Duration::hours(1),
            ukedag: None,
            merknad: None,
            kategorier: Vec::new(),
        };
        let plan_id = henting::insert_henteplan(&mut conn, &plan, Utc::now()).await.unwrap();
        henting::insert_planlagte(&mut conn, plan_id, &[(start, start + Duration::hours(1))])
            .await
            .unwrap();
        henting::list_planlagte(
            &mut conn,
            &PlanlagtFilter {
                henteplan_id: Some(plan_id),
                ..Default::default()
            },
        )
        .await
        .unwrap()[0]
            .id
    }

    fn linje(kategori_id: i64, vekt: f64) -> VektLinje {
        VektLinje { kategori_id, vekt }
    }

    #[tokio::test]
    async fn batch_registers_and_counts_kilograms() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;

        let created = f
            .service
            .register_batch(
                &Identity::partner(f.partner_id),
                VektBatch {
                    henting_type: HentingType::Planlagt,
                    henting_id,
                    vekter: vec![linje(f.moebler, 12.5), linje(f.moebler, 7.5)],
                },
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(f.metrics.vekt_registrert_kg_total.get(), 20.0);
    }

    #[tokio::test]
    async fn one_bad_line_rejects_the_whole_batch() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;

        let err = f
            .service
            .register_batch(
                &Identity::admin(),
                VektBatch {
                    henting_type: HentingType::Planlagt,
                    henting_id,
                    vekter: vec![linje(f.moebler, 5.0), linje(f.diverse, 3.0)],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stored = f
            .service
            .list(&Identity::admin(), VektQuery::default())
            .await
            .unwrap();
        assert!(stored.is_empty());
        assert_eq!(f.metrics.vekt_registrert_kg_total.get(), 0.0);
    }

    #[tokio::test]
    async fn non_weight_kategori_is_rejected() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;

        let err = f
            .service
            .register(
                &Identity::admin(),
                NyVektregistrering {
                    henting_type: HentingType::Planlagt,
                    henting_id,
                    kategori_id: f.diverse,
                    vekt: 4.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn deleted_kategori_blocks_new_weights_but_stays_in_report() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;
        let ny = |vekt| NyVektregistrering {
            henting_type: HentingType::Planlagt,
            henting_id,
            kategori_id: f.moebler,
            vekt,
        };

        f.service.register(&Identity::admin(), ny(9.0)).await.unwrap();
        {
            let mut conn = f.pool.acquire().await.unwrap();
            kategori::soft_delete(&mut conn, f.moebler, Utc::now())
                .await
                .unwrap();
        }

        let err = f.service.register(&Identity::admin(), ny(3.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let rapport = UttakService::new(f.pool.clone())
            .rapport(&Identity::admin(), UttakQuery::default())
            .await
            .unwrap();
        assert_eq!(rapport.totalt_kg, 9.0);
        assert_eq!(rapport.kategorier.len(), 1);
        assert_eq!(rapport.kategorier[0].kategori_navn, "Møbler");
    }

    #[tokio::test]
    async fn weight_must_be_positive_and_finite() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;

        for vekt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = f
                .service
                .register(
                    &Identity::admin(),
                    NyVektregistrering {
                        henting_type: HentingType::Planlagt,
                        henting_id,
                        kategori_id: f.moebler,
                        vekt,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "vekt {vekt}");
        }
    }

    #[tokio::test]
    async fn future_henting_is_rejected() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() + Duration::days(1)).await;

        let err = f
            .service
            .register(
                &Identity::admin(),
                NyVektregistrering {
                    henting_type: HentingType::Planlagt,
                    henting_id,
                    kategori_id: f.moebler,
                    vekt: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn outsiders_cannot_register_or_list() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;

        let err = f
            .service
            .register(
                &Identity::partner(f.partner_id + 1),
                NyVektregistrering {
                    henting_type: HentingType::Planlagt,
                    henting_id,
                    kategori_id: f.moebler,
                    vekt: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = f
            .service
            .list(&Identity::stasjon(f.stasjon_id), VektQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn station_updates_and_deletes_its_registrations() {
        let f = fixture().await;
        let henting_id = planlagt_at(&f, Utc::now() - Duration::hours(1)).await;
        let station = Identity::stasjon(f.stasjon_id);

        let created = f
            .service
            .register(
                &station,
                NyVektregistrering {
                    henting_type: HentingType::Planlagt,
                    henting_id,
                    kategori_id: f.moebler,
                    vekt: 4.0,
                },
            )
            .await
            .unwrap();

        let updated = f
            .service
            .update(&station, created.id, VektEndring { vekt: 6.0 })
            .await
            .unwrap();
        assert_eq!(updated.vekt, 6.0);

        f.service.delete(&station, created.id).await.unwrap();
        let err = f.service.delete(&station, created.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
