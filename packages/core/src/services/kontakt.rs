//! Contacts and their phone/e-mail verification.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::repository::kontakt::{self, Kontakt, Verifisering};
use crate::repository::{partner, stasjon};
use crate::services::scope_owner;
use crate::services::varsling::{Kanal, SharedVerificationSender};

#[derive(Debug, Deserialize)]
pub struct NyKontakt {
    pub navn: String,
    pub telefon: String,
    pub epost: String,
    pub rolle: Option<String>,
    pub partner_id: Option<i64>,
    pub stasjon_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KontaktEndring {
    pub navn: Option<String>,
    pub telefon: Option<String>,
    pub epost: Option<String>,
    pub rolle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KontaktQuery {
    pub partner_id: Option<i64>,
    pub stasjon_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VerifiserRequest {
    pub kontakt_id: i64,
    pub telefon_kode: Option<String>,
    pub epost_kode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiseringStatus {
    pub kontakt_id: i64,
    pub telefon_verifisert: bool,
    pub epost_verifisert: bool,
}

impl From<&Verifisering> for VerifiseringStatus {
    fn from(v: &Verifisering) -> Self {
        Self {
            kontakt_id: v.kontakt_id,
            telefon_verifisert: v.telefon_verifisert,
            epost_verifisert: v.epost_verifisert,
        }
    }
}

/// `+` followed by 8-15 digits, or just the digits.
pub fn valid_telefon(telefon: &str) -> bool {
    let digits = telefon.strip_prefix('+').unwrap_or(telefon);
    (8..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// One `@`, a non-empty local part and a dot somewhere after the `@`.
pub fn valid_epost(epost: &str) -> bool {
    match epost.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .find('.')
                    .map_or(false, |dot| dot > 0 && dot + 1 < domain.len())
        }
        None => false,
    }
}

fn generate_kode() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

fn validate_fields(navn: &str, telefon: &str, epost: &str) -> AppResult<()> {
    if navn.trim().is_empty() {
        return Err(AppError::validation("navn kan ikke være tomt"));
    }
    if !valid_telefon(telefon) {
        return Err(AppError::validation("ugyldig telefonnummer"));
    }
    if !valid_epost(epost) {
        return Err(AppError::validation("ugyldig e-postadresse"));
    }
    Ok(())
}

fn can_access(identity: &Identity, kontakt: &Kontakt) -> bool {
    identity.is_admin()
        || kontakt.partner_id.map_or(false, |id| identity.is_partner(id))
        || kontakt.stasjon_id.map_or(false, |id| identity.is_stasjon(id))
}

#[derive(Clone)]
pub struct KontaktService {
    pool: SqlitePool,
    sender: SharedVerificationSender,
}

impl KontaktService {
    pub fn new(pool: SqlitePool, sender: SharedVerificationSender) -> Self {
        Self { pool, sender }
    }

    async fn load(&self, conn: &mut SqliteConnection, identity: &Identity, id: i64) -> AppResult<Kontakt> {
        let kontakt = kontakt::find(conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("kontakt {}", id)))?;
        if !can_access(identity, &kontakt) {
            return Err(AppError::forbidden("ingen tilgang til kontakt"));
        }
        Ok(kontakt)
    }

    async fn load_verifisering(conn: &mut SqliteConnection, kontakt_id: i64) -> AppResult<Verifisering> {
        kontakt::find_verifisering(conn, kontakt_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("verifisering for kontakt {}", kontakt_id)))
    }

    pub async fn create(&self, identity: &Identity, req: NyKontakt) -> AppResult<Kontakt> {
        validate_fields(&req.navn, &req.telefon, &req.epost)?;

        let mut tx = self.pool.begin().await?;
        match (req.partner_id, req.stasjon_id) {
            (Some(id), None) => {
                identity.require_admin_or_partner(id)?;
                if partner::find(&mut *tx, id).await?.is_none() {
                    return Err(AppError::validation(format!("ukjent partner {}", id)));
                }
            }
            (None, Some(id)) => {
                identity.require_admin_or_stasjon(id)?;
                if stasjon::find(&mut *tx, id).await?.is_none() {
                    return Err(AppError::validation(format!("ukjent stasjon {}", id)));
                }
            }
            _ => {
                return Err(AppError::validation(
                    "kontakt må tilhøre enten en partner eller en stasjon",
                ))
            }
        }

        let mut created = Kontakt {
            id: 0,
            navn: req.navn.trim().to_string(),
            telefon: req.telefon,
            epost: req.epost,
            rolle: req.rolle,
            partner_id: req.partner_id,
            stasjon_id: req.stasjon_id,
            opprettet: Utc::now(),
        };
        created.id = kontakt::insert(&mut *tx, &created).await?;

        let verifisering = Verifisering {
            kontakt_id: created.id,
            telefon_kode: Some(generate_kode()),
            epost_kode: Some(generate_kode()),
            telefon_verifisert: false,
            epost_verifisert: false,
        };
        kontakt::insert_verifisering(&mut *tx, &verifisering).await?;
        self.send_pending(&created, &verifisering).await?;
        tx.commit().await?;

        tracing::info!("Kontakt {} created", created.id);
        Ok(created)
    }

    async fn send_pending(&self, kontakt: &Kontakt, verifisering: &Verifisering) -> AppResult<()> {
        if let Some(kode) = &verifisering.telefon_kode {
            self.sender.send_kode(Kanal::Telefon, &kontakt.telefon, kode).await?;
        }
        if let Some(kode) = &verifisering.epost_kode {
            self.sender.send_kode(Kanal::Epost, &kontakt.epost, kode).await?;
        }
        Ok(())
    }

    /// Partners and stations only ever see their own contacts.
    pub async fn list(&self, identity: &Identity, query: KontaktQuery) -> AppResult<Vec<Kontakt>> {
        let (partner_id, stasjon_id) = scope_owner(identity, query.partner_id, query.stasjon_id)?;

        let mut conn = self.pool.acquire().await?;
        Ok(kontakt::list(&mut *conn, partner_id, stasjon_id).await?)
    }

    pub async fn get(&self, identity: &Identity, id: i64) -> AppResult<Kontakt> {
        let mut conn = self.pool.acquire().await?;
        self.load(&mut *conn, identity, id).await
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: i64,
        req: KontaktEndring,
    ) -> AppResult<Kontakt> {
        let mut tx = self.pool.begin().await?;
        let mut current = self.load(&mut *tx, identity, id).await?;
        let mut verifisering = Self::load_verifisering(&mut *tx, id).await?;
        let mut resend = Verifisering {
            telefon_kode: None,
            epost_kode: None,
            ..verifisering.clone()
        };

        if let Some(navn) = req.navn {
            current.navn = navn.trim().to_string();
        }
        if let Some(telefon) = req.telefon {
            if telefon != current.telefon {
                current.telefon = telefon;
                verifisering.telefon_verifisert = false;
                verifisering.telefon_kode = Some(generate_kode());
                resend.telefon_kode = verifisering.telefon_kode.clone();
            }
        }
        if let Some(epost) = req.epost {
            if epost != current.epost {
                current.epost = epost;
                verifisering.epost_verifisert = false;
                verifisering.epost_kode = Some(generate_kode());
                resend.epost_kode = verifisering.epost_kode.clone();
            }
        }
        if req.rolle.is_some() {
            current.rolle = req.rolle;
        }
        validate_fields(&current.navn, &current.telefon, &current.epost)?;

        kontakt::update(&mut *tx, &current).await?;
        kontakt::update_verifisering(&mut *tx, &verifisering).await?;
        self.send_pending(&current, &resend).await?;
        tx.commit().await?;

        Ok(current)
    }

    pub async fn delete(&self, identity: &Identity, id: i64) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.load(&mut *conn, identity, id).await?;
        kontakt::soft_delete(&mut *conn, id, Utc::now()).await?;
        Ok(())
    }

    /// Every supplied code must match before any flag is set.
    pub async fn verifiser(
        &self,
        identity: &Identity,
        req: VerifiserRequest,
    ) -> AppResult<VerifiseringStatus> {
        if req.telefon_kode.is_none() && req.epost_kode.is_none() {
            return Err(AppError::validation("ingen verifiseringskode oppgitt"));
        }

        let mut tx = self.pool.begin().await?;
        self.load(&mut *tx, identity, req.kontakt_id).await?;
        let mut verifisering = Self::load_verifisering(&mut *tx, req.kontakt_id).await?;

        let kode_ok = |supplied: &Option<String>, stored: &Option<String>| match supplied {
            Some(kode) => stored.as_deref() == Some(kode.trim()),
            None => true,
        };
        if !kode_ok(&req.telefon_kode, &verifisering.telefon_kode)
            || !kode_ok(&req.epost_kode, &verifisering.epost_kode)
        {
            tracing::warn!("Wrong verification code for kontakt {}", req.kontakt_id);
            return Err(AppError::validation("feil verifiseringskode"));
        }

        if req.telefon_kode.is_some() {
            verifisering.telefon_verifisert = true;
            verifisering.telefon_kode = None;
        }
        if req.epost_kode.is_some() {
            verifisering.epost_verifisert = true;
            verifisering.epost_kode = None;
        }
        kontakt::update_verifisering(&mut *tx, &verifisering).await?;
        tx.commit().await?;

        Ok(VerifiseringStatus::from(&verifisering))
    }

    /// Issue fresh codes for every channel that is not yet verified.
    pub async fn ny_verifisering(&self, identity: &Identity, id: i64) -> AppResult<VerifiseringStatus> {
        let mut tx = self.pool.begin().await?;
        let kontakt = self.load(&mut *tx, identity, id).await?;
        let mut verifisering = Self::load_verifisering(&mut *tx, id).await?;

        verifisering.telefon_kode = (!verifisering.telefon_verifisert).then(generate_kode);
        verifisering.epost_kode = (!verifisering.epost_verifisert).then(generate_kode);

        kontakt::update_verifisering(&mut *tx, &verifisering).await?;
        self.send_pending(&kontakt, &verifisering).await?;
        tx.commit().await?;

        Ok(VerifiseringStatus::from(&verifisering))
    }

    pub async fn status(&self, identity: &Identity, id: i64) -> AppResult<VerifiseringStatus> {
        let mut conn = self.pool.acquire().await?;
        self.load(&mut *conn, identity, id).await?;
        let verifisering = Self::load_verifisering(&mut *conn, id).await?;
        Ok(VerifiseringStatus::from(&verifisering))
    }
}
