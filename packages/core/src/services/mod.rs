//! Business rules per resource. Handlers call these with the caller's
//! [`crate::auth::Identity`]; each write runs in a single transaction.

pub mod henting;
pub mod kategori;
pub mod keycloak;
pub mod kontakt;
pub mod partner;
pub mod stasjon;
pub mod utlysning;
pub mod uttak;
pub mod varsling;
pub mod vekt;

use crate::auth::{Identity, Role};
use crate::error::{AppError, AppResult};

pub const MAX_NAVN_LEN: usize = 100;

/// Trimmed name, non-empty and at most [`MAX_NAVN_LEN`] characters.
pub(crate) fn validate_navn(navn: &str) -> AppResult<String> {
    let navn = navn.trim();
    if navn.is_empty() {
        return Err(AppError::validation("navn kan ikke være tomt"));
    }
    if navn.chars().count() > MAX_NAVN_LEN {
        return Err(AppError::validation(format!(
            "navn kan ikke være lengre enn {} tegn",
            MAX_NAVN_LEN
        )));
    }
    Ok(navn.to_string())
}

/// Pin list filters to the caller's own partner or station. Admin filters
/// pass through unchanged.
pub(crate) fn scope_owner(
    identity: &Identity,
    partner_id: Option<i64>,
    stasjon_id: Option<i64>,
) -> AppResult<(Option<i64>, Option<i64>)> {
    identity.require_any(&Role::ALL)?;
    if identity.is_admin() {
        Ok((partner_id, stasjon_id))
    } else if let Some(own) = identity.partner_id() {
        Ok((Some(own), stasjon_id))
    } else if let Some(own) = identity.stasjon_id() {
        Ok((partner_id, Some(own)))
    } else {
        Err(AppError::forbidden("mangler gruppetilhørighet"))
    }
}
