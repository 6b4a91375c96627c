//! SQL access, one submodule per table family.
//!
//! Functions take `&mut SqliteConnection` rather than the pool so the
//! service layer decides the transaction scope: pass `&mut *tx` to join an
//! open transaction, or a pooled connection for a one-off read.
//!
//! Rows are never hard-deleted. Every table carries `slettet_tidspunkt`
//! and the read paths here filter soft-deleted rows out.

pub mod henting;
pub mod kategori;
pub mod kontakt;
pub mod partner;
pub mod stasjon;
pub mod utlysning;
pub mod vekt;

/// Search key stored in `navn_sok`. SQLite only folds ASCII case, so
/// names are lowercased here before they reach the database.
pub(crate) fn sok_key(navn: &str) -> String {
    navn.to_lowercase()
}

/// `LIKE` pattern for a case-insensitive substring match against `navn_sok`.
pub(crate) fn contains_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", sok_key(&escaped))
}
