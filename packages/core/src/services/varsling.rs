//! Delivery seam for contact verification codes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kanal {
    Telefon,
    Epost,
}

#[async_trait]
pub trait VerificationSender {
    /// Deliver `kode` to `adresse` (a phone number or an e-mail address).
    async fn send_kode(&self, kanal: Kanal, adresse: &str, kode: &str) -> AppResult<()>;
}

pub type SharedVerificationSender = Arc<dyn VerificationSender + Send + Sync>;

/// Writes codes to the log instead of sending them.
pub struct LogVerificationSender;

#[async_trait]
impl VerificationSender for LogVerificationSender {
    async fn send_kode(&self, kanal: Kanal, adresse: &str, kode: &str) -> AppResult<()> {
        tracing::info!("Verification code issued over {:?} to {}", kanal, adresse);
        tracing::debug!("Verification code for {}: {}", adresse, kode);
        Ok(())
    }
}
