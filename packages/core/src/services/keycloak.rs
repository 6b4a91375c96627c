//! Keycloak group lifecycle.
//!
//! Every partner and station owns a Keycloak group below a fixed parent
//! (`partnere` / `stasjoner`). Group members get the `GroupID` attribute in
//! their tokens, which is how [`crate::auth::Identity`] learns who they act for.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::cache::ExpiringValue;
use crate::config::KeycloakConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::AppMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Partner,
    Stasjon,
}

impl GroupKind {
    pub fn parent_group(self) -> &'static str {
        match self {
            GroupKind::Partner => "partnere",
            GroupKind::Stasjon => "stasjoner",
        }
    }
}

#[async_trait]
pub trait GroupManager {
    async fn create_group(&self, kind: GroupKind, id: i64, name: &str) -> AppResult<()>;

    async fn rename_group(&self, kind: GroupKind, old_name: &str, new_name: &str) -> AppResult<()>;

    /// Deleting a group that does not exist succeeds.
    async fn delete_group(&self, kind: GroupKind, name: &str) -> AppResult<()>;
}

pub type SharedGroupManager = Arc<dyn GroupManager + Send + Sync>;

/// Used when no Keycloak is configured.
pub struct NoopGroupManager;

#[async_trait]
impl GroupManager for NoopGroupManager {
    async fn create_group(&self, kind: GroupKind, id: i64, name: &str) -> AppResult<()> {
        tracing::debug!("Keycloak disabled, skipping create of {:?} group {} ({})", kind, name, id);
        Ok(())
    }

    async fn rename_group(&self, kind: GroupKind, old_name: &str, new_name: &str) -> AppResult<()> {
        tracing::debug!("Keycloak disabled, skipping rename of {:?} group {} -> {}", kind, old_name, new_name);
        Ok(())
    }

    async fn delete_group(&self, kind: GroupKind, name: &str) -> AppResult<()> {
        tracing::debug!("Keycloak disabled, skipping delete of {:?} group {}", kind, name);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct GroupRepresentation {
    id: String,
    name: String,
}

/// Refresh the admin token this long before Keycloak says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 10;

pub struct KeycloakClient {
    base_url: String,
    realm: String,
    client_id: String,
    client_secret: String,
    http: Client,
    token: Mutex<ExpiringValue<String>>,
    metrics: Option<Arc<AppMetrics>>,
}

impl KeycloakClient {
    pub fn new(config: &KeycloakConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            realm: config.realm.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http: Client::new(),
            token: Mutex::new(ExpiringValue::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn admin_url(&self, suffix: &str) -> String {
        format!("{}/admin/realms/{}/{}", self.base_url, self.realm, suffix)
    }

    fn record(&self, operation: &str, result: &AppResult<()>) {
        if let Some(metrics) = &self.metrics {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics
                .keycloak_requests_total
                .with_label_values(&[operation, outcome])
                .inc();
        }
    }

    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.get() {
            return Ok(token);
        }

        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.realm
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Integration(format!(
                "Keycloak token endpoint returned HTTP {}",
                response.status()
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        let ttl = token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        cached.set(token.access_token.clone(), Duration::from_secs(ttl));
        Ok(token.access_token)
    }

    async fn parent_group_id(&self, token: &str, kind: GroupKind) -> AppResult<String> {
        let parent = kind.parent_group();
        let response = self
            .http
            .get(self.admin_url("groups"))
            .query(&[("search", parent), ("exact", "true")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        let groups: Vec<GroupRepresentation> = self.ensure_success(response, "group search")
            .await?
            .json()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        groups
            .into_iter()
            .find(|g| g.name == parent)
            .map(|g| g.id)
            .ok_or_else(|| AppError::Integration(format!("Keycloak parent group '{}' missing", parent)))
    }

    async fn find_child(&self, token: &str, kind: GroupKind, name: &str) -> AppResult<Option<String>> {
        let parent_id = self.parent_group_id(token, kind).await?;
        let response = self
            .http
            .get(self.admin_url(&format!("groups/{}/children", parent_id)))
            .query(&[("search", name), ("exact", "true")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        let children: Vec<GroupRepresentation> = self.ensure_success(response, "child search")
            .await?
            .json()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        Ok(children.into_iter().find(|g| g.name == name).map(|g| g.id))
    }

    /// A 401 from the admin API drops the cached token so the next call
    /// fetches a fresh one.
    async fn ensure_success(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> AppResult<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            if response.status() == StatusCode::UNAUTHORIZED {
                self.token.lock().await.invalidate();
            }
            Err(AppError::Integration(format!(
                "Keycloak {} returned HTTP {}",
                what,
                response.status()
            )))
        }
    }

    async fn try_create(&self, kind: GroupKind, id: i64, name: &str) -> AppResult<()> {
        let token = self.access_token().await?;
        let parent_id = self.parent_group_id(&token, kind).await?;

        let response = self
            .http
            .post(self.admin_url(&format!("groups/{}/children", parent_id)))
            .bearer_auth(&token)
            .json(&json!({
                "name": name,
                "attributes": { "GroupID": [id.to_string()] }
            }))
            .send()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        self.ensure_success(response, "group create").await?;
        Ok(())
    }

    async fn try_rename(&self, kind: GroupKind, old_name: &str, new_name: &str) -> AppResult<()> {
        let token = self.access_token().await?;
        let group_id = self
            .find_child(&token, kind, old_name)
            .await?
            .ok_or_else(|| AppError::Integration(format!("Keycloak group '{}' not found", old_name)))?;

        let response = self
            .http
            .put(self.admin_url(&format!("groups/{}", group_id)))
            .bearer_auth(&token)
            .json(&json!({ "name": new_name }))
            .send()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        self.ensure_success(response, "group rename").await?;
        Ok(())
    }

    async fn try_delete(&self, kind: GroupKind, name: &str) -> AppResult<()> {
        let token = self.access_token().await?;
        let Some(group_id) = self.find_child(&token, kind, name).await? else {
            tracing::warn!("Keycloak group '{}' already absent", name);
            return Ok(());
        };

        let response = self
            .http
            .delete(self.admin_url(&format!("groups/{}", group_id)))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|err| AppError::Integration(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response, "group delete").await?;
        Ok(())
    }
}

#[async_trait]
impl GroupManager for KeycloakClient {
    async fn create_group(&self, kind: GroupKind, id: i64, name: &str) -> AppResult<()> {
        let result = self.try_create(kind, id, name).await;
        self.record("create_group", &result);
        result
    }

    async fn rename_group(&self, kind: GroupKind, old_name: &str, new_name: &str) -> AppResult<()> {
        let result = self.try_rename(kind, old_name, new_name).await;
        self.record("rename_group", &result);
        result
    }

    async fn delete_group(&self, kind: GroupKind, name: &str) -> AppResult<()> {
        let result = self.try_delete(kind, name).await;
        self.record("delete_group", &result);
        result
    }
}
