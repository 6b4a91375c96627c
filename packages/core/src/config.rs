use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub keycloak: Option<KeycloakConfig>,
}

#[derive(Clone)]
pub struct KeycloakConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
}

// Keeps the client secret out of startup logs.
impl std::fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://ombruk.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let jwt_secret = lookup("JWT_SECRET").ok_or("JWT_SECRET is required")?;
        if jwt_secret.trim().is_empty() {
            return Err("JWT_SECRET must not be empty".to_string());
        }

        let keycloak = match lookup("KEYCLOAK_URL") {
            Some(base_url) => {
                let required = |key: &str| {
                    lookup(key).ok_or_else(|| format!("{} is required when KEYCLOAK_URL is set", key))
                };
                Some(KeycloakConfig {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    realm: required("KEYCLOAK_REALM")?,
                    client_id: required("KEYCLOAK_CLIENT_ID")?,
                    client_secret: required("KEYCLOAK_CLIENT_SECRET")?,
                })
            }
            None => None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
            keycloak,
        })
    }
}
