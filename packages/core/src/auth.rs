//! Bearer-token authentication and role checks.
//!
//! Tokens are HS256 JWTs shaped like Keycloak access tokens: roles live in
//! `realm_access.roles` and the caller's partner or station id in the
//! `GroupID` claim. [`auth_middleware`] verifies the token and inserts an
//! [`Identity`] into the request extensions for handlers to extract.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// The fixed set of roles the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    RegEmployee,
    Partner,
    ReuseStation,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::RegEmployee, Role::Partner, Role::ReuseStation];

    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "RegEmployee" => Some(Role::RegEmployee),
            "Partner" => Some(Role::Partner),
            "ReuseStation" => Some(Role::ReuseStation),
            _ => None,
        }
    }

    pub fn as_claim(self) -> &'static str {
        match self {
            Role::RegEmployee => "RegEmployee",
            Role::Partner => "Partner",
            Role::ReuseStation => "ReuseStation",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub realm_access: RealmAccess,
    #[serde(rename = "GroupID", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<Role>,
    pub group_id: Option<i64>,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::RegEmployee)
    }

    /// Partner id of the caller, when it acts as a partner.
    pub fn partner_id(&self) -> Option<i64> {
        if self.has_role(Role::Partner) {
            self.group_id
        } else {
            None
        }
    }

    /// Station id of the caller, when it acts as a station.
    pub fn stasjon_id(&self) -> Option<i64> {
        if self.has_role(Role::ReuseStation) {
            self.group_id
        } else {
            None
        }
    }

    pub fn is_partner(&self, partner_id: i64) -> bool {
        self.partner_id() == Some(partner_id)
    }

    pub fn is_stasjon(&self, stasjon_id: i64) -> bool {
        self.stasjon_id() == Some(stasjon_id)
    }

    pub fn require_any(&self, roles: &[Role]) -> AppResult<()> {
        if roles.iter().any(|r| self.has_role(*r)) {
            Ok(())
        } else {
            Err(AppError::forbidden("mangler nødvendig rolle"))
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        self.require_any(&[Role::RegEmployee])
    }

    /// Admin, or the given partner.
    pub fn require_admin_or_partner(&self, partner_id: i64) -> AppResult<()> {
        if self.is_admin() || self.is_partner(partner_id) {
            Ok(())
        } else {
            Err(AppError::forbidden("ingen tilgang til partner"))
        }
    }

    /// Admin, or the given station.
    pub fn require_admin_or_stasjon(&self, stasjon_id: i64) -> AppResult<()> {
        if self.is_admin() || self.is_stasjon(stasjon_id) {
            Ok(())
        } else {
            Err(AppError::forbidden("ingen tilgang til stasjon"))
        }
    }

    #[cfg(test)]
    pub fn admin() -> Self {
        Self {
            subject: "admin".into(),
            roles: vec![Role::RegEmployee],
            group_id: None,
        }
    }

    #[cfg(test)]
    pub fn partner(id: i64) -> Self {
        Self {
            subject: format!("partner-{}", id),
            roles: vec![Role::Partner],
            group_id: Some(id),
        }
    }

    #[cfg(test)]
    pub fn stasjon(id: i64) -> Self {
        Self {
            subject: format!("stasjon-{}", id),
            roles: vec![Role::ReuseStation],
            group_id: Some(id),
        }
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            roles: claims
                .realm_access
                .roles
                .iter()
                .filter_map(|r| Role::from_claim(r))
                .collect(),
            group_id: claims.group_id,
        }
    }
}

/// Key material for verifying bearer tokens.
#[derive(Clone)]
pub struct JwtKeys {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> AppResult<Identity> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                AppError::Unauthorized("ugyldig eller utløpt token".into())
            })?;
        Ok(data.claims.into())
    }
}

/// Issue an HS256 token carrying the given roles and group id.
pub fn create_token(
    subject: &str,
    roles: &[Role],
    group_id: Option<i64>,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        realm_access: RealmAccess {
            roles: roles.iter().map(|r| r.as_claim().to_string()).collect(),
        },
        group_id,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Middleware that verifies the `Authorization: Bearer` header.
pub async fn auth_middleware(
    State(keys): State<Arc<JwtKeys>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return AppError::Unauthorized("mangler bearer token".into()).into_response();
    };

    match keys.verify(token) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    const SECRET: &str = "test-hemmelighet";

    fn app() -> Router {
        let keys = Arc::new(JwtKeys::new(SECRET));
        Router::new()
            .route(
                "/hvem",
                get(|Extension(identity): Extension<Identity>| async move {
                    format!("{}:{:?}", identity.subject, identity.group_id)
                }),
            )
            .layer(middleware::from_fn_with_state(keys, auth_middleware))
    }

    #[test]
    fn token_roundtrip_keeps_roles_and_group() {
        let token = create_token(
            "abc",
            &[Role::Partner],
            Some(7),
            SECRET,
            chrono::Duration::minutes(5),
        )
        .unwrap();

        let identity = JwtKeys::new(SECRET).verify(&token).unwrap();
        assert_eq!(identity.subject, "abc");
        assert_eq!(identity.roles, vec![Role::Partner]);
        assert_eq!(identity.partner_id(), Some(7));
        assert_eq!(identity.stasjon_id(), None);
    }

    #[test]
    fn unknown_roles_are_ignored() {
        let claims = Claims {
            sub: "x".into(),
            exp: 0,
            realm_access: RealmAccess {
                roles: vec!["offline_access".into(), "ReuseStation".into()],
            },
            group_id: Some(3),
        };
        let identity = Identity::from(claims);
        assert_eq!(identity.roles, vec![Role::ReuseStation]);
        assert!(identity.is_stasjon(3));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = create_token("abc", &[Role::RegEmployee], None, "annen", chrono::Duration::minutes(5))
            .unwrap();
        let err = JwtKeys::new(SECRET).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let token = create_token("abc", &[Role::RegEmployee], None, SECRET, chrono::Duration::hours(-2))
            .unwrap();
        assert!(JwtKeys::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn require_any_rejects_missing_role() {
        let identity = Identity::partner(1);
        assert!(identity.require_any(&[Role::Partner]).is_ok());
        assert!(matches!(identity.require_admin(), Err(AppError::Forbidden(_))));
        assert!(identity.require_admin_or_partner(1).is_ok());
        assert!(identity.require_admin_or_partner(2).is_err());
        assert!(Identity::admin().require_admin_or_stasjon(9).is_ok());
    }

    #[tokio::test]
    async fn middleware_rejects_missing_header() {
        let resp = app()
            .oneshot(HttpRequest::builder().uri("/hvem").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn middleware_inserts_identity() {
        let token = create_token("s1", &[Role::ReuseStation], Some(4), SECRET, chrono::Duration::minutes(5))
            .unwrap();
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/hvem")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
