//! Bearer token resolution for ERP calls.

use crate::config::ErpLinkConfig;
use crate::erp::ErpClient;
use crate::storage::{CachedToken, Store};
use crate::{ErpLinkError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Principal under which the service account's token is cached.
pub const SERVICE_PRINCIPAL: &str = "service";

/// A cached service token is reused only if it stays valid this much longer.
const REUSE_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime assumed for a fresh ERP token.
const SERVICE_TOKEN_TTL_SECS: i64 = 55 * 60;

/// Supplies a currently valid ERP bearer token, or fails.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, tenant_id: &str, integration_id: u32, user_id: Option<&str>) -> Result<String>;
}

/// A fixed token, for callers that already hold one.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _tenant_id: &str, _integration_id: u32, _user_id: Option<&str>) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Resolves tokens from the cache, logging in with the service account when
/// the cached one is missing or about to expire.
pub struct ServiceSession {
    client: Arc<ErpClient>,
    store: Store,
    username: Option<String>,
    password: Option<Zeroizing<String>>,
}

fn user_principal(user_id: &str) -> String {
    format!("user:{}", user_id)
}

impl ServiceSession {
    pub fn new(
        client: Arc<ErpClient>,
        store: Store,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            client,
            store,
            username,
            password: password.map(Zeroizing::new),
        }
    }

    pub fn from_config(config: &ErpLinkConfig, client: Arc<ErpClient>, store: Store) -> Self {
        Self::new(
            client,
            store,
            config.service_username.clone(),
            config.service_password.clone(),
        )
    }

    /// Remember an ERP token obtained on behalf of an application user.
    pub fn cache_user_token(
        &self,
        tenant_id: &str,
        integration_id: u32,
        user_id: &str,
        token: &str,
        expires_at: i64,
    ) -> Result<()> {
        self.store.save_token(
            &CachedToken {
                tenant_id: tenant_id.to_string(),
                integration_id,
                principal: user_principal(user_id),
                token: token.to_string(),
                expires_at,
            },
            chrono::Utc::now().timestamp(),
        )?;
        Ok(())
    }

    /// The service account's token, logging in if needed.
    pub async fn service_token(&self, tenant_id: &str, integration_id: u32) -> Result<String> {
        let (username, password) = match (&self.username, &self.password) {
            (Some(username), Some(password)) => (username, password),
            _ => {
                return Err(ErpLinkError::TokenUnavailable(
                    "Service credentials not configured".to_string(),
                ))
            }
        };

        let now = chrono::Utc::now().timestamp();
        if let Some(cached) = self
            .store
            .find_token(tenant_id, integration_id, SERVICE_PRINCIPAL)?
            .filter(|cached| cached.valid_for(now, REUSE_MARGIN_SECS))
        {
            debug!(tenant_id, integration_id, "Reusing cached service token");
            return Ok(cached.token);
        }

        let login = self
            .client
            .login(tenant_id, integration_id, username, password)
            .await?;

        let now = chrono::Utc::now().timestamp();
        self.store.save_token(
            &CachedToken {
                tenant_id: tenant_id.to_string(),
                integration_id,
                principal: SERVICE_PRINCIPAL.to_string(),
                token: login.token.clone(),
                expires_at: now + SERVICE_TOKEN_TTL_SECS,
            },
            now,
        )?;

        info!(tenant_id, integration_id, "Service account logged in to ERP");
        Ok(login.token)
    }
}

#[async_trait]
impl TokenProvider for ServiceSession {
    /// A still-valid token cached for `user_id` wins over the service token.
    async fn token(&self, tenant_id: &str, integration_id: u32, user_id: Option<&str>) -> Result<String> {
        if let Some(user_id) = user_id {
            let now = chrono::Utc::now().timestamp();
            if let Some(cached) = self
                .store
                .find_token(tenant_id, integration_id, &user_principal(user_id))?
                .filter(|cached| cached.valid_for(now, 0))
            {
                return Ok(cached.token);
            }
        }
        self.service_token(tenant_id, integration_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client, seed_device, serve, INTEGRATION_ID, TENANT};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Logins = Arc<AtomicUsize>;

    async fn session(username: Option<&str>, password: Option<&str>) -> (ServiceSession, Store, Logins) {
        let logins: Logins = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/users/login",
                post(|State(logins): State<Logins>, Json(body): Json<Value>| async move {
                    if body["UserName"] != "svc" {
                        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
                    }
                    let n = logins.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({"Token": format!("jwt-{}", n), "UserID": 1, "Title": "svc"}))
                        .into_response()
                }),
            )
            .with_state(logins.clone());

        let store = Store::in_memory().unwrap();
        seed_device(&store, TENANT, INTEGRATION_ID);
        let base_url = serve(router).await;
        let session = ServiceSession::new(
            client(&base_url, &store),
            store.clone(),
            username.map(str::to_string),
            password.map(str::to_string),
        );
        (session, store, logins)
    }

    fn service_token(store: &Store, token: &str, expires_at: i64) {
        store
            .save_token(
                &CachedToken {
                    tenant_id: TENANT.to_string(),
                    integration_id: INTEGRATION_ID,
                    principal: SERVICE_PRINCIPAL.to_string(),
                    token: token.to_string(),
                    expires_at,
                },
                0,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn logs_in_once_and_caches() {
        let (session, store, logins) = session(Some("svc"), Some("secret")).await;

        let first = session.token(TENANT, INTEGRATION_ID, None).await.unwrap();
        let second = session.token(TENANT, INTEGRATION_ID, None).await.unwrap();

        assert_eq!(first, "jwt-1");
        assert_eq!(second, "jwt-1");
        assert_eq!(logins.load(Ordering::SeqCst), 1);

        let cached = store
            .find_token(TENANT, INTEGRATION_ID, SERVICE_PRINCIPAL)
            .unwrap()
            .unwrap();
        let now = chrono::Utc::now().timestamp();
        assert!(cached.expires_at > now + 50 * 60);
        assert!(cached.expires_at <= now + 55 * 60);
    }

    #[tokio::test]
    async fn token_about_to_expire_is_refreshed() {
        let (session, store, logins) = session(Some("svc"), Some("secret")).await;
        service_token(&store, "old", chrono::Utc::now().timestamp() + 120);

        let token = session.token(TENANT, INTEGRATION_ID, None).await.unwrap();
        assert_eq!(token, "jwt-1");
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn valid_cached_token_is_reused() {
        let (session, store, logins) = session(Some("svc"), Some("secret")).await;
        service_token(&store, "cached", chrono::Utc::now().timestamp() + 30 * 60);

        let token = session.token(TENANT, INTEGRATION_ID, None).await.unwrap();
        assert_eq!(token, "cached");
        assert_eq!(logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn user_token_takes_precedence() {
        let (session, _, logins) = session(Some("svc"), Some("secret")).await;
        let now = chrono::Utc::now().timestamp();
        session
            .cache_user_token(TENANT, INTEGRATION_ID, "u1", "user-jwt", now + 60)
            .unwrap();
        session
            .cache_user_token(TENANT, INTEGRATION_ID, "u2", "stale-jwt", now - 60)
            .unwrap();

        assert_eq!(
            session.token(TENANT, INTEGRATION_ID, Some("u1")).await.unwrap(),
            "user-jwt"
        );
        assert_eq!(logins.load(Ordering::SeqCst), 0);

        // Expired user token falls back to the service account
        assert_eq!(
            session.token(TENANT, INTEGRATION_ID, Some("u2")).await.unwrap(),
            "jwt-1"
        );
    }

    #[tokio::test]
    async fn missing_credentials_fail_closed() {
        let (session, _, logins) = session(Some("svc"), None).await;
        let err = session.token(TENANT, INTEGRATION_ID, None).await.unwrap_err();
        assert_eq!(err.kind(), "token_unavailable");
        assert_eq!(logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_login_is_an_erp_error() {
        let (session, store, _) = session(Some("intruder"), Some("secret")).await;
        let err = session.token(TENANT, INTEGRATION_ID, None).await.unwrap_err();
        assert!(matches!(err, ErpLinkError::Erp { status: 401, .. }));
        assert!(store
            .find_token(TENANT, INTEGRATION_ID, SERVICE_PRINCIPAL)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn static_token_is_returned_as_is() {
        let provider = StaticToken::new("fixed");
        assert_eq!(provider.token("any", 1, Some("u")).await.unwrap(), "fixed");
    }
}
