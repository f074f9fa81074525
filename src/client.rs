use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{Config, ReplayPolicy};
use crate::error::ApiError;
use crate::request::{build_url, HttpTransport, ReqwestTransport, RequestDescriptor};
use crate::session::{FileSessionStore, Session, SessionStore, TokenPair};

pub const LOGIN_PATH: &str = "/login";
pub const REFRESH_PATH: &str = "/refresh-token";

/// Authenticated client for the records API.
///
/// Every call attaches the stored access token. A 401 triggers one exchange of
/// the refresh token for a new pair, after which the original request is
/// replayed once. Refreshes are funneled through a single guard so concurrent
/// 401s share one refresh instead of racing each other.
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn SessionStore>,
    replay: ReplayPolicy,
    refresh_guard: Mutex<()>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            store,
            replay: ReplayPolicy::default(),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Client talking to the configured server with the session file in the config dir
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let store = FileSessionStore::default_location()?;
        Ok(Self::new(
            config.base_url(),
            Arc::new(ReqwestTransport::default()),
            Arc::new(store),
        )
        .with_replay_policy(config.client.replay))
    }

    pub fn with_replay_policy(mut self, replay: ReplayPolicy) -> Self {
        self.replay = replay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> Result<Session, ApiError> {
        Ok(self.store.load()?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body)?;
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body)?;
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Exchange credentials for a session and persist it
    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = build_url(&self.base_url, LOGIN_PATH)?;
        let body = json!({ "identifier": identifier, "password": password });
        let request = RequestDescriptor::new(Method::POST, url).json_body(body.to_string());

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            tracing::info!(status = response.status, "login rejected");
            return Err(response.into_error());
        }

        let tokens: TokenPair = serde_json::from_str(&response.body)?;
        self.store.save(&tokens)?;
        tracing::info!("logged in");
        Ok(tokens)
    }

    /// Drop the persisted session. In-flight requests are left alone.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.clear()?;
        tracing::info!("logged out");
        Ok(())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Value, ApiError> {
        let url = build_url(&self.base_url, path)?;
        let mut replayed = false;

        loop {
            let access_token = self.store.load()?.access_token;
            let mut request = RequestDescriptor::new(method.clone(), url.as_str())
                .bearer(access_token.as_deref());
            if let Some(body) = &body {
                request = request.json_body(body.clone());
            }

            tracing::debug!(%method, %url, replayed, "sending request");
            let response = self.transport.send(request).await?;

            if response.is_success() {
                return response.json();
            }

            if response.status == 401 && !replayed {
                self.refresh_after_rejection(access_token.as_deref()).await?;
                if !self.replay.allows(&method) {
                    tracing::info!(%method, %url, "session refreshed; not replaying request");
                    return Err(response.into_error());
                }
                replayed = true;
                continue;
            }

            tracing::debug!(%method, %url, status = response.status, "request rejected");
            return Err(response.into_error());
        }
    }

    /// Make sure the store holds a session newer than `rejected_token`.
    ///
    /// Holds the refresh guard for the whole exchange. If another call already
    /// replaced the rejected token while this one waited, its result is reused.
    async fn refresh_after_rejection(&self, rejected_token: Option<&str>) -> Result<(), ApiError> {
        let _guard = self.refresh_guard.lock().await;

        let session = self.store.load()?;
        if session.access_token.is_some() && session.access_token.as_deref() != rejected_token {
            tracing::debug!("access token already refreshed by a concurrent request");
            return Ok(());
        }

        let Some(refresh_token) = session.refresh_token else {
            tracing::info!("no refresh token stored; session expired");
            self.expire_session();
            return Err(ApiError::SessionExpired);
        };

        match self.exchange_refresh_token(&refresh_token).await {
            Ok(tokens) => {
                self.store.save(&tokens)?;
                tracing::info!("access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed; session expired");
                self.expire_session();
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = build_url(&self.base_url, REFRESH_PATH)?;
        let body = json!({ "refresh_token": refresh_token });
        let request = RequestDescriptor::new(Method::POST, url).json_body(body.to_string());

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        Ok(serde_json::from_str(&response.body)?)
    }

    fn expire_session(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "could not clear expired session");
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("replay", &self.replay)
            .finish_non_exhaustive()
    }
}
