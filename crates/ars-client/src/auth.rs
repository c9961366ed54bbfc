//! Bearer-authenticated HTTP with token refresh.
//!
//! Every request carries `Authorization: Bearer {access}`. A 401 triggers
//! one refresh against `{base}/auth/refresh/` and one retry of the original
//! request. Concurrent 401s share a single refresh: whoever takes the refresh
//! lock first performs it, and the rest see the rotated token and retry
//! straight away.
//!
//! The live connection reads [`TokenSource::access_token`] at every attempt,
//! so reconnects pick up refreshed tokens.

use std::sync::{PoisonError, RwLock};

use ars_core::Credential;
use ars_proto::Endpoints;
use reqwest::{Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::{config::HttpConfig, error::ClientError};

/// Anything that can supply the current access token.
pub trait TokenSource: Send + Sync + 'static {
    /// Current access token.
    fn access_token(&self) -> Credential;
}

impl TokenSource for Credential {
    fn access_token(&self) -> Credential {
        self.clone()
    }
}

/// Access and refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Tokens {
    /// Short-lived access token
    pub access: String,
    /// Long-lived refresh token, if the login produced one
    pub refresh: Option<String>,
}

impl std::fmt::Debug for Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokens")
            .field("access", &"<redacted>")
            .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// HTTP client that authenticates and refreshes on 401.
#[derive(Debug)]
pub struct AuthClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    tokens: RwLock<Tokens>,
    refresh_lock: Mutex<()>,
}

impl AuthClient {
    /// Create a client for `endpoints` starting from `tokens`.
    ///
    /// # Errors
    ///
    /// - `ClientError::Http` if the HTTP client cannot be built
    pub fn new(endpoints: Endpoints, tokens: Tokens, config: &HttpConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { http, endpoints, tokens: RwLock::new(tokens), refresh_lock: Mutex::new(()) })
    }

    /// Backend endpoints this client talks to.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Snapshot of the current tokens.
    pub fn tokens(&self) -> Tokens {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Authenticated GET returning the response body.
    ///
    /// # Errors
    ///
    /// - `ClientError::Unauthorized` if the token is rejected and cannot be
    ///   refreshed, or is rejected again after refreshing
    /// - `ClientError::Status` for any other non-success status
    /// - `ClientError::Http` if the request fails
    pub async fn get(&self, url: &Url) -> Result<Vec<u8>, ClientError> {
        let token = self.current_access();
        let mut response = self.send_get(url, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path = url.path(), "access token rejected, refreshing");
            self.refresh(&token).await?;

            response = self.send_get(url, &self.current_access()).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                warn!(path = url.path(), "rejected again after refresh");
                return Err(ClientError::Unauthorized);
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16() });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn send_get(&self, url: &Url, token: &str) -> Result<Response, ClientError> {
        let response = self
            .http
            .get(url.clone())
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        Ok(response)
    }

    /// Rotate tokens unless someone already did since `stale` was read.
    async fn refresh(&self, stale: &str) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let tokens = self.tokens();
        if tokens.access != stale {
            debug!("token already refreshed");
            return Ok(());
        }

        let Some(refresh) = tokens.refresh else {
            return Err(ClientError::Unauthorized);
        };

        let response = self
            .http
            .post(self.endpoints.refresh())
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "token refresh rejected");
            return Err(ClientError::Unauthorized);
        }

        let body: RefreshResponse = response.json().await?;
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        tokens.access = body.access;
        if let Some(rotated) = body.refresh {
            tokens.refresh = Some(rotated);
        }

        info!("access token refreshed");
        Ok(())
    }

    fn current_access(&self) -> String {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).access.clone()
    }
}

impl TokenSource for AuthClient {
    fn access_token(&self) -> Credential {
        Credential::new(self.current_access())
    }
}

impl<T: TokenSource> TokenSource for std::sync::Arc<T> {
    fn access_token(&self) -> Credential {
        (**self).access_token()
    }
}
