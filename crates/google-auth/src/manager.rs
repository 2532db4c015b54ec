//! Credential manager
//!
//! Owns the settings store and hands out bearer tokens. Two entry points
//! touch the network:
//!
//! - [`CredentialManager::ensure_valid_access_token`] refreshes a stale
//!   token. Concurrent callers share one in-flight refresh.
//! - [`CredentialManager::start_interactive_authorization`] runs the PKCE
//!   loopback flow end to end.
//!
//! Settings are only written after the exchange that produced them has
//! succeeded, and token, refresh token and expiry are written together.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common::Secret;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, info, warn};

use crate::browser::BrowserOpener;
use crate::clock::{Clock, SystemClock};
use crate::constants::{AUTHORIZATION_TIMEOUT, Endpoints};
use crate::error::{Error, Result};
use crate::loopback::CallbackListener;
use crate::metrics::{record_authorization, record_refresh};
use crate::pkce::{PkceSession, build_authorization_url};
use crate::settings::{AuthMethod, AuthSettings, SettingsStore};
use crate::token::{self, ClientCredentials};

type PendingRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Progress of the current (or last) interactive authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Idle,
    Listening,
    AwaitingCallback,
    Exchanging,
    Authorized,
    Failed,
}

impl AuthorizationState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthorizationState::Idle => "idle",
            AuthorizationState::Listening => "listening",
            AuthorizationState::AwaitingCallback => "awaiting_callback",
            AuthorizationState::Exchanging => "exchanging",
            AuthorizationState::Authorized => "authorized",
            AuthorizationState::Failed => "failed",
        }
    }
}

/// Knobs that tests and self-hosted setups override.
#[derive(Clone)]
pub struct ManagerOptions {
    pub endpoints: Endpoints,
    pub clock: Arc<dyn Clock>,
    /// Measured from the moment the loopback listener is bound
    pub authorization_timeout: Duration,
    /// Used for token requests instead of the stored secret; never persisted
    pub client_secret: Option<Secret<String>>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            clock: Arc::new(SystemClock),
            authorization_timeout: AUTHORIZATION_TIMEOUT,
            client_secret: None,
        }
    }
}

struct Inner {
    store: SettingsStore,
    http: reqwest::Client,
    endpoints: Endpoints,
    clock: Arc<dyn Clock>,
    authorization_timeout: Duration,
    client_secret: Option<Secret<String>>,
    pending_refresh: tokio::sync::Mutex<Option<PendingRefresh>>,
    authorization: Mutex<AuthorizationState>,
}

/// Cheaply cloneable handle; clones share the store and the refresh slot.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    pub fn new(store: SettingsStore, http: reqwest::Client) -> Self {
        Self::with_options(store, http, ManagerOptions::default())
    }

    pub fn with_options(store: SettingsStore, http: reqwest::Client, options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                http,
                endpoints: options.endpoints,
                clock: options.clock,
                authorization_timeout: options.authorization_timeout,
                client_secret: options.client_secret,
                pending_refresh: tokio::sync::Mutex::new(None),
                authorization: Mutex::new(AuthorizationState::Idle),
            }),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    /// HTTP client shared with the sheet sources.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub async fn settings(&self) -> AuthSettings {
        self.inner.store.snapshot().await
    }

    pub fn authorization_state(&self) -> AuthorizationState {
        *self
            .inner
            .authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// True only in OAuth mode with either a refresh token or a fresh
    /// access token. Public CSV mode never counts as authenticated.
    pub async fn is_authenticated(&self) -> bool {
        let settings = self.inner.store.snapshot().await;
        settings.auth_method == AuthMethod::OAuthDesktop
            && (settings.has_refresh_token()
                || settings
                    .fresh_access_token(self.inner.clock.now_millis())
                    .is_some())
    }

    /// Return a usable bearer token, refreshing it if it is stale.
    ///
    /// A fresh cached token is returned without I/O. Otherwise at most one
    /// refresh exchange is in flight; concurrent callers await the same
    /// outcome.
    pub async fn ensure_valid_access_token(&self) -> Result<String> {
        let settings = self.inner.store.snapshot().await;
        if let Some(token) = settings.fresh_access_token(self.inner.clock.now_millis()) {
            return Ok(token.to_string());
        }
        if settings.auth_method != AuthMethod::OAuthDesktop {
            return Err(Error::Configuration(
                "No access token in public-csv mode. Switch to OAuth (Desktop) and sign in.".into(),
            ));
        }
        if !settings.has_refresh_token() {
            return Err(Error::Unauthenticated);
        }
        if !settings.has_client_id() {
            return Err(Error::Configuration("Missing OAuth client ID.".into()));
        }
        self.coalesced_refresh().await
    }

    /// Same checks as [`ensure_valid_access_token`](Self::ensure_valid_access_token),
    /// discarding the token.
    pub async fn test_connection(&self) -> Result<()> {
        self.ensure_valid_access_token().await.map(|_| ())
    }

    /// Forget all tokens. No revocation call is made.
    pub async fn sign_out(&self) -> Result<()> {
        self.inner.store.clear_tokens().await?;
        info!("signed out");
        Ok(())
    }

    pub async fn set_auth_method(&self, method: AuthMethod) -> Result<()> {
        self.inner.store.set_auth_method(method).await?;
        info!(method = %method, "auth method updated");
        Ok(())
    }

    pub async fn set_client(&self, client_id: &str, client_secret: &str) -> Result<()> {
        self.inner.store.set_client(client_id, client_secret).await?;
        info!(
            has_secret = !client_secret.trim().is_empty(),
            "oauth client updated"
        );
        Ok(())
    }

    async fn coalesced_refresh(&self) -> Result<String> {
        let pending = {
            let mut slot = self.inner.pending_refresh.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    debug!("joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    // A refresh may have completed while this caller waited
                    // for the slot.
                    let settings = self.inner.store.snapshot().await;
                    if let Some(token) = settings.fresh_access_token(self.inner.clock.now_millis()) {
                        return Ok(token.to_string());
                    }

                    let inner = self.inner.clone();
                    let task = tokio::spawn(async move {
                        let result = inner.refresh_now().await;
                        inner.pending_refresh.lock().await.take();
                        result
                    });
                    let pending: PendingRefresh = async move {
                        task.await
                            .map_err(|e| Error::Internal(format!("refresh task failed: {e}")))?
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Run the interactive PKCE authorization.
    ///
    /// Binds the loopback listener, hands the authorization URL to `opener`,
    /// waits for the callback and exchanges the code. A failing opener is
    /// logged and the wait continues, since the user can still open the URL
    /// by hand.
    pub async fn start_interactive_authorization(&self, opener: &dyn BrowserOpener) -> Result<()> {
        let result = self.authorize(opener).await;
        let outcome = match &result {
            Ok(()) => "success",
            Err(Error::AuthTimeout) => "timeout",
            Err(Error::InvalidCallback(_)) => "invalid_callback",
            Err(Error::Configuration(_)) => "configuration",
            Err(Error::ProviderExchange(_)) => "exchange_failed",
            Err(_) => "error",
        };
        record_authorization(outcome);
        result
    }

    async fn authorize(&self, opener: &dyn BrowserOpener) -> Result<()> {
        let settings = self.inner.store.snapshot().await;
        if settings.auth_method != AuthMethod::OAuthDesktop {
            return Err(Error::Configuration(
                "Set the authentication method to OAuth (Desktop, PKCE) first.".into(),
            ));
        }
        if !settings.has_client_id() {
            return Err(Error::Configuration(
                "Missing Google OAuth client ID (Desktop).".into(),
            ));
        }
        let client_id = settings.client_id.trim();

        let mut attempt = AttemptGuard::start(&self.inner.authorization);
        let session = PkceSession::generate();
        let listener = CallbackListener::bind(&session.state).await?;
        let redirect_uri = listener.redirect_uri().to_string();

        let url = build_authorization_url(
            &self.inner.endpoints.auth_url,
            client_id,
            &redirect_uri,
            &session.challenge,
            &session.state,
        )?;
        attempt.advance(AuthorizationState::AwaitingCallback);
        info!(port = listener.port(), "waiting for authorization callback");
        if let Err(e) = opener.open(&url) {
            warn!(error = %e, "could not open browser; the authorization URL must be opened manually");
        }

        let code = listener.wait(self.inner.authorization_timeout).await?;

        attempt.advance(AuthorizationState::Exchanging);
        let credentials = ClientCredentials {
            client_id,
            client_secret: self.inner.client_secret(&settings),
        };
        let response = token::exchange_code(
            &self.inner.http,
            &self.inner.endpoints.token_url,
            credentials,
            &code,
            &redirect_uri,
            &session.verifier,
        )
        .await?;

        let expiry = self.inner.expiry_from(response.expires_in);
        self.inner
            .store
            .store_tokens(response.access_token, response.refresh_token, expiry)
            .await?;

        attempt.advance(AuthorizationState::Authorized);
        attempt.complete();
        info!(expiry, "authorization complete");
        Ok(())
    }
}

impl Inner {
    fn client_secret<'a>(&'a self, settings: &'a AuthSettings) -> &'a str {
        match &self.client_secret {
            Some(secret) => secret.expose(),
            None => &settings.client_secret,
        }
    }

    fn expiry_from(&self, expires_in_secs: u64) -> u64 {
        self.clock
            .now_millis()
            .saturating_add(expires_in_secs.saturating_mul(1000))
    }

    async fn refresh_now(&self) -> Result<String> {
        let settings = self.store.snapshot().await;
        let refresh = settings
            .refresh_token
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(Error::Unauthenticated)?;
        let credentials = ClientCredentials {
            client_id: settings.client_id.trim(),
            client_secret: self.client_secret(&settings),
        };

        debug!("refreshing access token");
        let response =
            match token::refresh_token(&self.http, &self.endpoints.token_url, credentials, refresh).await {
                Ok(response) => response,
                Err(e) => {
                    record_refresh("failure");
                    warn!(error = %e, "token refresh failed");
                    return Err(e);
                }
            };

        let expiry = self.expiry_from(response.expires_in);
        if let Err(e) = self
            .store
            .store_refreshed_tokens(
                refresh,
                response.access_token.clone(),
                response.refresh_token,
                expiry,
            )
            .await
        {
            record_refresh("discarded");
            warn!(error = %e, "refreshed token discarded");
            return Err(e);
        }
        record_refresh("success");
        info!(expiry, "access token refreshed");
        Ok(response.access_token)
    }
}

/// Tracks one authorization attempt. Dropping it before
/// [`complete`](AttemptGuard::complete) marks the attempt failed, which also
/// covers a caller abandoning the future mid-flow.
struct AttemptGuard<'a> {
    state: &'a Mutex<AuthorizationState>,
    completed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn start(state: &'a Mutex<AuthorizationState>) -> Self {
        let guard = Self {
            state,
            completed: false,
        };
        guard.set(AuthorizationState::Listening);
        guard
    }

    fn advance(&mut self, next: AuthorizationState) {
        self.set(next);
    }

    fn complete(mut self) {
        self.completed = true;
    }

    fn set(&self, next: AuthorizationState) {
        debug!(state = next.label(), "authorization state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.set(AuthorizationState::Failed);
        }
    }
}
