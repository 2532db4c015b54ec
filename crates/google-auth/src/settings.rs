//! Authentication settings record and its persisting store
//!
//! `AuthSettings` is the host-owned record the credential manager mutates.
//! `SettingsStore` wraps it in a Mutex so token, refresh token and expiry
//! are always written together, and persists after every mutation when it
//! is backed by a file. File writes use atomic temp-file + rename with 0600
//! permissions since the record holds OAuth tokens.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::EXPIRY_SKEW_MILLIS;
use crate::error::{Error, Result};

/// How the host reaches spreadsheet data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMethod {
    /// Unauthenticated CSV export; never needs a token
    #[default]
    #[serde(rename = "public-csv")]
    PublicCsv,
    /// Installed-app OAuth with PKCE over a loopback redirect
    #[serde(rename = "oauth-desktop")]
    OAuthDesktop,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::PublicCsv => "public-csv",
            AuthMethod::OAuthDesktop => "oauth-desktop",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "public-csv" => Ok(AuthMethod::PublicCsv),
            "oauth-desktop" => Ok(AuthMethod::OAuthDesktop),
            other => Err(Error::Configuration(format!(
                "unknown auth method {other:?} (expected public-csv or oauth-desktop)"
            ))),
        }
    }
}

/// Persisted authentication settings.
///
/// Token fields are meaningless unless `auth_method` is `OAuthDesktop`.
/// `token_expiry` is an absolute unix timestamp in milliseconds.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub client_id: String,
    /// Empty for public PKCE clients
    #[serde(default)]
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<u64>,
}

impl AuthSettings {
    /// The cached access token, if it is still usable at `now_millis`.
    ///
    /// Usable means `now < token_expiry - 60s`.
    pub fn fresh_access_token(&self, now_millis: u64) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let expiry = self.token_expiry?;
        (now_millis.saturating_add(EXPIRY_SKEW_MILLIS) < expiry).then_some(token)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_client_id(&self) -> bool {
        !self.client_id.trim().is_empty()
    }

    fn apply_tokens(&mut self, access: String, refresh: Option<String>, expiry: u64) {
        self.access_token = Some(access);
        if let Some(refresh) = refresh.filter(|r| !r.is_empty()) {
            self.refresh_token = Some(refresh);
        }
        self.token_expiry = Some(expiry);
    }

    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiry = None;
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |present: bool| if present { "[REDACTED]" } else { "<none>" };
        f.debug_struct("AuthSettings")
            .field("auth_method", &self.auth_method)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(!self.client_secret.is_empty()))
            .field("access_token", &redact(self.access_token.is_some()))
            .field("refresh_token", &redact(self.refresh_token.is_some()))
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

/// Thread-safe owner of the settings record.
///
/// The Mutex serializes mutations and the persistence that follows them,
/// so a reader never observes a token without its matching expiry.
pub struct SettingsStore {
    path: Option<PathBuf>,
    state: Mutex<AuthSettings>,
}

impl SettingsStore {
    /// Load settings from a JSON file.
    ///
    /// A missing file means first run: defaults are used and the file is
    /// created so later loads take the normal path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let settings = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading settings file: {e}")))?;
            let settings: AuthSettings = serde_json::from_str(&contents)
                .map_err(|e| Error::SettingsParse(format!("parsing settings file: {e}")))?;
            info!(path = %path.display(), method = %settings.auth_method, "loaded settings");
            settings
        } else {
            info!(path = %path.display(), "settings file not found, starting with defaults");
            let settings = AuthSettings::default();
            write_atomic(&path, &settings).await?;
            settings
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(settings),
        })
    }

    /// A store whose mutations are never written anywhere.
    pub fn in_memory(settings: AuthSettings) -> Self {
        Self {
            path: None,
            state: Mutex::new(settings),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clone of the current record.
    pub async fn snapshot(&self) -> AuthSettings {
        self.state.lock().await.clone()
    }

    /// Write a token set obtained from the token endpoint.
    ///
    /// `refresh` is only replaced when the provider issued a new one.
    pub async fn store_tokens(
        &self,
        access: String,
        refresh: Option<String>,
        expiry: u64,
    ) -> Result<()> {
        self.update(|state| {
            state.apply_tokens(access, refresh, expiry);
            Ok(())
        })
        .await?;
        debug!(expiry, "stored tokens");
        Ok(())
    }

    /// Like [`store_tokens`](Self::store_tokens), for the result of a
    /// refresh exchange made with `used_refresh`.
    ///
    /// Fails with [`Error::Unauthenticated`] and leaves the record untouched
    /// when the stored refresh token is no longer `used_refresh`, e.g. after
    /// a sign-out while the exchange was in flight.
    pub async fn store_refreshed_tokens(
        &self,
        used_refresh: &str,
        access: String,
        refresh: Option<String>,
        expiry: u64,
    ) -> Result<()> {
        self.update(|state| {
            if state.refresh_token.as_deref() != Some(used_refresh) {
                return Err(Error::Unauthenticated);
            }
            state.apply_tokens(access, refresh, expiry);
            Ok(())
        })
        .await?;
        debug!(expiry, "stored refreshed tokens");
        Ok(())
    }

    /// Drop access token, refresh token and expiry. Client identity is kept.
    pub async fn clear_tokens(&self) -> Result<()> {
        self.update(|state| {
            state.clear_tokens();
            Ok(())
        })
        .await?;
        debug!("cleared tokens");
        Ok(())
    }

    pub async fn set_auth_method(&self, method: AuthMethod) -> Result<()> {
        self.update(|state| {
            state.auth_method = method;
            Ok(())
        })
        .await
    }

    /// Set the OAuth client identity. The id is trimmed; the secret is kept
    /// verbatim (it may legitimately be empty).
    pub async fn set_client(&self, client_id: &str, client_secret: &str) -> Result<()> {
        self.update(|state| {
            state.client_id = client_id.trim().to_string();
            state.client_secret = client_secret.to_string();
            Ok(())
        })
        .await
    }

    /// Apply `change` to a copy of the record, persist the copy, then commit
    /// it. On any error the in-memory record is unchanged.
    async fn update(&self, change: impl FnOnce(&mut AuthSettings) -> Result<()>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn persist(&self, settings: &AuthSettings) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, settings).await,
            None => Ok(()),
        }
    }
}

/// Write settings to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target so a crash mid-write never leaves a truncated file.
async fn write_atomic(path: &Path, settings: &AuthSettings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::SettingsParse(format!("serializing settings: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("settings path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".gsheet-settings.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp settings file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting settings file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp settings file: {e}")))?;

    debug!(path = %path.display(), "persisted settings");
    Ok(())
}
