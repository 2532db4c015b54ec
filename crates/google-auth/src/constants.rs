//! Google OAuth constants and endpoint configuration
//!
//! The flow targets exactly one authorization server and one read-only
//! scope. Endpoints are still configurable so tests and self-hosted
//! gateways can point the manager somewhere else.

use std::time::Duration;

/// Browser-facing authorization endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Base URL of the structured spreadsheets API
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

/// Base URL for human-facing sheet links and unauthenticated CSV exports
pub const DOCS_BASE: &str = "https://docs.google.com";

/// Read-only spreadsheets scope. The only scope this client ever requests.
pub const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

/// Loopback interface the callback listener binds to
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Path the provider redirects the browser to after consent
pub const CALLBACK_PATH: &str = "/oauth2/callback";

/// How long an interactive authorization waits for the browser callback,
/// measured from the moment the listener is bound.
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Access tokens are treated as stale this long before their real expiry.
pub const EXPIRY_SKEW_MILLIS: u64 = 60_000;

/// Random bytes behind the PKCE code verifier (64 base64url characters)
pub const VERIFIER_BYTES: usize = 48;

/// Random bytes behind the anti-CSRF `state` parameter
pub const STATE_BYTES: usize = 16;

/// Provider endpoints used by the credential manager and sheet sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub sheets_api_base: String,
    pub docs_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            sheets_api_base: SHEETS_API_BASE.to_string(),
            docs_base: DOCS_BASE.to_string(),
        }
    }
}
