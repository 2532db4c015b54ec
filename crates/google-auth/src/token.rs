//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (end of the interactive PKCE flow)
//! 2. Refresh-token exchange (when the cached access token goes stale)
//!
//! Both POST form-encoded bodies with different grant types. An empty
//! client secret is omitted from the form rather than sent as `""`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Successful token endpoint response.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts it to an absolute unix millisecond instant when storing.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only issued on first consent (or with `prompt=consent`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Error body shape returned by the provider on non-success statuses.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth client identity sent with every token request.
#[derive(Clone, Copy)]
pub struct ClientCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

impl<'a> ClientCredentials<'a> {
    fn append_to<'f>(&self, form: &mut Vec<(&'static str, &'f str)>)
    where
        'a: 'f,
    {
        form.push(("client_id", self.client_id));
        let secret = self.client_secret.trim();
        if !secret.is_empty() {
            form.push(("client_secret", secret));
        }
    }
}

/// Exchange an authorization code for tokens.
///
/// The `redirect_uri` must be the exact loopback URI used in the
/// authorization request, and `verifier` the session's PKCE verifier.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    credentials: ClientCredentials<'_>,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let mut form = Vec::with_capacity(6);
    credentials.append_to(&mut form);
    form.extend([
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", verifier),
    ]);

    let response = client
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading token exchange response: {e}")))?;

    if !status.is_success() {
        let message = provider_message(&body)
            .unwrap_or_else(|| format!("Token exchange failed ({})", status.as_u16()));
        debug!(status = status.as_u16(), "token exchange rejected");
        return Err(classify_exchange_error(message));
    }

    serde_json::from_str::<TokenResponse>(&body)
        .map_err(|e| Error::ProviderExchange(format!("invalid token response: {e}")))
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_url: &str,
    credentials: ClientCredentials<'_>,
    refresh: &str,
) -> Result<TokenResponse> {
    let mut form = Vec::with_capacity(4);
    credentials.append_to(&mut form);
    form.extend([("grant_type", "refresh_token"), ("refresh_token", refresh)]);

    let response = client
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading token refresh response: {e}")))?;

    if !status.is_success() {
        debug!(status = status.as_u16(), "token refresh rejected");
        return Err(Error::ProviderExchange(provider_message(&body).unwrap_or_else(
            || format!("Refresh failed ({})", status.as_u16()),
        )));
    }

    serde_json::from_str::<TokenResponse>(&body)
        .map_err(|e| Error::ProviderExchange(format!("invalid refresh response: {e}")))
}

/// Extract `error_description`, else `error`, from a provider error body.
fn provider_message(body: &str) -> Option<String> {
    let parsed: TokenErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .filter(|s| !s.is_empty())
        .or(parsed.error.filter(|s| !s.is_empty()))
}

/// Map a failed code exchange message to actionable guidance.
///
/// Web-type OAuth clients fail PKCE exchanges without a secret
/// (`invalid_client` / `client_secret` complaints); a redirect URI mismatch
/// means the two legs used different loopback URIs. Anything else is
/// surfaced unchanged.
pub fn classify_exchange_error(message: String) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("client_secret") || lower.contains("invalid_client") {
        return Error::ProviderExchange(
            "Looks like a Web OAuth client. Create a Desktop app client for PKCE (no client_secret)."
                .into(),
        );
    }
    if lower.contains("redirect_uri_mismatch") {
        return Error::ProviderExchange(
            "Redirect URI mismatch. Use the same loopback URI (http://127.0.0.1:<port>) for both steps."
                .into(),
        );
    }
    Error::ProviderExchange(message)
}
