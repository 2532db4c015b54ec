//! Error types for credential management and the authorization flow

/// Errors from credential management and the interactive authorization flow.
///
/// `Clone` so a single coalesced refresh outcome can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Settings must be fixed by the user (wrong method, missing client id)
    #[error("{0}")]
    Configuration(String),

    /// No refresh token yet; the interactive authorization has to run first
    #[error("Not authorized. Please sign in to Google first.")]
    Unauthenticated,

    #[error("Auth timeout (no callback received).")]
    AuthTimeout,

    /// State mismatch, missing code, or a provider-side denial
    #[error("invalid authorization callback: {0}")]
    InvalidCallback(String),

    /// Token endpoint rejected the exchange; message is user-facing guidance
    /// or the provider's own description.
    #[error("{0}")]
    ProviderExchange(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("settings parse error: {0}")]
    SettingsParse(String),

    #[error("failed to open browser: {0}")]
    Browser(String),

    #[error("loopback listener error: {0}")]
    Listener(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
