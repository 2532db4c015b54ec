//! Google OAuth credentials for read-only spreadsheet access
//!
//! Installed-app OAuth 2.0 with PKCE over a loopback redirect, plus the
//! persisted settings record the flow reads and writes. This crate has no
//! dependency on the host binary and is tested on its own.
//!
//! Credential flow:
//! 1. Host calls `CredentialManager::start_interactive_authorization()`
//! 2. `pkce::PkceSession::generate()` creates verifier, challenge and state
//! 3. `loopback::CallbackListener::bind()` opens `127.0.0.1:<ephemeral>`
//! 4. User consents via `pkce::build_authorization_url()` in a browser
//! 5. Callback code is exchanged with `token::exchange_code()`
//! 6. Tokens saved via `settings::SettingsStore::store_tokens()`
//! 7. Later calls to `ensure_valid_access_token()` refresh through
//!    `token::refresh_token()` once the access token goes stale

pub mod browser;
pub mod clock;
pub mod constants;
pub mod error;
pub mod loopback;
pub mod manager;
pub mod metrics;
pub mod pkce;
pub mod settings;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use browser::BrowserOpener;
pub use clock::{Clock, FakeClock, SystemClock};
pub use constants::*;
pub use error::{Error, Result};
pub use manager::{AuthorizationState, CredentialManager, ManagerOptions};
pub use settings::{AuthMethod, AuthSettings, SettingsStore};
pub use token::{TokenResponse, exchange_code, refresh_token};
