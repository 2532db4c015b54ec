//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client secret may come from GSHEET_CLIENT_SECRET; it is held
//! as a `Secret` and never read from the TOML.

use common::Secret;
use google_auth::Endpoints;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when neither `--config` nor GSHEET_CONFIG is given.
/// Unlike an explicit path it may be absent.
pub const DEFAULT_CONFIG_FILE: &str = "gsheet-table.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    /// JSON file holding the authentication settings
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Timeout for every outbound HTTP request
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// Provider endpoint overrides
#[derive(Debug, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_sheets_api_base")]
    pub sheets_api_base: String,
    #[serde(default = "default_docs_base")]
    pub docs_base: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            sheets_api_base: default_sheets_api_base(),
            docs_base: default_docs_base(),
        }
    }
}

impl EndpointsConfig {
    pub fn to_endpoints(&self) -> Endpoints {
        Endpoints {
            auth_url: self.auth_url.clone(),
            token_url: self.token_url.clone(),
            sheets_api_base: self.sheets_api_base.clone(),
            docs_base: self.docs_base.clone(),
        }
    }

    fn validate(&self) -> common::Result<()> {
        for (name, value) in [
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("sheets_api_base", &self.sheets_api_base),
            ("docs_base", &self.docs_base),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {value}"
                )));
            }
        }
        Ok(())
    }
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("gsheet-settings.json")
}

fn default_timeout() -> u64 {
    30
}

fn default_auth_url() -> String {
    google_auth::AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_url() -> String {
    google_auth::TOKEN_ENDPOINT.to_string()
}

fn default_sheets_api_base() -> String {
    google_auth::SHEETS_API_BASE.to_string()
}

fn default_docs_base() -> String {
    google_auth::DOCS_BASE.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Like [`Config::load`], but a missing [`DEFAULT_CONFIG_FILE`] yields
    /// the built-in defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path == Path::new(DEFAULT_CONFIG_FILE) && !path.exists() {
            return Self::parse("");
        }
        Self::load(path)
    }

    fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        config.endpoints.validate()?;

        if config.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.settings_path.as_os_str().is_empty() {
            return Err(common::Error::Config("settings_path must not be empty".into()));
        }

        config.client_secret = Secret::from_env("GSHEET_CLIENT_SECRET");

        Ok(config)
    }

    /// Resolve config file path from CLI arg or GSHEET_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("GSHEET_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}
