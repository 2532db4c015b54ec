//! Error types for sheet resolution and row fetching

/// Errors from fetching rows out of a spreadsheet.
///
/// Display strings are user-facing; the host shows them in place of the
/// table it failed to load.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unauthorized: Please check your access token.")]
    Unauthorized,

    #[error("Forbidden: You do not have permission to access this sheet.")]
    Forbidden,

    /// Non-success status, or an HTML page where CSV was expected
    #[error("Got {status} {reason}; not CSV (is the sheet shared with this account?)")]
    NotCsv { status: u16, reason: String },

    #[error("{0}")]
    CsvParse(String),

    /// Structured error from the values API
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("No spreadsheet id found in sheet URL: {0}")]
    MissingSpreadsheetId(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error(transparent)]
    Auth(#[from] google_auth::Error),
}

impl Error {
    /// HTTP status behind the failure, where there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized => Some(401),
            Error::Forbidden => Some(403),
            Error::NotCsv { status, .. } | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Metric label for this failure.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Unauthorized => "unauthorized",
            Error::Forbidden => "forbidden",
            Error::NotCsv { .. } => "not_csv",
            Error::CsvParse(_) => "csv_parse",
            Error::Api { .. } => "api",
            Error::MissingSpreadsheetId(_) => "missing_id",
            Error::Http(_) => "http",
            Error::Auth(_) => "auth",
        }
    }
}

/// Result alias for sheet operations.
pub type Result<T> = std::result::Result<T, Error>;
