//! Host error types
//!
//! Display strings are shown to the user verbatim in place of a table.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing `sheet` URL in gsheet block.")]
    MissingSheet,

    #[error("Invalid `{key}` value in gsheet block: {value}")]
    InvalidNumber { key: &'static str, value: String },

    #[error(transparent)]
    Fetch(#[from] sheet_source::Error),
}

impl From<google_auth::Error> for Error {
    fn from(err: google_auth::Error) -> Self {
        Error::Fetch(err.into())
    }
}

/// Result alias using host Error
pub type Result<T> = std::result::Result<T, Error>;
