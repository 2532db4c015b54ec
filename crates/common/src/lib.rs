//! Types shared by the gsheet-table crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
