//! Spreadsheet link resolution and row fetching
//!
//! Resolves a pasted sheet link into edit and fetch targets, then reads a
//! rectangular matrix of cell strings through one of two `RowSource`s:
//! `PublicCsvSource` for link-shared sheets, `ValuesApiSource` when an
//! OAuth access token is available.

pub mod address;
pub mod classify;
pub mod error;
pub mod metrics;
pub mod parse;
pub mod public;
pub mod resolve;
pub mod values_api;

#[cfg(test)]
pub(crate) mod test_support;

pub use address::{build_address, resolve_sheet_title};
pub use error::{Error, Result};
pub use parse::parse_csv_rows;
pub use public::PublicCsvSource;
pub use resolve::{SheetReference, SheetTargets, resolve_targets, resolve_targets_with_base};
pub use values_api::ValuesApiSource;

use std::future::Future;
use std::pin::Pin;

/// Row-major cell text, padded to a rectangle.
pub type Rows = Vec<Vec<String>>;

/// A strategy for reading rows behind resolved sheet targets.
///
/// Uses `Pin<Box<dyn Future>>` return types so hosts can pick a source at
/// runtime behind `Box<dyn RowSource>`.
pub trait RowSource: Send + Sync {
    /// Identifier for logging and metrics (e.g. "public_csv", "values_api")
    fn id(&self) -> &str;

    /// Fetch all rows. Every row in the result has the same length.
    fn fetch_rows<'a>(
        &'a self,
        targets: &'a SheetTargets,
    ) -> Pin<Box<dyn Future<Output = Result<Rows>> + Send + 'a>>;
}
