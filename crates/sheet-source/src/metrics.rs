//! Row fetch counters
//!
//! - `gsheet_fetch_total` (counter): labels `strategy`, `outcome`

use crate::error::Result;

/// Record a finished fetch. `outcome` is `success` or the error's label.
pub fn record_fetch<T>(strategy: &str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.label(),
    };
    metrics::counter!(
        "gsheet_fetch_total",
        "strategy" => strategy.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
