//! Fetch failure classification
//!
//! A shared-with-nobody sheet does not fail cleanly: the provider answers
//! 200 with a sign-in page. Bodies that open like an HTML document are
//! therefore treated as failures even on a success status.

use reqwest::StatusCode;

use crate::error::Error;

/// True when the body starts (after leading whitespace) with `<!doctype`
/// or `<html`, case-insensitively.
pub fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().as_bytes();
    starts_with_ignore_case(head, b"<!doctype") || starts_with_ignore_case(head, b"<html")
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Map a CSV response to an error, or `None` when it can be parsed.
pub fn classify_csv_response(status: StatusCode, body: &str) -> Option<Error> {
    if status.is_success() && !looks_like_html(body) {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::FORBIDDEN => Error::Forbidden,
        other => Error::NotCsv {
            status: other.as_u16(),
            reason: other.canonical_reason().unwrap_or_default().to_string(),
        },
    })
}
