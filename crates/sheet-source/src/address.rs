//! A1 addresses and sheet title lookup for the values API

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::values_api::api_error;

/// Title used when the spreadsheet reports no sheets at all.
pub const DEFAULT_SHEET_TITLE: &str = "Sheet1";

/// Build an A1 address such as `'Q3 Data'!A1:C10`.
///
/// Titles containing whitespace, `:` or `!` are single-quoted, with embedded
/// quotes doubled.
pub fn build_address(title: &str, range: Option<&str>) -> String {
    let needs_quotes = title
        .chars()
        .any(|c| c.is_whitespace() || c == ':' || c == '!');
    let title = if needs_quotes {
        format!("'{}'", title.replace('\'', "''"))
    } else {
        title.to_string()
    };
    match range.filter(|r| !r.is_empty()) {
        Some(range) => format!("{title}!{range}"),
        None => title,
    }
}

#[derive(Debug, Default, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    #[serde(default)]
    properties: SheetProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: Option<serde_json::Value>,
    #[serde(default)]
    title: String,
}

impl SheetProperties {
    fn sheet_id_string(&self) -> Option<String> {
        match self.sheet_id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Resolve the title of the tab to read.
///
/// An explicit name wins without any request. Otherwise the spreadsheet's
/// tab list is fetched and the tab whose id equals `gid` is chosen, falling
/// back to the first tab, then to [`DEFAULT_SHEET_TITLE`].
pub async fn resolve_sheet_title(
    client: &reqwest::Client,
    api_base: &str,
    spreadsheet_id: &str,
    token: &str,
    gid: Option<&str>,
    sheet_name: Option<&str>,
) -> Result<String> {
    if let Some(name) = sheet_name.map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }

    let url = format!(
        "{}/v4/spreadsheets/{}",
        api_base.trim_end_matches('/'),
        urlencoding::encode(spreadsheet_id)
    );
    let response = client
        .get(&url)
        .query(&[("fields", "sheets.properties(sheetId,title)")])
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| Error::Http(format!("spreadsheet metadata request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading spreadsheet metadata: {e}")))?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }

    let metadata: SpreadsheetMetadata = serde_json::from_str(&body).unwrap_or_default();
    let gid = gid.filter(|g| !g.is_empty());
    let matched = gid.and_then(|gid| {
        metadata
            .sheets
            .iter()
            .find(|sheet| sheet.properties.sheet_id_string().as_deref() == Some(gid))
    });

    let title = matched
        .or_else(|| metadata.sheets.first())
        .map(|sheet| sheet.properties.title.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_SHEET_TITLE.to_string());
    debug!(spreadsheet_id, gid, title = %title, "resolved sheet title");
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn plain_titles_are_not_quoted() {
        assert_eq!(build_address("Sheet1", None), "Sheet1");
        assert_eq!(build_address("Sheet1", Some("A1:B2")), "Sheet1!A1:B2");
        assert_eq!(build_address("Sheet1", Some("")), "Sheet1");
    }

    #[test]
    fn significant_characters_force_quotes() {
        assert_eq!(build_address("Q3 Data", Some("A1:C10")), "'Q3 Data'!A1:C10");
        assert_eq!(build_address("a:b", None), "'a:b'");
        assert_eq!(build_address("Wow!", None), "'Wow!'");
        assert_eq!(build_address("Bob's tab", None), "'Bob''s tab'");
    }

    async fn metadata_server(body: serde_json::Value) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = axum::Router::new().route(
            "/v4/spreadsheets/{id}",
            get(move |headers: HeaderMap| {
                let body = body.clone();
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(headers["authorization"], "Bearer tok");
                    Json(body)
                }
            }),
        );
        (serve(app).await, hits)
    }

    fn two_tabs() -> serde_json::Value {
        serde_json::json!({"sheets":[
            {"properties":{"sheetId":0,"title":"Summary"}},
            {"properties":{"sheetId":456,"title":"Q3 Data"}}
        ]})
    }

    #[tokio::test]
    async fn explicit_name_skips_network() {
        let (base, hits) = metadata_server(two_tabs()).await;
        let client = reqwest::Client::new();
        let title = resolve_sheet_title(&client, &base, "abc", "tok", Some("456"), Some("  Raw "))
            .await
            .unwrap();
        assert_eq!(title, "Raw");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gid_selects_matching_tab() {
        let (base, hits) = metadata_server(two_tabs()).await;
        let client = reqwest::Client::new();
        let title = resolve_sheet_title(&client, &base, "abc", "tok", Some("456"), None)
            .await
            .unwrap();
        assert_eq!(title, "Q3 Data");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_or_missing_gid_uses_first_tab() {
        let (base, _) = metadata_server(two_tabs()).await;
        let client = reqwest::Client::new();
        let title = resolve_sheet_title(&client, &base, "abc", "tok", Some("999"), None)
            .await
            .unwrap();
        assert_eq!(title, "Summary");
        let title = resolve_sheet_title(&client, &base, "abc", "tok", None, Some(""))
            .await
            .unwrap();
        assert_eq!(title, "Summary");
    }

    #[tokio::test]
    async fn string_sheet_ids_still_match() {
        let (base, _) = metadata_server(serde_json::json!({"sheets":[
            {"properties":{"sheetId":"1","title":"First"}},
            {"properties":{"sheetId":"2","title":"Second"}}
        ]}))
        .await;
        let client = reqwest::Client::new();
        let title = resolve_sheet_title(&client, &base, "abc", "tok", Some("2"), None)
            .await
            .unwrap();
        assert_eq!(title, "Second");
    }

    #[tokio::test]
    async fn empty_metadata_uses_default_title() {
        let (base, _) = metadata_server(serde_json::json!({})).await;
        let client = reqwest::Client::new();
        let title = resolve_sheet_title(&client, &base, "abc", "tok", Some("0"), None)
            .await
            .unwrap();
        assert_eq!(title, DEFAULT_SHEET_TITLE);
    }

    #[tokio::test]
    async fn metadata_error_surfaces_api_message() {
        let app = axum::Router::new().route(
            "/v4/spreadsheets/{id}",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}})),
                )
            }),
        );
        let base = serve(app).await;
        let client = reqwest::Client::new();
        let err = resolve_sheet_title(&client, &base, "missing", "tok", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Requested entity was not found.");
        assert_eq!(err.status(), Some(404));
    }
}
