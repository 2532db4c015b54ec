//! Authenticated values API source
//!
//! Resolves the tab title, builds an A1 address and reads formatted cell
//! values row by row with a bearer token.

use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::address::{build_address, resolve_sheet_title};
use crate::error::{Error, Result};
use crate::metrics::record_fetch;
use crate::parse::pad_rows;
use crate::resolve::SheetTargets;
use crate::{RowSource, Rows};

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Map a non-success API response to its structured error message.
pub(crate) fn api_error(status: StatusCode, body: &str) -> Error {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Sheets API request failed ({})", status.as_u16()));
    Error::Api {
        status: status.as_u16(),
        message,
    }
}

/// Reads a sheet through the values endpoint with an access token.
pub struct ValuesApiSource {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl ValuesApiSource {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, token: String) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            token,
        }
    }

    async fn fetch(&self, targets: &SheetTargets) -> Result<Rows> {
        let reference = targets
            .reference
            .as_ref()
            .ok_or_else(|| Error::MissingSpreadsheetId(targets.edit_url.clone()))?;

        let title = resolve_sheet_title(
            &self.client,
            &self.api_base,
            &reference.spreadsheet_id,
            &self.token,
            reference.gid.as_deref(),
            reference.sheet_name.as_deref(),
        )
        .await?;
        let address = build_address(&title, reference.range.as_deref());
        debug!(
            spreadsheet_id = %reference.spreadsheet_id,
            address = %address,
            "reading values"
        );

        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base.trim_end_matches('/'),
            urlencoding::encode(&reference.spreadsheet_id),
            urlencoding::encode(&address)
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Http(format!("values request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading values response: {e}")))?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let range: ValueRange = serde_json::from_str(&body).map_err(|e| Error::Api {
            status: status.as_u16(),
            message: format!("invalid values response: {e}"),
        })?;
        let rows = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        Ok(pad_rows(rows))
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl RowSource for ValuesApiSource {
    fn id(&self) -> &str {
        "values_api"
    }

    fn fetch_rows<'a>(
        &'a self,
        targets: &'a SheetTargets,
    ) -> Pin<Box<dyn Future<Output = Result<Rows>> + Send + 'a>> {
        Box::pin(async move {
            let result = self.fetch(targets).await;
            record_fetch(self.id(), &result);
            result
        })
    }
}
