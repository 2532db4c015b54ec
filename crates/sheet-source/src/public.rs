//! Unauthenticated CSV source
//!
//! Fetches the resolved export/gviz URL with no credentials. Works for
//! sheets shared as "anyone with the link".

use std::future::Future;
use std::pin::Pin;

use reqwest::header::ACCEPT;
use tracing::debug;

use crate::classify::classify_csv_response;
use crate::error::{Error, Result};
use crate::metrics::record_fetch;
use crate::parse::parse_csv_rows;
use crate::resolve::SheetTargets;
use crate::{RowSource, Rows};

const CSV_ACCEPT: &str = "text/csv,text/plain,*/*";

/// Reads the public CSV export of a sheet.
pub struct PublicCsvSource {
    client: reqwest::Client,
}

impl PublicCsvSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<Rows> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, CSV_ACCEPT)
            .send()
            .await
            .map_err(|e| Error::Http(format!("CSV request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading CSV response: {e}")))?;
        debug!(status = status.as_u16(), bytes = text.len(), "CSV response");

        if let Some(err) = classify_csv_response(status, &text) {
            return Err(err);
        }
        parse_csv_rows(&text)
    }
}

impl RowSource for PublicCsvSource {
    fn id(&self) -> &str {
        "public_csv"
    }

    fn fetch_rows<'a>(
        &'a self,
        targets: &'a SheetTargets,
    ) -> Pin<Box<dyn Future<Output = Result<Rows>> + Send + 'a>> {
        Box::pin(async move {
            let result = self.fetch(&targets.fetch_url).await;
            record_fetch(self.id(), &result);
            result
        })
    }
}
