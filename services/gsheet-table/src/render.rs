//! Block to table pipeline
//!
//! block text → `BlockConfig` → sheet targets → row source → rows →
//! `limit_rows` → `build_table`.
//!
//! The values API is used when the settings are in OAuth mode and the link
//! names a spreadsheet; everything else goes through the public CSV export.

use google_auth::{AuthMethod, CredentialManager};
use sheet_source::{PublicCsvSource, RowSource, SheetTargets, ValuesApiSource};
use tracing::{debug, info};

use crate::block::BlockConfig;
use crate::error::Result;
use crate::table::{Table, build_table, limit_rows};

/// A parsed block with its resolved targets, ready to fetch.
#[derive(Debug, Clone)]
pub struct PreparedBlock {
    pub config: BlockConfig,
    pub targets: SheetTargets,
}

impl PreparedBlock {
    /// Parse block text and resolve its sheet link. No I/O.
    pub fn prepare(source: &str, docs_base: &str) -> Result<Self> {
        let config = BlockConfig::parse(source)?;
        let targets = sheet_source::resolve_targets_with_base(
            docs_base,
            &config.sheet,
            config.range.as_deref(),
            config.sheet_name.as_deref(),
            config.gid.as_deref(),
        );
        Ok(Self { config, targets })
    }

    /// Link for opening the sheet in a browser.
    pub fn edit_url(&self) -> &str {
        &self.targets.edit_url
    }

    /// Fetch rows with the strategy the current settings call for and build
    /// the table.
    pub async fn fetch_table(&self, manager: &CredentialManager) -> Result<Table> {
        let source = select_source(manager, &self.targets).await?;
        info!(source = source.id(), "fetching rows");

        let rows = source.fetch_rows(&self.targets).await?;
        let rows = limit_rows(rows, self.config.headers, self.config.max_rows);
        let table = build_table(&rows, self.config.headers);
        debug!(
            header_cells = table.header_cells(),
            body_cells = table.body_cells(),
            "table built"
        );
        Ok(table)
    }
}

async fn select_source(
    manager: &CredentialManager,
    targets: &SheetTargets,
) -> Result<Box<dyn RowSource>> {
    let settings = manager.settings().await;
    let http = manager.http_client().clone();

    if settings.auth_method == AuthMethod::OAuthDesktop && targets.reference.is_some() {
        let token = manager.ensure_valid_access_token().await?;
        return Ok(Box::new(ValuesApiSource::new(
            http,
            manager.endpoints().sheets_api_base.clone(),
            token,
        )));
    }
    Ok(Box::new(PublicCsvSource::new(http)))
}
