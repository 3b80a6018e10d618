use super::{RowSink, sheet_range};
use crate::config::GoogleSheetsSection;
use crate::error::{Error, Result};
use crate::month::Month;
use async_trait::async_trait;
use google_sheets4::Sheets;
use google_sheets4::api::{Scope, ValueRange};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use tracing::info;
use yup_oauth2::ServiceAccountAuthenticator;

pub type SheetsHub = Sheets<HttpsConnector<HttpConnector>>;

/// Authenticate with the service-account key and build a Sheets hub.
pub async fn create_hub(cfg: &GoogleSheetsSection) -> Result<SheetsHub> {
    let key = yup_oauth2::read_service_account_key(&cfg.service_account_key)
        .await
        .map_err(|e| {
            Error::Auth(format!(
                "cannot read service account key {}: {e}",
                cfg.service_account_key.display()
            ))
        })?;

    let auth = ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| Error::Auth(e.to_string()))?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_webpki_roots()
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Sheets::new(client, auth))
}

/// Appends rows to the month's tab of a Google spreadsheet.
pub struct RemoteSheetSink {
    hub: SheetsHub,
    spreadsheet_id: String,
    range: String,
}

impl RemoteSheetSink {
    pub fn new(hub: SheetsHub, spreadsheet_id: impl Into<String>, month: Month) -> Self {
        Self {
            hub,
            spreadsheet_id: spreadsheet_id.into(),
            range: sheet_range(month.name()),
        }
    }
}

#[async_trait(?Send)]
impl RowSink for RemoteSheetSink {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn append_row(&mut self, row: &[String]) -> Result<()> {
        let request = ValueRange {
            values: Some(vec![
                row.iter().cloned().map(serde_json::Value::String).collect(),
            ]),
            ..Default::default()
        };

        let (_, response) = self
            .hub
            .spreadsheets()
            .values_append(request, &self.spreadsheet_id, &self.range)
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await?;

        let updated = response.updates.and_then(|u| u.updated_range);
        info!(range = %self.range, updated = ?updated, "Row appended to Google Sheet");
        Ok(())
    }
}
