use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use sweeper_core::config::{ApiEndpoint, Credentials};
use sweeper_core::domain::{Page, WriteStatus};
use sweeper_core::error::SweepError;
use sweeper_core::ports::{RecordStore, Result};
use tracing::{debug, trace};

/// RecordStore over an Oracle REST Data Services (AutoREST) table endpoint
pub struct OrdsRecordStore {
    client: Client,
    resource_url: String,
    credentials: Credentials,
}

impl OrdsRecordStore {
    /// Creates a store for the table behind `endpoint`, authenticating with `credentials`
    pub fn new(endpoint: &ApiEndpoint, credentials: Credentials) -> Result<Self> {
        let resource_url = endpoint.resource_url()?;
        let client = Client::builder()
            .build()
            .map_err(|e| SweepError::Transport(Box::new(e)))?;

        debug!(resource = %resource_url, user = %credentials.username, "Configured ORDS record store");

        Ok(Self {
            client,
            resource_url,
            credentials,
        })
    }

    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    fn record_url(&self, id: i64) -> String {
        record_url(&self.resource_url, id)
    }
}

/// `{resource}{id}`; the resource URL already ends with `/`
pub fn record_url(resource_url: &str, id: i64) -> String {
    format!("{}{}", resource_url, id)
}

/// JSON body of the annotation PUT: `extra` carries the serialized note as a string
pub fn update_body(extra: &str) -> serde_json::Value {
    serde_json::json!({ "extra": extra })
}

fn transport(e: reqwest::Error) -> SweepError {
    SweepError::Transport(Box::new(e))
}

impl RecordStore for OrdsRecordStore {
    fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page> {
        let response = self
            .client
            .get(&self.resource_url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .map_err(transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SweepError::PageRejected {
                offset,
                status: status.as_u16(),
            });
        }

        let page = response.json::<Page>().map_err(|e| {
            if e.is_decode() {
                SweepError::Decode(e.to_string())
            } else {
                transport(e)
            }
        })?;

        trace!(offset, items = page.items.len(), has_more = page.has_more, "Fetched page");
        Ok(page)
    }

    fn delete_record(&self, id: i64) -> Result<WriteStatus> {
        let response = self
            .client
            .delete(self.record_url(id))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .map_err(transport)?;

        let status = response.status().as_u16();
        trace!(id, status, "DELETE");
        Ok(WriteStatus(status))
    }

    fn update_extra(&self, id: i64, extra: &str) -> Result<WriteStatus> {
        let body = serde_json::to_vec(&update_body(extra))?;
        let response = self
            .client
            .put(self.record_url(id))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(transport)?;

        let status = response.status().as_u16();
        trace!(id, status, "PUT");
        Ok(WriteStatus(status))
    }
}
