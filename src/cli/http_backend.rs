use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;

use crate::models::{
    DumpParams, IngestSummary, PositionParams, ReferenceParams, RenameParams, RenamePlan,
    SrcLocation,
};

/// HTTP client backend that delegates query and index operations to a
/// running `svindex` daemon.
pub struct HttpQueryBackend {
    client: Client,
    base_url: String,
}

impl HttpQueryBackend {
    /// Create a new HTTP backend targeting the given base URL
    /// (e.g. "http://127.0.0.1:7878").
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn definition(&self, params: PositionParams) -> Result<Option<SrcLocation>> {
        self.post_json("/v1/definition", &params)
    }

    pub fn references(&self, params: ReferenceParams) -> Result<Vec<SrcLocation>> {
        self.post_json("/v1/references", &params)
    }

    pub fn rename(&self, params: RenameParams) -> Result<Option<RenamePlan>> {
        self.post_json("/v1/rename", &params)
    }

    pub fn completion(&self, params: PositionParams) -> Result<Vec<String>> {
        self.post_json("/v1/completion", &params)
    }

    /// Trigger a full rebuild on the daemon.
    pub fn reindex(&self) -> Result<IngestSummary> {
        let url = self.url_for("/v1/reindex");
        let response = self
            .client
            .post(&url)
            .send()
            .with_context(|| format!("failed to send request to {}", url))?
            .error_for_status()
            .with_context(|| format!("server returned error for {}", url))?;
        response
            .json()
            .context("failed to decode JSON response from server")
    }

    /// Ask the daemon to serialize its live store.
    pub fn dump(&self, params: DumpParams) -> Result<DumpParams> {
        self.post_json("/v1/dump", &params)
    }

    fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = self.url_for(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .with_context(|| format!("failed to send request to {}", url))?
            .error_for_status()
            .with_context(|| format!("server returned error for {}", url))?;

        response
            .json::<R>()
            .context("failed to decode JSON response from server")
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
