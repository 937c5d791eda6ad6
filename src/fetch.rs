//! Sheet service client
//!
//! Fetches raw document bytes and the read-only question schema for a sheet.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

use crate::error::{Result, WorkspaceError};
use crate::settings::Settings;

/// One question of the exam schema as served by the sheet service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionSchema {
    pub id: String,
    pub max_marks: f64,
    /// Page (1-based) the question's answer is on, when known
    #[serde(default)]
    pub page: Option<usize>,
}

/// Blocking HTTP client for the sheet service
#[derive(Clone)]
pub struct SheetClient {
    client: Client,
    settings: Settings,
}

impl SheetClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| WorkspaceError::fetch("http client", e))?;

        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    /// `GET` the raw document bytes for `sheet`
    pub fn fetch_document(&self, sheet: &str) -> Result<Vec<u8>> {
        let url = self.settings.document_url(sheet);
        debug!("Fetching document {sheet} from {url}");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, user_agent())
            .send()
            .map_err(|e| WorkspaceError::fetch(&url, e))?;

        if !response.status().is_success() {
            return Err(WorkspaceError::fetch(
                &url,
                format!("HTTP {}", response.status().as_u16()),
            ));
        }

        let bytes = response
            .bytes()
            .map_err(|e| WorkspaceError::fetch(&url, e))?;
        debug!("Fetched {} bytes for {sheet}", bytes.len());
        Ok(bytes.to_vec())
    }

    /// `GET` the question schema for `sheet`
    pub fn fetch_questions(&self, sheet: &str) -> Result<Vec<QuestionSchema>> {
        let url = self.settings.schema_url(sheet);
        debug!("Fetching question schema for {sheet} from {url}");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, user_agent())
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| WorkspaceError::fetch(&url, e))?;

        if !response.status().is_success() {
            return Err(WorkspaceError::fetch(
                &url,
                format!("HTTP {}", response.status().as_u16()),
            ));
        }

        response
            .json::<Vec<QuestionSchema>>()
            .map_err(|e| WorkspaceError::fetch(&url, e))
    }
}

fn user_agent() -> String {
    format!("inkgrade/{}", env!("CARGO_PKG_VERSION"))
}
