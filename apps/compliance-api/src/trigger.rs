//! Scan trigger: forwards scan requests to the external workflow webhook
//!
//! Delivery runs on a spawned task. The caller gets its acknowledgement as
//! soon as the request validates; a failed delivery is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ApiError;

pub const DEFAULT_WEBHOOK_URL: &str = "http://n8n:5678/webhook/alpine";
pub const MAX_PAGES_LIMIT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Keyword,
    Url,
}

/// Scan request as posted by the dashboard
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub mode: ScanMode,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_marketplace")]
    pub marketplace: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u8,
}

fn default_marketplace() -> String {
    "de".to_string()
}

fn default_max_pages() -> u8 {
    3
}

/// Body delivered to the workflow webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    pub mode: ScanMode,
    pub keyword: Option<String>,
    pub url: Option<String>,
    pub marketplace: String,
    pub max_pages: u8,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl ScanRequest {
    pub fn into_payload(self) -> Result<ScanPayload, ApiError> {
        match self.mode {
            ScanMode::Keyword if !present(&self.keyword) => {
                return Err(ApiError::InvalidRequest(
                    "keyword mode requires a keyword".to_string(),
                ));
            }
            ScanMode::Url if !present(&self.url) => {
                return Err(ApiError::InvalidRequest(
                    "url mode requires a url".to_string(),
                ));
            }
            _ => {}
        }
        if !(1..=MAX_PAGES_LIMIT).contains(&self.max_pages) {
            return Err(ApiError::InvalidRequest(format!(
                "max_pages must be within 1-{} (got {})",
                MAX_PAGES_LIMIT, self.max_pages
            )));
        }

        Ok(ScanPayload {
            mode: self.mode,
            keyword: self.keyword,
            url: self.url,
            marketplace: self.marketplace.trim().to_lowercase(),
            max_pages: self.max_pages,
        })
    }
}

/// HTTP client for the workflow webhook
#[derive(Clone)]
pub struct ScanTrigger {
    client: reqwest::Client,
    webhook_url: Arc<str>,
}

impl ScanTrigger {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: Arc::from(webhook_url.into()),
        })
    }

    /// Webhook from `SCAN_WEBHOOK_URL`, falling back to the default workflow address
    pub fn from_env(timeout: Duration) -> anyhow::Result<Self> {
        let url =
            std::env::var("SCAN_WEBHOOK_URL").unwrap_or_else(|_| DEFAULT_WEBHOOK_URL.to_string());
        Self::new(url, timeout)
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Deliver `payload` in the background
    pub fn fire(&self, payload: ScanPayload) -> JoinHandle<()> {
        let client = self.client.clone();
        let url = Arc::clone(&self.webhook_url);

        tokio::spawn(async move {
            debug!("Posting scan request to {}: {:?}", url, payload);
            let sent = client
                .post(url.as_ref())
                .json(&payload)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match sent {
                Ok(response) => info!(
                    "Scan request delivered ({} {:?}): {}",
                    payload.marketplace,
                    payload.mode,
                    response.status()
                ),
                Err(err) => warn!("Scan request to {} failed: {}", url, err),
            }
        })
    }
}
