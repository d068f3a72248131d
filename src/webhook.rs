//! Webhook Module
//!
//! This module provides functionality to send the run summary to a remote
//! webhook. It supports retries with exponential backoff and properly handles
//! timeouts. Requests are blocking, like the rest of the pipeline.
use crate::report::Summary;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Serialize;
use std::thread::sleep;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    summary: &'a Summary,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: &'static str,
}

/// WebhookHandler is responsible for sending analysis results to a webhook URL.
#[derive(Debug)]
pub struct WebhookHandler {
    client: Client,
    url: Url,
    max_retries: u32,
}

impl WebhookHandler {
    /// Creates a new WebhookHandler with the given URL, timeout, and retry count.
    pub fn new(url: impl AsRef<str>, timeout: Duration, max_retries: u32) -> Result<Self> {
        let url = Url::parse(url.as_ref()).context("Invalid webhook URL")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url,
            max_retries,
        })
    }

    /// Posts the summary as JSON.
    ///
    /// Retries are attempted with exponential backoff. Returns an error if all retries fail.
    pub fn send(&self, summary: &Summary) -> Result<()> {
        let payload = WebhookPayload {
            summary,
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
        };
        let mut last_error = None;
        for retry in 0..=self.max_retries {
            if retry > 0 {
                let delay = Duration::from_secs(2u64.pow(retry - 1));
                log::info!("Retrying webhook send in {:?}...", delay);
                sleep(delay);
            }
            match self.client.post(self.url.clone()).json(&payload).send() {
                Ok(response) => {
                    if response.status().is_success() {
                        log::info!("Successfully sent webhook (attempt {})", retry + 1);
                        return Ok(());
                    }
                    let status = response.status();
                    let body = response
                        .text()
                        .unwrap_or_else(|_| "Unable to read response body".to_string());
                    log::warn!(
                        "Webhook attempt {} failed: HTTP {} - Response: {}",
                        retry + 1,
                        status,
                        body
                    );
                    last_error = Some(format!("HTTP {} - {}", status, body));
                }
                Err(e) => {
                    log::warn!("Webhook attempt {} encountered error: {}", retry + 1, e);
                    if e.is_timeout() {
                        last_error = Some("timeout".to_string());
                    } else {
                        last_error = Some(e.to_string());
                    }
                }
            }
        }
        Err(anyhow::anyhow!(
            "Webhook failed after {} attempts: {:?}",
            self.max_retries + 1,
            last_error
        ))
    }
}
