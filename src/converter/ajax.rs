//! Converters speaking the `ajax/download.php` + `ajax/progress.php` protocol
//!
//! loader.to and oceansaver share this protocol: a job is started with one
//! request and then polled until it yields a download URL.

use super::{MediaConverterBackend, download_to};
use crate::config::ConverterConfig;
use crate::error::{ConversionError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Backend for job-and-poll web converters
#[derive(Clone, Debug)]
pub struct AjaxProgressBackend {
    name: &'static str,
    http_client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    max_unchanged: u32,
}

impl AjaxProgressBackend {
    /// Create a backend for the service at `base_url`
    pub fn new(
        name: &'static str,
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        poll_interval: Duration,
        max_unchanged: u32,
    ) -> Self {
        Self {
            name,
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval,
            max_unchanged: max_unchanged.max(1),
        }
    }

    /// loader.to
    pub fn loader_to(http_client: reqwest::Client, config: &ConverterConfig) -> Self {
        Self::new(
            "loader.to",
            http_client,
            &config.loader_base_url,
            config.poll_interval(),
            config.poll_max_unchanged,
        )
    }

    /// oceansaver
    pub fn oceansaver(http_client: reqwest::Client, config: &ConverterConfig) -> Self {
        Self::new(
            "oceansaver",
            http_client,
            &config.oceansaver_base_url,
            config.poll_interval(),
            config.poll_max_unchanged,
        )
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.http_client.get(&url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(ConversionError::backend(
                self.name,
                format!("{path} returned HTTP {}", response.status().as_u16()),
            )
            .into());
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Start a conversion job, returning its id
    async fn start_job(&self, link: &str) -> Result<String> {
        let data = self
            .get_json("ajax/download.php", &[("format", "mp3"), ("url", link)])
            .await?;

        if success_code(&data) != Some(1) {
            return Err(self.fail("server refused the conversion"));
        }
        match data.get("id").and_then(json_string) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(self.fail("missing job id")),
        }
    }

    /// Poll the job until it reports a download URL
    async fn wait_for_download_url(&self, job_id: &str) -> Result<String> {
        let mut previous: Option<Value> = None;

        loop {
            let mut unchanged = 0;
            let data = loop {
                tokio::time::sleep(self.poll_interval).await;
                let data = self
                    .get_json("ajax/progress.php", &[("id", job_id)])
                    .await?;
                if previous.as_ref() != Some(&data) {
                    break data;
                }
                unchanged += 1;
                if unchanged >= self.max_unchanged {
                    return Err(self.fail("conversion stalled"));
                }
            };

            match success_code(&data) {
                Some(0) => {
                    tracing::debug!(backend = self.name, progress = %data, "conversion in progress");
                    previous = Some(data);
                }
                Some(1) => {
                    return data
                        .get("download_url")
                        .and_then(json_string)
                        .filter(|url| !url.is_empty())
                        .ok_or_else(|| self.fail("missing download url"));
                }
                _ => {
                    tracing::error!(backend = self.name, response = %data, "unhandled progress response");
                    return Err(self.fail("unexpected progress response"));
                }
            }
        }
    }

    fn fail(&self, reason: &str) -> crate::error::Error {
        ConversionError::backend(self.name, reason).into()
    }
}

#[async_trait]
impl MediaConverterBackend for AjaxProgressBackend {
    async fn try_convert(&self, link: &str, output: &Path) -> Result<()> {
        let job_id = self.start_job(link).await?;
        tracing::info!(backend = self.name, link, job_id, "waiting for conversion");

        let download_url = self.wait_for_download_url(&job_id).await?;
        download_to(&self.http_client, self.name, &download_url, output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Read `success` as an integer, accepting booleans and numeric strings
pub(super) fn success_code(data: &Value) -> Option<i64> {
    match data.get("success")? {
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
