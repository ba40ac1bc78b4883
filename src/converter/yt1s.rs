//! yt1s web converter
//!
//! `api/ajaxSearch/index` returns the video id and a conversion key per mp3
//! quality. The key is then posted to `api/ajaxConvert/convert` until the
//! service reports `CONVERTED` together with the download link.

use super::{HumanDelay, MediaConverterBackend, download_to};
use crate::error::{ConversionError, Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const NAME: &str = "yt1s";

/// Maximum number of convert polls per link
const MAX_CONVERT_POLLS: u32 = 120;

/// Preferred mp3 quality key
const PREFERRED_QUALITY: &str = "256";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    mess: String,
    #[serde(default)]
    vid: Option<String>,
    #[serde(default)]
    links: Option<SearchLinks>,
}

#[derive(Debug, Deserialize)]
struct SearchLinks {
    #[serde(default)]
    mp3: BTreeMap<String, Mp3Format>,
}

#[derive(Clone, Debug, Deserialize)]
struct Mp3Format {
    k: String,
}

/// Backend for the yt1s service
#[derive(Clone, Debug)]
pub struct Yt1sBackend {
    http_client: reqwest::Client,
    base_url: String,
    delay: HumanDelay,
    poll_interval: Duration,
}

impl Yt1sBackend {
    /// Create a backend for the service at `base_url`
    ///
    /// Polls wait for `delay` when it is enabled and for `poll_interval` otherwise.
    pub fn new(
        http_client: reqwest::Client,
        base_url: &str,
        delay: HumanDelay,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            delay,
            poll_interval,
        }
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header(
                reqwest::header::REFERER,
                format!("{}/youtube-to-mp3", self.base_url),
            )
            .form(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(fail(format!(
                "{path} returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Look up the video id and the conversion key
    async fn search(&self, link: &str) -> Result<(String, String)> {
        let data = self
            .post_form("api/ajaxSearch/index", &[("q", link), ("vt", "mp3")])
            .await?;
        let search: SearchResponse = serde_json::from_value(data)?;

        if search.status != "ok" {
            return Err(fail(format!("search status '{}'", search.status)));
        }
        if !search.mess.is_empty() {
            // yt1s answers this way for premieres that are not public yet
            tracing::warn!(link, message = %search.mess, "yt1s refused the link, premiere?");
            return Err(fail(search.mess));
        }

        let vid = search.vid.ok_or_else(|| fail("missing video id"))?;
        let formats = search.links.map(|links| links.mp3).unwrap_or_default();
        let format = pick_mp3_format(&formats).ok_or_else(|| fail("no mp3 formats offered"))?;
        Ok((vid, format.k.clone()))
    }

    async fn wait_for_download_link(&self, vid: &str, key: &str) -> Result<String> {
        let mut previous: Option<Value> = None;

        for _ in 0..MAX_CONVERT_POLLS {
            if self.delay.is_enabled() {
                self.delay.pause().await;
            } else {
                tokio::time::sleep(self.poll_interval).await;
            }

            let data = self
                .post_form("api/ajaxConvert/convert", &[("vid", vid), ("k", key)])
                .await?;
            if previous.as_ref() == Some(&data) {
                continue;
            }

            let status = data.get("status").and_then(Value::as_str).unwrap_or("");
            if status != "ok" {
                return Err(fail(format!("convert status '{status}'")));
            }
            match data.get("c_status").and_then(Value::as_str) {
                Some("CONVERTING") => {
                    tracing::debug!(vid, "yt1s conversion in progress");
                }
                Some("CONVERTED") => {
                    return data
                        .get("dlink")
                        .and_then(Value::as_str)
                        .filter(|link| !link.is_empty())
                        .map(str::to_string)
                        .ok_or_else(|| fail("missing download link"));
                }
                other => {
                    return Err(fail(format!("unexpected conversion state {other:?}")));
                }
            }
            previous = Some(data);
        }

        Err(fail("timed out waiting for conversion"))
    }
}

#[async_trait]
impl MediaConverterBackend for Yt1sBackend {
    async fn try_convert(&self, link: &str, output: &Path) -> Result<()> {
        let (vid, key) = self.search(link).await?;
        self.delay.pause().await;

        let download_link = self.wait_for_download_link(&vid, &key).await?;
        download_to(&self.http_client, NAME, &download_link, output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// Prefer 256 kbit/s, otherwise the first offered quality
fn pick_mp3_format(formats: &BTreeMap<String, Mp3Format>) -> Option<&Mp3Format> {
    formats
        .get(PREFERRED_QUALITY)
        .or_else(|| formats.values().next())
}

fn fail(reason: impl Into<String>) -> Error {
    ConversionError::backend(NAME, reason).into()
}
