//! Playlist pages to [`Channel`] through an [`InfoExtractor`]

use crate::channel::{Channel, Item, Thumbnail};
use crate::error::ResolutionError;
use crate::ytdlp::{ExtractInfo, InfoExtractor};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashSet, VecDeque};

/// Entries listed for the top-level page
const PLAYLIST_LISTING_LIMIT: usize = 999_999;
/// Entries listed when an entry turns out to be a nested playlist
const NESTED_LISTING_LIMIT: usize = 999;

/// List a playlist page and fetch metadata of up to `max_fetch` unknown entries
///
/// Entries whose link is in `known_links` are skipped without a lookup. An entry
/// that resolves to another playlist is replaced in place by its entries and does
/// not count against `max_fetch`. With `max_fetch == 0` the flat listing is used
/// without per-entry lookups. A page listing no entries at all is reported as
/// [`ResolutionError::NoEntries`].
pub async fn resolve_playlist(
    extractor: &dyn InfoExtractor,
    url: &str,
    known_links: &HashSet<String>,
    max_fetch: usize,
) -> Result<Channel, ResolutionError> {
    let mut info = extractor
        .fetch_info(url, PLAYLIST_LISTING_LIMIT)
        .await
        .map_err(|e| ResolutionError::ExtractorFailed(e.to_string()))?;

    if info.entries.as_ref().is_none_or(Vec::is_empty) {
        tracing::warn!(url, "playlist lists no entries");
        return Err(ResolutionError::NoEntries);
    }

    if max_fetch > 0 {
        let mut pending: VecDeque<ExtractInfo> = info.entries.take().unwrap_or_default().into();
        let mut fetched = Vec::new();

        while let Some(entry) = pending.pop_front() {
            let Some(link) = entry.link() else {
                continue;
            };
            if known_links.contains(link) {
                tracing::debug!(link, "skipping known entry");
                continue;
            }

            tracing::info!(link, "fetching entry metadata");
            let details = match extractor.fetch_info(link, NESTED_LISTING_LIMIT).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(link, error = %e, "entry lookup failed, skipping");
                    continue;
                }
            };

            if let Some(nested) = details.entries {
                for nested_entry in nested.into_iter().rev() {
                    pending.push_front(nested_entry);
                }
                continue;
            }

            fetched.push(details);
            if fetched.len() >= max_fetch {
                tracing::info!(max_fetch, "entry fetch limit reached");
                break;
            }
        }
        info.entries = Some(fetched);
    }

    Ok(convert_info_to_channel(info))
}

/// Build a channel from a (possibly expanded) info document
pub fn convert_info_to_channel(info: ExtractInfo) -> Channel {
    let mut channel = Channel::new(
        info.title.unwrap_or_default(),
        info.channel_url.unwrap_or_default(),
    );
    channel.publish_date = info
        .epoch
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0));

    for entry in info.entries.unwrap_or_default() {
        let Some(link) = entry.link().map(str::to_string) else {
            tracing::warn!(id = ?entry.id, "unable to add entry without link");
            continue;
        };
        let Some(id) = entry.id.as_deref() else {
            tracing::warn!(link, "unable to add entry without id");
            continue;
        };

        let mut item = Item::new(format!("yt:video:{id}"), link);
        item.title = entry.title.clone().unwrap_or_default();
        item.summary = entry.description.clone().unwrap_or_default();
        item.publish_date = entry
            .upload_date
            .as_deref()
            .and_then(parse_upload_date)
            .or_else(|| entry.epoch.and_then(|epoch| DateTime::from_timestamp(epoch, 0)));
        item.thumbnail = best_thumbnail(&entry);
        channel.add_item(item);
    }

    tracing::info!(items = channel.len(), "playlist converted");
    channel
}

/// `YYYYMMDD` at midnight UTC
fn parse_upload_date(value: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn best_thumbnail(entry: &ExtractInfo) -> Option<Thumbnail> {
    if let Some(url) = entry.thumbnail.as_deref().filter(|url| !url.is_empty()) {
        return Some(Thumbnail {
            url: url.to_string(),
            width: None,
            height: None,
        });
    }
    // the list is ordered by preference, largest last
    let last = entry.thumbnails.as_ref()?.last()?;
    Some(Thumbnail {
        url: last.url.clone()?,
        width: last.width,
        height: last.height,
    })
}
