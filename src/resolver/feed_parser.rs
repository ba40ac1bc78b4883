//! RSS 2.0 and Atom documents to [`Channel`]

use crate::channel::{Channel, Item, Thumbnail};
use crate::error::ResolutionError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Parse a feed document, trying RSS first and Atom second
///
/// A document that is neither is [`ResolutionError::Malformed`]. An empty but
/// well-formed feed is a valid, empty channel.
pub fn parse_feed_content(content: &str) -> Result<Channel, ResolutionError> {
    let rss_error = match parse_as_rss(content) {
        Ok(channel) => return Ok(channel),
        Err(e) => e,
    };
    parse_as_atom(content).map_err(|atom_error| {
        ResolutionError::Malformed(format!("not RSS ({rss_error}), not Atom ({atom_error})"))
    })
}

fn parse_as_rss(content: &str) -> Result<Channel, rss::Error> {
    let source = content.parse::<rss::Channel>()?;

    let mut channel = Channel::new(source.title(), source.link());
    channel.publish_date = source
        .pub_date()
        .or(source.last_build_date())
        .and_then(parse_date);

    for entry in source.items() {
        let link = entry.link().unwrap_or_default();
        let id = entry
            .guid()
            .map(|guid| guid.value())
            .filter(|guid| !guid.is_empty())
            .unwrap_or(link);
        if id.is_empty() {
            tracing::debug!(title = ?entry.title(), "skipping RSS item without guid or link");
            continue;
        }

        let mut item = Item::new(id, link);
        item.title = entry.title().unwrap_or_default().to_string();
        item.summary = entry.description().unwrap_or_default().to_string();
        item.publish_date = entry.pub_date().and_then(parse_date);
        item.thumbnail = rss_thumbnail(entry.extensions());
        channel.add_item(item);
    }
    Ok(channel)
}

fn parse_as_atom(content: &str) -> Result<Channel, atom_syndication::Error> {
    let feed = atom_syndication::Feed::read_from(content.as_bytes())?;

    let link = feed
        .links()
        .iter()
        .find(|link| link.rel() == "alternate")
        .or(feed.links().first())
        .map(|link| link.href())
        .unwrap_or_default();
    let mut channel = Channel::new(feed.title().as_str(), link);
    channel.publish_date = Some(feed.updated().with_timezone(&Utc));

    for entry in feed.entries() {
        let link = entry
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .or(entry.links().first())
            .map(|link| link.href())
            .unwrap_or_default();

        let mut item = Item::new(entry.id(), link);
        item.title = entry.title().as_str().to_string();
        item.summary = entry
            .summary()
            .map(|s| s.as_str().to_string())
            .or_else(|| atom_media_description(entry.extensions()))
            .unwrap_or_default();
        item.publish_date = Some(
            entry
                .published()
                .unwrap_or(entry.updated())
                .with_timezone(&Utc),
        );
        item.thumbnail = atom_thumbnail(entry.extensions());
        channel.add_item(item);
    }
    Ok(channel)
}

/// RFC 2822 as used by RSS, RFC 3339 as a fallback for sloppy feeds
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn thumbnail_from_attrs(attrs: &BTreeMap<String, String>) -> Option<Thumbnail> {
    let url = attrs.get("url").filter(|url| !url.is_empty())?;
    Some(Thumbnail {
        url: url.clone(),
        width: attrs.get("width").and_then(|w| w.parse().ok()),
        height: attrs.get("height").and_then(|h| h.parse().ok()),
    })
}

// media:thumbnail appears directly on the item or nested in media:group
fn rss_thumbnail(extensions: &rss::extension::ExtensionMap) -> Option<Thumbnail> {
    let media = extensions.get("media")?;
    let direct = media.get("thumbnail").and_then(|found| found.first());
    let grouped = media
        .get("group")
        .and_then(|groups| groups.first())
        .and_then(|group| group.children().get("thumbnail"))
        .and_then(|found| found.first());
    direct.or(grouped).and_then(|ext| thumbnail_from_attrs(ext.attrs()))
}

fn atom_thumbnail(extensions: &atom_syndication::extension::ExtensionMap) -> Option<Thumbnail> {
    let media = extensions.get("media")?;
    let direct = media.get("thumbnail").and_then(|found| found.first());
    let grouped = media
        .get("group")
        .and_then(|groups| groups.first())
        .and_then(|group| group.children().get("thumbnail"))
        .and_then(|found| found.first());
    direct.or(grouped).and_then(|ext| thumbnail_from_attrs(ext.attrs()))
}

// YouTube puts the video description in media:group/media:description
fn atom_media_description(extensions: &atom_syndication::extension::ExtensionMap) -> Option<String> {
    extensions
        .get("media")?
        .get("group")?
        .first()?
        .children()
        .get("description")?
        .first()?
        .value()
        .map(str::to_string)
}
