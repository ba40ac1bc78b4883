//! Podcast RSS generation
//!
//! Renders a [`Channel`] into an RSS 2.0 document whose enclosures point at
//! the converted media served by the feed server. The output is written by
//! hand rather than through a serializer so the element layout stays stable
//! for podcast clients with strict parsers (AntennaPod in particular).

use crate::channel::{Channel, Item};
use crate::error::Result;
use crate::utils::{html_escape, write_atomic};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

/// File name of the generated document inside the feed directory
pub const RSS_FILE_NAME: &str = "rss";

/// Channel description written into every generated feed
pub const CHANNEL_DESCRIPTION: &str = "YouTube channel converted to RSS by RSSCast service.";

const RFC822_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // character class mirrors what podcast descriptions put into URLs
    #[allow(clippy::expect_used)]
    Regex::new(r"https?:(?://|\\\\)+(?:[\w:#@%/;$()~?+,\-.<=\\&]|#!)*")
        .expect("link regex is valid")
});

/// Options controlling which items are emitted and whether the result is stored
#[derive(Clone, Copy, Debug)]
pub struct GenerateOptions {
    /// Skip items whose media file is missing
    pub check_local: bool,
    /// Write the document to `<local dir>/rss`
    pub store: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            check_local: true,
            store: true,
        }
    }
}

/// Format an instant the way RSS `pubDate` expects
pub fn rfc822(date: &DateTime<Utc>) -> String {
    date.format(RFC822_FORMAT).to_string()
}

/// Escape a URL for XML, rewriting the malformed `&sub;` entity first
///
/// Returns `None` when the URL needs no change.
pub fn fix_url(url: &str) -> Option<String> {
    static SUB_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"&sub;+").expect("sub regex is valid")
    });

    let fixed = html_escape(&SUB_REGEX.replace_all(url, "&sub"));
    if fixed == url { None } else { Some(fixed) }
}

/// Make an item description acceptable to strict podcast clients
///
/// Links are escaped with [`fix_url`] and a bare ` & ` becomes ` &amp; `.
pub fn fix_description(description: &str) -> String {
    let links_fixed = LINK_REGEX.replace_all(description, |caps: &regex::Captures<'_>| {
        let link = &caps[0];
        fix_url(link).unwrap_or_else(|| link.to_string())
    });
    links_fixed.replace(" & ", " &amp; ")
}

/// Size to announce in the enclosure of `item`
///
/// Uses the recorded size, then the file on disk, then 0.
fn enclosure_length(item: &Item, media_path: &Path) -> u64 {
    match item.local_file_size() {
        Some(size) if size > 0 => size,
        _ => std::fs::metadata(media_path).map(|m| m.len()).unwrap_or(0),
    }
}

fn render_item(out: &mut String, item: &Item, host: &str, feed_dir: &str, length: u64) {
    let thumbnail = match &item.thumbnail {
        Some(thumb) => {
            let mut node = format!("<media:thumbnail url=\"{}\"", html_escape(&thumb.url));
            if let Some(width) = thumb.width {
                let _ = write!(node, " width='{width}'");
            }
            if let Some(height) = thumb.height {
                let _ = write!(node, " height='{height}'");
            }
            node.push_str("/>");
            node
        }
        None => String::new(),
    };
    let pub_date = item.publish_date.as_ref().map(rfc822).unwrap_or_default();

    let _ = write!(
        out,
        r#"
        <item>
            <title>{title}</title>
            <link>{link}</link>
            <pubDate>{pub_date}</pubDate>
            <guid>{guid}</guid>
            {thumbnail}

            <description>{description}</description>

            <content:encoded></content:encoded>
            <enclosure url="{enclosure}" length="{length}" type="audio/mpeg"/>
        </item>
"#,
        title = item.escaped_title(),
        link = html_escape(&item.link),
        guid = html_escape(&item.id),
        description = fix_description(&item.summary),
        enclosure = item.enclosure_url(host, feed_dir),
    );
}

/// Render the RSS document of `channel`
///
/// Only enabled items are considered. With `check_local` set, items without a
/// file in `local_dir` are left out.
pub fn render_channel_rss(
    channel: &Channel,
    host: &str,
    feed_dir: &str,
    local_dir: &Path,
    check_local: bool,
) -> String {
    let mut items = String::new();
    for item in channel.items_enabled() {
        let media_path = local_dir.join(format!("{}.mp3", item.video_id()));
        if check_local && !media_path.is_file() {
            tracing::debug!(feed_dir, path = %media_path.display(), "media file missing, item skipped");
            continue;
        }
        let length = enclosure_length(item, &media_path);
        render_item(&mut items, item, host, feed_dir, length);
    }

    let title = html_escape(&channel.title);
    let link = html_escape(&channel.link);
    let last_build = channel.publish_date.as_ref().map(rfc822).unwrap_or_default();

    format!(
        r#"<rss version="2.0"
 xmlns:content="http://purl.org/rss/1.0/modules/content/"
 xmlns:media="http://search.yahoo.com/mrss/"
 xmlns:atom="http://www.w3.org/2005/Atom"
>
    <channel>
        <atom:link href="http://{host}/feed/{feed_dir}/{RSS_FILE_NAME}" rel="self" type="application/rss+xml" />
        <title>{title}</title>
        <link>{link}</link>
        <description>{CHANNEL_DESCRIPTION}</description>
        <lastBuildDate>{last_build}</lastBuildDate>
        <copyright></copyright>
        <image>
            <url>http://{host}/rss-icon.png</url>
            <title>{title}</title>
            <link>{link}</link>
        </image>
{items}
    </channel>
</rss>
"#
    )
}

/// Render the RSS document and optionally store it as `<local_dir>/rss`
pub async fn generate(
    channel: &Channel,
    host: &str,
    feed_dir: &str,
    local_dir: &Path,
    options: GenerateOptions,
) -> Result<String> {
    let content = render_channel_rss(channel, host, feed_dir, local_dir, options.check_local);

    if options.store {
        let path = local_dir.join(RSS_FILE_NAME);
        tracing::info!(feed_dir, path = %path.display(), "writing generated rss");
        write_atomic(&path, content.as_bytes()).await?;
    }
    Ok(content)
}
