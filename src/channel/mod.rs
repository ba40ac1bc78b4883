//! Channel data model
//!
//! A [`Channel`] is the canonical, deduplicated and date-sorted list of [`Item`]s
//! derived from one feed source. Channels are merged with [`Channel::update`], which
//! never replaces an item that is already known: local state such as `media_size`
//! and `enabled` survives every refresh.

mod feed;

pub use feed::{FeedContainer, FeedEntry, feed_dir_name};

use crate::utils::html_escape;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Sentinel stored in [`Item::media_size`] while no local file is known
pub const MEDIA_SIZE_UNKNOWN: i64 = -1;

/// Thumbnail image attached to an item
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Image URL
    pub url: String,
    /// Width in pixels, when the source reports it
    #[serde(default)]
    pub width: Option<u32>,
    /// Height in pixels, when the source reports it
    #[serde(default)]
    pub height: Option<u32>,
}

/// One episode of a channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Source-provided identifier, unique within a channel
    pub id: String,
    /// Link to the original media page
    pub link: String,
    /// Episode title (unescaped)
    pub title: String,
    /// Episode description
    #[serde(default)]
    pub summary: String,
    /// Publication instant, if the source provides one
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
    /// Size of the converted local file in bytes, [`MEDIA_SIZE_UNKNOWN`] if not downloaded
    #[serde(default = "default_media_size")]
    pub media_size: i64,
    /// Optional thumbnail
    #[serde(default)]
    pub thumbnail: Option<Thumbnail>,
    /// Disabled items are never converted or published again
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_media_size() -> i64 {
    MEDIA_SIZE_UNKNOWN
}

fn default_enabled() -> bool {
    true
}

impl Item {
    /// Create an enabled item with no local media
    pub fn new(id: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link: link.into(),
            title: String::new(),
            summary: String::new(),
            publish_date: None,
            media_size: MEDIA_SIZE_UNKNOWN,
            thumbnail: None,
            enabled: true,
        }
    }

    /// Identifier usable as a file name and a single URL path segment
    ///
    /// Every character outside `[A-Za-z0-9_-]` becomes `_`, so `yt:video:abc`
    /// maps to `yt_video_abc` and URL guids stay in one directory.
    pub fn video_id(&self) -> String {
        self.id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Absolute URL of the converted media as served by the feed server
    pub fn enclosure_url(&self, host: &str, feed_dir: &str) -> String {
        format!("http://{host}/feed/{feed_dir}/{}.mp3", self.video_id())
    }

    /// Title with HTML special characters escaped
    pub fn escaped_title(&self) -> String {
        html_escape(&self.title)
    }

    /// Size of the local file, if one has been recorded
    pub fn local_file_size(&self) -> Option<u64> {
        u64::try_from(self.media_size).ok()
    }

    /// Permanently exclude the item from conversion and generation
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Flip the enabled flag
    pub fn switch_enabled(&mut self) {
        self.enabled = !self.enabled;
    }
}

/// Ordered collection of items from one source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel title
    #[serde(default)]
    pub title: String,
    /// Channel home page
    #[serde(default)]
    pub link: String,
    /// Publication instant of the channel
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
    /// Items sorted by publish date, dateless items last
    #[serde(default)]
    items: Vec<Item>,
}

impl Channel {
    /// Create an empty channel
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            publish_date: None,
            items: Vec::new(),
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the channel has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in channel order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Mutable access to items
    ///
    /// Only fields that do not affect ordering or identity should be changed through this.
    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    /// Find an item by id
    pub fn find_item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Find an item by id for modification
    pub fn find_item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Position of the item with `id`
    pub fn item_index(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Add an item unless one with the same id exists
    ///
    /// Returns `false` and leaves the channel untouched for duplicates.
    pub fn add_item(&mut self, item: Item) -> bool {
        if self.find_item(&item.id).is_some() {
            return false;
        }
        self.items.push(item);
        self.sort_items();
        true
    }

    /// Remove the item with `id`, returning it
    pub fn remove_item(&mut self, id: &str) -> Option<Item> {
        let index = self.item_index(id)?;
        Some(self.items.remove(index))
    }

    /// Merge another channel into this one
    ///
    /// Header fields are taken from `other`. Items are added through the dedup
    /// rule, so items already present keep their local state.
    pub fn update(&mut self, other: Channel) {
        self.title = other.title;
        self.link = other.link;
        self.publish_date = other.publish_date;
        for item in other.items {
            if self.find_item(&item.id).is_none() {
                self.items.push(item);
            }
        }
        self.sort_items();
    }

    /// Enabled items in channel order
    pub fn items_enabled(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.enabled)
    }

    /// Links of all items, used to skip already known playlist entries
    pub fn items_links(&self) -> HashSet<String> {
        self.items.iter().map(|item| item.link.clone()).collect()
    }

    fn sort_items(&mut self) {
        // Vec::sort_by is stable, dateless items keep their relative order
        self.items
            .sort_by(|a, b| compare_dates(a.publish_date.as_ref(), b.publish_date.as_ref()));
    }
}

fn compare_dates(a: Option<&DateTime<Utc>>, b: Option<&DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
