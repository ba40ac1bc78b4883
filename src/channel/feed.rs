use super::{Channel, Item, MEDIA_SIZE_UNKNOWN};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Directory name for a feed id: `:` becomes `_` and whitespace is removed
pub fn feed_dir_name(feed_id: &str) -> String {
    feed_id
        .replace(':', "_")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// A user-configured feed source and the channel built from it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Display name chosen by the user
    pub feed_name: String,
    /// Identifier chosen by the user, used for URLs and the output directory
    pub feed_id: String,
    /// Source URL (RSS/Atom document or playlist page)
    pub url: String,
    /// Accumulated channel state
    #[serde(default)]
    pub channel: Channel,
    /// Disabled feeds are skipped by bulk refresh
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FeedEntry {
    /// Create an enabled feed with an empty channel
    pub fn new(
        feed_name: impl Into<String>,
        feed_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            feed_name: feed_name.into(),
            feed_id: feed_id.into(),
            url: url.into(),
            channel: Channel::default(),
            enabled: true,
        }
    }

    /// URL- and filesystem-safe directory name derived from `feed_id`
    ///
    /// `:` becomes `_` and whitespace is removed.
    pub fn dir_name(&self) -> String {
        feed_dir_name(&self.feed_id)
    }

    /// Output directory of this feed below `feeds_dir`
    pub fn local_dir(&self, feeds_dir: &Path) -> PathBuf {
        feeds_dir.join(self.dir_name())
    }

    /// Path of the converted media file of `item`
    pub fn local_media_path(&self, feeds_dir: &Path, item: &Item) -> PathBuf {
        self.local_dir(feeds_dir)
            .join(format!("{}.mp3", item.video_id()))
    }

    /// Merge a freshly resolved channel
    pub fn update(&mut self, channel: Channel) {
        self.channel.update(channel);
    }

    /// Sync `media_size` of every item with the files on disk
    ///
    /// Returns true if any item changed.
    pub fn update_local_data(&mut self, feeds_dir: &Path) -> bool {
        let local_dir = self.local_dir(feeds_dir);
        let mut changed = false;
        for item in self.channel.items_mut() {
            let path = local_dir.join(format!("{}.mp3", item.video_id()));
            let size = match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => i64::try_from(meta.len()).unwrap_or(i64::MAX),
                _ => MEDIA_SIZE_UNKNOWN,
            };
            if item.media_size != size {
                item.media_size = size;
                changed = true;
            }
        }
        changed
    }

    /// Append ` [Rn]` to the n-th repetition of a title
    ///
    /// Podcast clients collapse episodes with identical titles.
    ///
    /// Titles renamed by an earlier refresh stay as they are; a new repetition
    /// takes the next suffix not already in use.
    pub fn fix_repeated_titles(&mut self) {
        let mut in_use: HashSet<String> = self
            .channel
            .items()
            .iter()
            .map(|item| item.title.clone())
            .collect();
        let mut kept: HashSet<String> = HashSet::new();
        let mut next_suffix: HashMap<String, usize> = HashMap::new();

        for item in self.channel.items_mut() {
            if kept.insert(item.title.clone()) {
                continue;
            }
            let suffix = next_suffix.entry(item.title.clone()).or_insert(2);
            let renamed = loop {
                let candidate = format!("{} [R{}]", item.title, suffix);
                *suffix += 1;
                if !in_use.contains(&candidate) {
                    break candidate;
                }
            };
            in_use.insert(renamed.clone());
            kept.insert(renamed.clone());
            item.title = renamed;
        }
    }

    /// Items with their expected local media paths
    pub fn local_paths(&self, feeds_dir: &Path) -> Vec<(&Item, PathBuf)> {
        self.channel
            .items()
            .iter()
            .map(|item| (item, self.local_media_path(feeds_dir, item)))
            .collect()
    }

    /// Links of all known items
    pub fn item_links(&self) -> HashSet<String> {
        self.channel.items_links()
    }
}

/// Ordered list of feeds
///
/// Entries are identified by position. Duplicate `feed_id`s are allowed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedContainer {
    #[serde(default)]
    feeds: Vec<FeedEntry>,
}

impl FeedContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of feeds
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// True if there are no feeds
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Feed at `index`
    pub fn get(&self, index: usize) -> Option<&FeedEntry> {
        self.feeds.get(index)
    }

    /// Feed at `index` for modification
    pub fn get_mut(&mut self, index: usize) -> Option<&mut FeedEntry> {
        self.feeds.get_mut(index)
    }

    /// All feeds in order
    pub fn feeds(&self) -> &[FeedEntry] {
        &self.feeds
    }

    /// All feeds for modification
    pub fn feeds_mut(&mut self) -> &mut [FeedEntry] {
        &mut self.feeds
    }

    /// First feed with the given id
    pub fn find_by_id(&self, feed_id: &str) -> Option<&FeedEntry> {
        self.feeds.iter().find(|feed| feed.feed_id == feed_id)
    }

    /// First feed whose directory name matches
    pub fn find_by_dir_name(&self, dir_name: &str) -> Option<&FeedEntry> {
        self.feeds.iter().find(|feed| feed.dir_name() == dir_name)
    }

    /// Create and append a feed
    pub fn add_feed_new(
        &mut self,
        feed_name: impl Into<String>,
        feed_id: impl Into<String>,
        url: impl Into<String>,
    ) -> usize {
        self.add_feed(FeedEntry::new(feed_name, feed_id, url))
    }

    /// Append a feed, returning its index
    pub fn add_feed(&mut self, feed: FeedEntry) -> usize {
        self.feeds.push(feed);
        self.feeds.len() - 1
    }

    /// Replace the feed at `index`, returning the old entry
    pub fn replace_feed(&mut self, index: usize, feed: FeedEntry) -> Option<FeedEntry> {
        let slot = self.feeds.get_mut(index)?;
        Some(std::mem::replace(slot, feed))
    }

    /// Remove the feed at `index`
    pub fn remove_feed(&mut self, index: usize) -> Option<FeedEntry> {
        if index < self.feeds.len() {
            Some(self.feeds.remove(index))
        } else {
            None
        }
    }
}
