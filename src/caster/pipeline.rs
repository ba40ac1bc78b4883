//! Single-feed pipeline: fetch, convert, generate

use super::{FeedCaster, FeedUpdate};
use crate::availability::Availability;
use crate::channel::{FeedEntry, MEDIA_SIZE_UNKNOWN};
use crate::error::Result;
use crate::generator::{GenerateOptions, generate};

impl FeedCaster {
    /// Resolve the source of the feed at `index` and merge new items
    ///
    /// Nothing is converted or generated.
    pub async fn fetch_only(&self, index: usize) -> Result<()> {
        let mut entry = self.entry_at(index).await?;
        self.fetch_entry(&mut entry).await;
        if self.apply_update(FeedUpdate { index, entry }).await {
            self.notify();
        }
        Ok(())
    }

    /// Fetch, convert and generate the feed at `index`
    pub async fn refresh(&self, index: usize) -> Result<()> {
        let entry = self.entry_at(index).await?;
        let update = self.refresh_entry(index, entry).await;
        if self.apply_update(update).await {
            self.notify();
        }
        Ok(())
    }

    /// Run the whole pipeline on a detached copy of a feed
    pub(super) async fn refresh_entry(&self, index: usize, mut entry: FeedEntry) -> FeedUpdate {
        self.fetch_entry(&mut entry).await;
        self.download_items(&mut entry).await;
        if let Err(e) = self.generate_entry(&entry).await {
            tracing::error!(feed_id = %entry.feed_id, error = %e, "unable to generate rss");
        }
        FeedUpdate { index, entry }
    }

    /// Merge freshly resolved items into `entry`
    ///
    /// A source that resolves to nothing leaves the channel untouched.
    pub(super) async fn fetch_entry(&self, entry: &mut FeedEntry) {
        let known_links = entry.item_links();
        let channel = self
            .resolver
            .resolve(
                &entry.feed_id,
                &entry.url,
                &known_links,
                self.config.resolver.max_fetch,
            )
            .await;

        if channel.is_empty() && channel.title.is_empty() && channel.link.is_empty() {
            tracing::warn!(feed_id = %entry.feed_id, "nothing resolved, keeping last known channel");
            return;
        }

        let before = entry.channel.len();
        entry.update(channel);
        entry.fix_repeated_titles();
        tracing::info!(
            feed_id = %entry.feed_id,
            new_items = entry.channel.len() - before,
            items = entry.channel.len(),
            "feed fetched"
        );
    }

    /// Convert every enabled item that has no local media yet
    ///
    /// Items reported invalid are disabled for good; upcoming ones wait for
    /// the next refresh. Returns the number of converted items.
    pub(super) async fn download_items(&self, entry: &mut FeedEntry) -> usize {
        let feeds_dir = self.config.feeds_dir();
        let local_dir = entry.local_dir(&feeds_dir);
        let total = entry.channel.len();
        let mut converted = 0;

        for (position, item) in entry.channel.items_mut().iter_mut().enumerate() {
            if !item.enabled {
                tracing::debug!(feed_id = %entry.feed_id, title = %item.title, "item disabled, skipped");
                continue;
            }

            let path = local_dir.join(format!("{}.mp3", item.video_id()));
            if let Ok(meta) = tokio::fs::metadata(&path).await
                && meta.is_file()
            {
                item.media_size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
                continue;
            }

            match self.availability.check_availability(&item.link).await {
                Availability::Invalid => {
                    tracing::warn!(
                        feed_id = %entry.feed_id,
                        title = %item.title,
                        link = %item.link,
                        "media unavailable, disabling item"
                    );
                    item.disable();
                    item.media_size = MEDIA_SIZE_UNKNOWN;
                    continue;
                }
                Availability::Upcoming => {
                    tracing::info!(feed_id = %entry.feed_id, title = %item.title, "media upcoming, postponed");
                    continue;
                }
                Availability::Ok => {}
            }

            tracing::info!(
                feed_id = %entry.feed_id,
                item = position + 1,
                total,
                title = %item.title,
                link = %item.link,
                "converting media"
            );
            if !self.converter.convert(&item.link, &path).await {
                tracing::info!(feed_id = %entry.feed_id, title = %item.title, "conversion failed, retrying next refresh");
                item.media_size = MEDIA_SIZE_UNKNOWN;
                continue;
            }

            item.media_size = match tokio::fs::metadata(&path).await {
                Ok(meta) => i64::try_from(meta.len()).unwrap_or(i64::MAX),
                Err(_) => MEDIA_SIZE_UNKNOWN,
            };
            converted += 1;
        }
        converted
    }

    /// Write `<feed dir>/rss` for the current channel state
    pub(super) async fn generate_entry(&self, entry: &FeedEntry) -> Result<String> {
        let local_dir = entry.local_dir(&self.config.feeds_dir());
        generate(
            &entry.channel,
            &self.host,
            &entry.dir_name(),
            &local_dir,
            GenerateOptions::default(),
        )
        .await
    }
}
