//! File limit enforcement

use super::FeedCaster;
use crate::channel::MEDIA_SIZE_UNKNOWN;
use crate::error::Result;
use std::path::PathBuf;
use std::time::SystemTime;

struct LocalMedia {
    modified: SystemTime,
    path: PathBuf,
    feed_index: usize,
    item_id: String,
}

impl FeedCaster {
    /// Keep at most `keep` media files across all feeds
    ///
    /// The oldest files by modification time are deleted and their items
    /// disabled so they are not converted again. Returns true if anything
    /// was removed.
    pub async fn prune_old_files(&self, keep: usize) -> Result<bool> {
        let removed = self.prune_files(keep).await?;
        if removed {
            self.notify();
        }
        Ok(removed)
    }

    pub(super) async fn prune_files(&self, keep: usize) -> Result<bool> {
        let feeds_dir = self.config.feeds_dir();
        let mut feeds = self.feeds.write().await;

        let mut media = Vec::new();
        for (feed_index, feed) in feeds.feeds().iter().enumerate() {
            for (item, path) in feed.local_paths(&feeds_dir) {
                let Ok(meta) = tokio::fs::metadata(&path).await else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                media.push(LocalMedia {
                    modified: meta.modified()?,
                    path,
                    feed_index,
                    item_id: item.id.clone(),
                });
            }
        }

        if media.len() <= keep {
            tracing::info!(files = media.len(), limit = keep, "file limit not reached");
            return Ok(false);
        }

        // stable sort keeps feed order for equal timestamps
        media.sort_by_key(|entry| entry.modified);
        let remove_count = media.len() - keep;

        for entry in media.into_iter().take(remove_count) {
            let Some(feed) = feeds.get_mut(entry.feed_index) else {
                continue;
            };
            if let Some(item) = feed.channel.find_item_mut(&entry.item_id) {
                item.disable();
                item.media_size = MEDIA_SIZE_UNKNOWN;
                tracing::info!(
                    feed_id = %feed.feed_id,
                    title = %item.title,
                    path = %entry.path.display(),
                    "removing old media"
                );
            }
            match tokio::fs::remove_file(&entry.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}
