//! Refresh of all feeds through the job scheduler

use super::{FeedCaster, FeedUpdate};
use crate::scheduler::Job;
use futures::FutureExt;

impl FeedCaster {
    /// Refresh every enabled feed, or all feeds with `include_disabled`
    ///
    /// Each feed runs as its own job on a copy of its entry. Results are
    /// written back once all jobs finished, the notifier fires once, and the
    /// file limit is enforced afterwards. Returns the number of feeds updated.
    pub async fn refresh_all(&self, include_disabled: bool) -> usize {
        let selected: Vec<(usize, _)> = {
            let feeds = self.feeds.read().await;
            feeds
                .feeds()
                .iter()
                .enumerate()
                .filter(|(_, feed)| include_disabled || feed.enabled)
                .map(|(index, feed)| (index, feed.clone()))
                .collect()
        };
        tracing::info!(feeds = selected.len(), include_disabled, "refreshing feeds");

        let jobs: Vec<Job<FeedUpdate>> = selected
            .into_iter()
            .map(|(index, entry)| {
                let caster = self.clone();
                async move { caster.refresh_entry(index, entry).await }.boxed()
            })
            .collect();

        let results = self.scheduler.run_all(jobs).await;

        let mut updated = 0;
        for update in results.into_iter().flatten() {
            if self.apply_update(update).await {
                updated += 1;
            }
        }

        if let Some(limit) = self.config.file_limit {
            match self.prune_files(limit).await {
                Ok(true) => tracing::info!(limit, "old media removed"),
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "unable to enforce file limit"),
            }
        }

        self.notify();
        updated
    }
}
