use super::*;
use crate::availability::Availability;
use crate::channel::{Item, MEDIA_SIZE_UNKNOWN};
use crate::converter::MediaConverterBackend;
use crate::server::ServerStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

const MP3_BYTES: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00converted audio";

/// Writes a valid mp3 for every link and counts conversions per link
#[derive(Default)]
struct FakeBackend {
    conversions: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaConverterBackend for FakeBackend {
    async fn try_convert(&self, link: &str, output: &Path) -> crate::error::Result<()> {
        self.conversions.lock().unwrap().push(link.to_string());
        tokio::fs::write(output, MP3_BYTES).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Availability per link, `Ok` when not listed; links containing "panic" panic
#[derive(Default)]
struct FakeAvailability {
    states: HashMap<String, Availability>,
    checks: Mutex<Vec<String>>,
}

#[async_trait]
impl AvailabilityChecker for FakeAvailability {
    async fn check_availability(&self, link: &str) -> Availability {
        assert!(!link.contains("panic"), "availability lookup crashed");
        self.checks.lock().unwrap().push(link.to_string());
        self.states.get(link).copied().unwrap_or(Availability::Ok)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    data_dir: PathBuf,
    caster: FeedCaster,
    backend: Arc<FakeBackend>,
    availability: Arc<FakeAvailability>,
}

fn rss_document(title: &str, ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .enumerate()
        .map(|(n, id)| {
            format!(
                "<item><title>Episode {id}</title><link>https://www.youtube.com/watch?v={id}</link>\
                 <guid>yt:video:{id}</guid><pubDate>0{day} Jun 2020 10:00:00 +0000</pubDate>\
                 <description>about {id}</description></item>",
                day = n + 1
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>{title}</title>\
         <link>https://example.com/{title}</link><description>d</description>{items}</channel></rss>"
    )
}

fn write_source(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    url::Url::from_file_path(&path).unwrap().to_string()
}

fn fixture_with(states: HashMap<String, Availability>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let mut config = Config {
        data_dir: data_dir.clone(),
        ..Default::default()
    };
    config.retry.max_attempts = 0;
    config.server.host = Some("10.0.0.2:8080".to_string());
    config.server.bind_address = "127.0.0.1".parse().unwrap();
    config.server.port = 0;

    let backend = Arc::new(FakeBackend::default());
    let availability = Arc::new(FakeAvailability {
        states,
        ..Default::default()
    });
    let services = CasterServices {
        resolver: SourceResolver::new(&config, None).unwrap(),
        converter: ConverterChain::new(vec![backend.clone()]),
        availability: availability.clone(),
        store: Arc::new(JsonFileStore::in_dir(&data_dir)),
    };

    Fixture {
        _dir: dir,
        data_dir,
        caster: FeedCaster::from_parts(config, services),
        backend,
        availability,
    }
}

fn fixture() -> Fixture {
    fixture_with(HashMap::new())
}

fn yt_link(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

async fn item_state(caster: &FeedCaster, feed: usize, id: &str) -> Item {
    let feeds = caster.feeds();
    let feeds = feeds.read().await;
    feeds
        .get(feed)
        .unwrap()
        .channel
        .find_item(id)
        .unwrap()
        .clone()
}

#[tokio::test]
async fn refresh_converts_and_generates() {
    let fx = fixture();
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a", "b"]));
    fx.caster
        .add_feed(FeedEntry::new("Show", "yt:show", url))
        .await;

    fx.caster.refresh(0).await.unwrap();

    let a = item_state(&fx.caster, 0, "yt:video:a").await;
    assert_eq!(a.media_size, MP3_BYTES.len() as i64);
    let feed_dir = fx.data_dir.join("feed").join("yt_show");
    assert!(feed_dir.join("yt_video_a.mp3").is_file());

    let rss = std::fs::read_to_string(feed_dir.join("rss")).unwrap();
    assert_eq!(rss.matches("<item>").count(), 2);
    assert!(rss.contains("http://10.0.0.2:8080/feed/yt_show/yt_video_b.mp3"));
    assert_eq!(fx.backend.conversions.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn existing_media_is_not_converted_again() {
    let fx = fixture();
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;

    fx.caster.refresh(0).await.unwrap();
    fx.caster.refresh(0).await.unwrap();

    assert_eq!(fx.backend.conversions.lock().unwrap().len(), 1);
    assert_eq!(fx.availability.checks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_media_is_disabled_for_good() {
    let fx = fixture_with(HashMap::from([(yt_link("gone"), Availability::Invalid)]));
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["gone", "ok"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;

    fx.caster.refresh(0).await.unwrap();
    fx.caster.refresh(0).await.unwrap();

    let gone = item_state(&fx.caster, 0, "yt:video:gone").await;
    assert!(!gone.enabled);
    assert_eq!(gone.media_size, MEDIA_SIZE_UNKNOWN);

    let checks = fx.availability.checks.lock().unwrap();
    assert_eq!(checks.iter().filter(|link| **link == yt_link("gone")).count(), 1);
    let conversions = fx.backend.conversions.lock().unwrap();
    assert_eq!(*conversions, vec![yt_link("ok")]);
}

#[tokio::test]
async fn upcoming_media_waits_for_next_refresh() {
    let fx = fixture_with(HashMap::from([(yt_link("soon"), Availability::Upcoming)]));
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["soon"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;

    fx.caster.refresh(0).await.unwrap();

    let soon = item_state(&fx.caster, 0, "yt:video:soon").await;
    assert!(soon.enabled);
    assert_eq!(soon.media_size, MEDIA_SIZE_UNKNOWN);
    assert!(fx.backend.conversions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fetch_only_does_not_convert() {
    let fx = fixture();
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a", "b"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;

    fx.caster.fetch_only(0).await.unwrap();

    let feeds = fx.caster.feeds();
    assert_eq!(feeds.read().await.get(0).unwrap().channel.len(), 2);
    assert!(fx.backend.conversions.lock().unwrap().is_empty());
    assert!(!fx.data_dir.join("feed").join("show").join("rss").exists());
}

#[tokio::test]
async fn failed_resolution_keeps_last_channel() {
    let fx = fixture();
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;
    fx.caster.fetch_only(0).await.unwrap();

    std::fs::remove_file(fx.data_dir.join("source.xml")).unwrap();
    fx.caster.fetch_only(0).await.unwrap();

    let feeds = fx.caster.feeds();
    let feeds = feeds.read().await;
    let channel = &feeds.get(0).unwrap().channel;
    assert_eq!(channel.title, "show");
    assert_eq!(channel.len(), 1);
}

#[tokio::test]
async fn unknown_index_is_not_found() {
    let fx = fixture();
    assert!(matches!(
        fx.caster.refresh(3).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn refresh_all_skips_disabled_feeds_and_notifies_once() {
    let fx = fixture();
    let notified = Arc::new(AtomicUsize::new(0));
    let caster = fx.caster.clone().with_notifier({
        let notified = notified.clone();
        move || {
            notified.fetch_add(1, Ordering::SeqCst);
        }
    });
    let first = write_source(&fx.data_dir, "first.xml", &rss_document("first", &["a"]));
    let second = write_source(&fx.data_dir, "second.xml", &rss_document("second", &["b"]));
    caster.feeds().write().await.add_feed(FeedEntry::new("First", "first", first));
    let mut disabled = FeedEntry::new("Second", "second", second);
    disabled.enabled = false;
    caster.feeds().write().await.add_feed(disabled);

    let updated = caster.refresh_all(false).await;

    assert_eq!(updated, 1);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    {
        let feeds = caster.feeds();
        let feeds = feeds.read().await;
        assert_eq!(feeds.get(0).unwrap().channel.len(), 1);
        assert!(feeds.get(1).unwrap().channel.is_empty());
    }

    assert_eq!(caster.refresh_all(true).await, 2);
    let feeds = caster.feeds();
    assert_eq!(feeds.read().await.get(1).unwrap().channel.len(), 1);
}

#[tokio::test]
async fn crashing_feed_does_not_block_others() {
    let fx = fixture();
    let good = write_source(&fx.data_dir, "good.xml", &rss_document("good", &["a"]));
    let bad = write_source(&fx.data_dir, "bad.xml", &rss_document("bad", &["panic"]));
    fx.caster.add_feed(FeedEntry::new("Bad", "bad", bad)).await;
    fx.caster.add_feed(FeedEntry::new("Good", "good", good)).await;

    let updated = fx.caster.refresh_all(false).await;

    assert_eq!(updated, 1);
    let feeds = fx.caster.feeds();
    let feeds = feeds.read().await;
    assert!(feeds.get(0).unwrap().channel.is_empty(), "crashed job left feed untouched");
    assert_eq!(feeds.get(1).unwrap().channel.len(), 1);
}

#[tokio::test]
async fn prune_removes_oldest_media_and_disables_items() {
    let fx = fixture();
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a", "b", "c"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;
    fx.caster.refresh(0).await.unwrap();

    let feed_dir = fx.data_dir.join("feed").join("show");
    let now = SystemTime::now();
    for (id, age_secs) in [("a", 300), ("b", 100), ("c", 200)] {
        let file = std::fs::File::options()
            .write(true)
            .open(feed_dir.join(format!("yt_video_{id}.mp3")))
            .unwrap();
        file.set_modified(now - Duration::from_secs(age_secs)).unwrap();
    }

    assert!(fx.caster.prune_old_files(1).await.unwrap());

    assert!(!feed_dir.join("yt_video_a.mp3").exists());
    assert!(feed_dir.join("yt_video_b.mp3").exists());
    assert!(!feed_dir.join("yt_video_c.mp3").exists());
    assert!(!item_state(&fx.caster, 0, "yt:video:a").await.enabled);
    assert!(item_state(&fx.caster, 0, "yt:video:b").await.enabled);

    assert!(!fx.caster.prune_old_files(1).await.unwrap());
}

#[tokio::test]
async fn save_and_load_through_store() {
    let fx = fixture();
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a"]));
    fx.caster.add_feed(FeedEntry::new("Show", "show", url)).await;
    fx.caster.fetch_only(0).await.unwrap();

    assert!(fx.caster.save().await.unwrap());
    assert!(!fx.caster.save().await.unwrap());

    fx.caster.remove_feed(0).await.unwrap();
    fx.caster.load().await.unwrap();

    let feeds = fx.caster.feeds();
    let feeds = feeds.read().await;
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds.get(0).unwrap().channel.len(), 1);
}

#[tokio::test]
async fn server_lifecycle_through_caster() {
    let fx = fixture();
    let events = Arc::new(Mutex::new(Vec::new()));
    let caster = fx.caster.clone().with_server_callbacks(
        {
            let events = events.clone();
            move |_| events.lock().unwrap().push("started")
        },
        {
            let events = events.clone();
            move || events.lock().unwrap().push("stopped")
        },
    );

    let address = caster.start_server().await.unwrap();
    assert_eq!(caster.server_status().await, ServerStatus::Started);
    let body = reqwest::get(format!("http://{address}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("no entries"));

    caster.stop_server().await.unwrap();
    assert_eq!(caster.server_status().await, ServerStatus::Stopped);
    assert_eq!(*events.lock().unwrap(), vec!["started", "stopped"]);
}

#[tokio::test]
async fn server_callbacks_survive_host_override() {
    let fx = fixture();
    let events = Arc::new(Mutex::new(Vec::new()));
    let caster = fx
        .caster
        .clone()
        .with_server_callbacks(
            {
                let events = events.clone();
                move |_| events.lock().unwrap().push("started")
            },
            {
                let events = events.clone();
                move || events.lock().unwrap().push("stopped")
            },
        )
        .with_host("podcasts.lan:9000");
    let url = write_source(&fx.data_dir, "source.xml", &rss_document("show", &["a"]));
    caster.add_feed(FeedEntry::new("Show", "show", url)).await;
    caster.refresh(0).await.unwrap();

    let address = caster.start_server().await.unwrap();
    let rss = reqwest::get(format!("http://{address}/feed/show"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    caster.stop_server().await.unwrap();

    assert_eq!(caster.host(), "podcasts.lan:9000");
    assert!(rss.contains("http://podcasts.lan:9000/feed/show/yt_video_a.mp3"));
    assert_eq!(*events.lock().unwrap(), vec!["started", "stopped"]);
}
