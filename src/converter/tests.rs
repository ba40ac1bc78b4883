use super::*;
use crate::config::BackendKind;
use std::path::PathBuf;
use std::sync::Mutex;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MP3_BYTES: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00audio";
const HTML_BYTES: &[u8] = b"<!DOCTYPE html><html><body>rate limited</body></html>";

type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Backend that records its call and writes fixed bytes
struct WritingBackend {
    name: &'static str,
    content: &'static [u8],
    last_resort: bool,
    calls: CallLog,
}

#[async_trait]
impl MediaConverterBackend for WritingBackend {
    async fn try_convert(&self, _link: &str, output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(self.name);
        tokio::fs::write(output, self.content).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn is_last_resort(&self) -> bool {
        self.last_resort
    }
}

/// Backend that writes a partial file and then fails
struct FailingBackend {
    name: &'static str,
    calls: CallLog,
}

#[async_trait]
impl MediaConverterBackend for FailingBackend {
    async fn try_convert(&self, _link: &str, output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(self.name);
        tokio::fs::write(output, b"ID3 partial").await?;
        Err(ConversionError::backend(self.name, "connection dropped").into())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

struct PanickingBackend {
    calls: CallLog,
}

#[async_trait]
impl MediaConverterBackend for PanickingBackend {
    async fn try_convert(&self, _link: &str, _output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push("panicking");
        panic!("backend bug");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

fn writing(
    name: &'static str,
    content: &'static [u8],
    last_resort: bool,
    calls: &CallLog,
) -> Arc<dyn MediaConverterBackend> {
    Arc::new(WritingBackend {
        name,
        content,
        last_resort,
        calls: calls.clone(),
    })
}

fn output_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("feed").join("myfeed").join("yt_video_abc.mp3")
}

fn fast_config(server: &MockServer) -> ConverterConfig {
    ConverterConfig {
        mimic_human: false,
        loader_base_url: server.uri(),
        oceansaver_base_url: server.uri(),
        yt1s_base_url: server.uri(),
        poll_interval_ms: 0,
        poll_max_unchanged: 3,
        ..Default::default()
    }
}

#[test]
fn mp3_magic_bytes() {
    assert!(looks_like_mp3(b"ID3\x03"));
    assert!(looks_like_mp3(&[0xFF, 0xFB, 0x90]));
    assert!(looks_like_mp3(&[0xFF, 0xE3]));
    assert!(!looks_like_mp3(&[0xFF, 0x1B]));
    assert!(!looks_like_mp3(b"<html>"));
    assert!(!looks_like_mp3(b""));
    assert!(!looks_like_mp3(b"ID"));
}

#[test]
fn human_delay_bounds() {
    assert_eq!(HumanDelay::disabled().next_delay(), Duration::ZERO);

    let delay = HumanDelay::new(Duration::from_millis(10), Duration::from_millis(20));
    for _ in 0..50 {
        let next = delay.next_delay();
        assert!(next >= Duration::from_millis(10) && next <= Duration::from_millis(20));
    }

    let config = ConverterConfig {
        mimic_human: false,
        ..Default::default()
    };
    assert!(!HumanDelay::from_config(&config).is_enabled());
}

#[tokio::test]
async fn html_output_is_rejected_and_chain_continues() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let calls = CallLog::default();
    let chain = ConverterChain::new(vec![
        writing("html", HTML_BYTES, false, &calls),
        writing("good", MP3_BYTES, true, &calls),
    ]);

    let backend = chain.try_convert("https://youtu.be/abc", &output).await.unwrap();

    assert_eq!(backend, "good");
    assert_eq!(*calls.lock().unwrap(), vec!["html", "good"]);
    assert_eq!(std::fs::read(&output).unwrap(), MP3_BYTES);
}

#[tokio::test]
async fn exhausted_chain_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let calls = CallLog::default();
    let chain = ConverterChain::new(vec![
        writing("html", HTML_BYTES, false, &calls),
        Arc::new(FailingBackend {
            name: "failing",
            calls: calls.clone(),
        }),
    ]);

    assert!(!chain.convert("https://youtu.be/abc", &output).await);
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert!(!output.exists());
}

#[tokio::test]
async fn panicking_backend_does_not_abort_chain() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let calls = CallLog::default();
    let chain = ConverterChain::new(vec![
        Arc::new(PanickingBackend {
            calls: calls.clone(),
        }),
        writing("good", MP3_BYTES, true, &calls),
    ]);

    assert!(chain.convert("https://youtu.be/abc", &output).await);
    assert_eq!(*calls.lock().unwrap(), vec!["panicking", "good"]);
}

#[tokio::test]
async fn first_valid_backend_wins() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);
    let calls = CallLog::default();
    let chain = ConverterChain::new(vec![
        writing("first", MP3_BYTES, false, &calls),
        writing("second", MP3_BYTES, false, &calls),
        writing("fallback", MP3_BYTES, true, &calls),
    ]);

    assert!(chain.convert("https://youtu.be/abc", &output).await);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_ne!(calls[0], "fallback");
}

#[tokio::test]
async fn last_resort_backend_always_runs_last() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_path(&dir);

    for _ in 0..10 {
        let calls = CallLog::default();
        let chain = ConverterChain::new(vec![
            writing("fallback", MP3_BYTES, true, &calls),
            writing("a", HTML_BYTES, false, &calls),
            writing("b", HTML_BYTES, false, &calls),
            writing("c", HTML_BYTES, false, &calls),
        ]);

        assert!(chain.convert("https://youtu.be/abc", &output).await);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.last(), Some(&"fallback"));
    }
}

#[tokio::test]
async fn ajax_backend_polls_until_download_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/download.php"))
        .and(query_param("format", "mp3"))
        .and(query_param("url", "https://youtu.be/abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true, "id": "job1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/progress.php"))
        .and(query_param("id", "job1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": 0, "progress": 400})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/progress.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": 1,
            "progress": 1000,
            "download_url": format!("{}/files/abc.mp3", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/abc.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_BYTES))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("abc.mp3");
    let backend = AjaxProgressBackend::loader_to(reqwest::Client::new(), &fast_config(&server));

    backend.try_convert("https://youtu.be/abc", &output).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), MP3_BYTES);
}

#[tokio::test]
async fn ajax_backend_gives_up_on_stalled_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/download.php"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": 1, "id": "job2"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/progress.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": 0, "progress": 10})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("abc.mp3");
    let backend = AjaxProgressBackend::oceansaver(reqwest::Client::new(), &fast_config(&server));

    let err = backend
        .try_convert("https://youtu.be/abc", &output)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conversion(ConversionError::BackendFailed { .. })));
    assert!(!output.exists());
}

#[tokio::test]
async fn ajax_backend_reports_refused_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/download.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend = AjaxProgressBackend::loader_to(reqwest::Client::new(), &fast_config(&server));

    let result = backend
        .try_convert("https://youtu.be/abc", &dir.path().join("abc.mp3"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn yt1s_backend_converts_and_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ajaxSearch/index"))
        .and(body_string_contains("vt=mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "mess": "",
            "vid": "abc",
            "links": {"mp3": {
                "128": {"k": "key128", "size": "3 MB"},
                "256": {"k": "key256", "size": "6 MB"}
            }}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ajaxConvert/convert"))
        .and(body_string_contains("k=key256"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "c_status": "CONVERTING"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ajaxConvert/convert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "c_status": "CONVERTED",
            "dlink": format!("{}/dl/abc.mp3", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dl/abc.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_BYTES))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("abc.mp3");
    let backend = Yt1sBackend::new(
        reqwest::Client::new(),
        &server.uri(),
        HumanDelay::disabled(),
        Duration::ZERO,
    );

    backend.try_convert("https://youtu.be/abc", &output).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), MP3_BYTES);
}

#[tokio::test]
async fn yt1s_backend_rejects_premiere() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ajaxSearch/index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "mess": "This video is a premiere"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend = Yt1sBackend::new(
        reqwest::Client::new(),
        &server.uri(),
        HumanDelay::disabled(),
        Duration::ZERO,
    );

    let result = backend
        .try_convert("https://youtu.be/abc", &dir.path().join("abc.mp3"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn download_rejects_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty.mp3"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("empty.mp3");
    let url = format!("{}/empty.mp3", server.uri());

    assert!(
        download_to(&reqwest::Client::new(), "test", &url, &output)
            .await
            .is_err()
    );
    assert!(!output.exists());
}

#[test]
fn from_config_skips_missing_ytdlp() {
    let mut config = Config::default();
    let chain = ConverterChain::from_config(&config, None).unwrap();
    assert_eq!(chain.backend_names(), vec!["loader.to", "oceansaver", "yt1s"]);

    config.converter.backends = vec![BackendKind::YtDlp];
    let err = ConverterChain::from_config(&config, None).err().unwrap();
    assert!(matches!(err, Error::Config { .. }));

    let ytdlp = YtDlp::new(PathBuf::from("/usr/bin/yt-dlp"));
    let chain = ConverterChain::from_config(&config, Some(ytdlp)).unwrap();
    assert_eq!(chain.backend_names(), vec!["yt-dlp"]);
}
