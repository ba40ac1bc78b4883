use super::MediaConverterBackend;
use crate::error::Result;
use crate::ytdlp::YtDlp;
use async_trait::async_trait;
use std::path::Path;

/// Local yt-dlp extraction, tried after every web service
#[derive(Clone, Debug)]
pub struct YtDlpBackend {
    ytdlp: YtDlp,
}

impl YtDlpBackend {
    /// Wrap a yt-dlp handle
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }
}

#[async_trait]
impl MediaConverterBackend for YtDlpBackend {
    async fn try_convert(&self, link: &str, output: &Path) -> Result<()> {
        self.ytdlp.extract_audio(link, output).await
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn is_last_resort(&self) -> bool {
        true
    }
}
