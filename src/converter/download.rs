use crate::error::{ConversionError, Error, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Stream `url` into `output`
///
/// Fails on error statuses and on empty bodies; a failed download leaves no file behind.
pub async fn download_to(
    client: &reqwest::Client,
    backend: &'static str,
    url: &str,
    output: &Path,
) -> Result<u64> {
    tracing::info!(backend, url, output = %output.display(), "downloading converted media");

    let mut response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ConversionError::backend(
            backend,
            format!("download returned HTTP {}", response.status().as_u16()),
        )
        .into());
    }

    let mut file = tokio::fs::File::create(output).await?;
    let mut written: u64 = 0;
    let copy: Result<()> = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;
    drop(file);

    let outcome = match copy {
        Ok(()) if written == 0 => Err(Error::from(ConversionError::backend(
            backend,
            "download returned an empty body",
        ))),
        other => other,
    };
    if let Err(e) = outcome {
        let _ = tokio::fs::remove_file(output).await;
        return Err(e);
    }

    tracing::debug!(backend, bytes = written, "download finished");
    Ok(written)
}
