use futures::StreamExt;
use reqwest::Client;
use std::{path::Path, time::Duration};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, trace};
use url::Url;

use crate::error::{HaircutError, Result};

/// Download `url` into `dest` chunk by chunk.
/// Returns the number of bytes written.
pub async fn download_to(
    client: &Client,
    url: &Url,
    dest: &Path,
    timeout: Duration,
) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| HaircutError::cache(parent, e))?;
    }

    let resp = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| HaircutError::network(url, e))?
        .error_for_status()
        .map_err(|e| HaircutError::network(url, e))?;

    let mut file = fs::File::create(dest)
        .await
        .map_err(|e| HaircutError::cache(dest, e))?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HaircutError::network(url, format!("mid-transfer: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| HaircutError::cache(dest, e))?;
        written += chunk.len() as u64;
        trace!(%url, written, "chunk");
    }
    file.flush().await.map_err(|e| HaircutError::cache(dest, e))?;

    info!(%url, bytes = written, "downloaded");
    Ok(written)
}
