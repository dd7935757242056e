//! HTTP client wrapper for downloading resources.
//!
//! This module provides the `HttpClient` struct which streams a resource into
//! a hidden scratch file and renames it into place only after the whole body
//! has been written.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use super::filename::{filename_from_url, partial_filename};
use crate::user_agent;

/// HTTP client for downloading resources with streaming support.
///
/// This client is designed to be created once and reused for every transfer
/// of a run, taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::time::Duration;
/// use wishlist_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(Duration::from_secs(30), Duration::from_secs(60))?;
/// let saved = client
///     .download_to_dir("https://w.wallhaven.cc/full/85/wallhaven-8586my.jpg", Path::new("./wallhaven_download"))
///     .await?;
/// println!("Downloaded to: {}", saved.path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// A completed transfer.
#[derive(Debug, Clone)]
pub struct SavedFile {
    /// Final output path.
    pub path: PathBuf,
    /// Body size written to disk.
    pub bytes: u64,
}

impl HttpClient {
    /// Creates a client with the given connect timeout and whole-request
    /// timeout. Redirects are followed with reqwest's default policy.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the client cannot be constructed.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(user_agent::default_download_user_agent())
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Downloads `url` into `output_dir`, named after the URL's final path
    /// segment. An existing file with that name is replaced.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::download_as`].
    pub async fn download_to_dir(
        &self,
        url: &str,
        output_dir: &Path,
    ) -> Result<SavedFile, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let file_name = filename_from_url(&parsed_url);
        self.download_as(url, output_dir, &file_name).await
    }

    /// Downloads `url` into `output_dir/file_name`, replacing any existing
    /// file of that name.
    ///
    /// The body is streamed into a hidden `.<name>.*.part` scratch file that
    /// no other transfer shares. The scratch file is removed on every failure
    /// path, so a failed transfer leaves nothing in `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns anything other than 200
    /// - Creating, writing or renaming the file fails
    #[instrument(skip(self, output_dir), fields(url = %url))]
    pub async fn download_as(
        &self,
        url: &str,
        output_dir: &Path,
        file_name: &str,
    ) -> Result<SavedFile, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let final_path = output_dir.join(file_name);

        let response = self
            .client
            .get(parsed_url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::io(output_dir, e))?;

        let mut partial = PartialFile::new(output_dir.join(partial_filename(file_name)));
        debug!(path = %partial.path().display(), "streaming to scratch file");

        let mut file = File::create(partial.path())
            .await
            .map_err(|e| DownloadError::io(partial.path(), e))?;
        let bytes = stream_to_file(&mut file, response, url, partial.path()).await?;
        drop(file);

        tokio::fs::rename(partial.path(), &final_path)
            .await
            .map_err(|e| DownloadError::io(&final_path, e))?;
        partial.disarm();

        debug!(path = %final_path.display(), bytes, "download complete");
        Ok(SavedFile {
            path: final_path,
            bytes,
        })
    }
}

/// Scratch file removed on drop unless the transfer completed.
#[derive(Debug)]
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "cleaning up partial file");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
