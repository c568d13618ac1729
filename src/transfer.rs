use std::io::{self, Read};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::Builder;
use tracing::debug;

use crate::domain::DownloadDescriptor;
use crate::error::DownloaderError;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches one descriptor's source into its destination path, replacing any
/// existing file. Returns the number of bytes written.
pub trait Transfer: Send + Sync {
    fn fetch(&self, descriptor: &DownloadDescriptor) -> Result<u64, DownloaderError>;
}

#[derive(Clone)]
pub struct HttpTransfer {
    client: Client,
    timeout: Duration,
}

impl HttpTransfer {
    /// `timeout` bounds the whole transfer, body included.
    pub fn new(timeout: Duration) -> Result<Self, DownloaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-dl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DownloaderError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|err| DownloaderError::Transfer {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client, timeout })
    }
}

impl Transfer for HttpTransfer {
    fn fetch(&self, descriptor: &DownloadDescriptor) -> Result<u64, DownloaderError> {
        let source = descriptor.source_url();
        let url = transfer_url(source)?;
        let transfer_err = |message: String| DownloaderError::Transfer {
            url: source.to_string(),
            message,
        };

        debug!(url = %url, "transfer request");
        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| transfer_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(DownloaderError::TransferStatus {
                url: source.to_string(),
                status: response.status().as_u16(),
            });
        }

        let dir = descriptor.destination_dir();
        let mut temp = Builder::new()
            .prefix(".faang-dl")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(format!("{dir}: {err}")))?;
        let mut body = DeadlineReader::new(response, started, self.timeout);
        let bytes = io::copy(&mut body, temp.as_file_mut())
            .map_err(|err| transfer_err(err.to_string()))?;
        let destination = descriptor.destination_path();
        temp.persist(destination.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(format!("{destination}: {err}")))?;
        Ok(bytes)
    }
}

/// Wall-clock limit on a response body; the client timeout only bounds
/// each individual read.
struct DeadlineReader<R> {
    inner: R,
    deadline: Instant,
}

impl<R: Read> DeadlineReader<R> {
    fn new(inner: R, started: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: started + timeout,
        }
    }
}

impl<R: Read> Read for DeadlineReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if Instant::now() >= self.deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "transfer exceeded its timeout",
            ));
        }
        self.inner.read(buf)
    }
}

/// FTP hosts of the archive serve the same tree over HTTP, so `ftp://` sources
/// are fetched as `http://` at the same host and path.
pub fn transfer_url(source: &str) -> Result<String, DownloaderError> {
    if let Some(rest) = source.strip_prefix("ftp://") {
        return Ok(format!("http://{rest}"));
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(source.to_string());
    }
    Err(DownloaderError::UnsupportedScheme(source.to_string()))
}
