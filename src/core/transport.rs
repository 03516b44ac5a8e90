use crate::config::Config;
use crate::core::error::{ClientError, ClientResult};
use crate::core::metadata::{
    Artifact, DiscoveryResult, DownloadProgress, OutputFormat, SearchResponse, VideoDetails,
};
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

// Never reserve more than this up front, whatever content-length claims.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Receives `{loaded, total}` after every chunk of a streaming download.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: DownloadProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: DownloadProgress) {
        self(progress)
    }
}

#[derive(Serialize)]
struct FetchFormatsBody<'a> {
    url: &'a str,
    language: &'a str,
}

#[derive(Serialize)]
struct DownloadBody<'a> {
    url: &'a str,
    format_id: &'a str,
    output_format: OutputFormat,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    max_results: u32,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Thin client over the backend's HTTP surface. Every call is a single
/// attempt; retry policy belongs to the caller.
#[derive(Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    base_url: Url,
    language: String,
    health_timeout: Duration,
}

impl TransportClient {
    pub fn new(base_url: &Url, config: &Config) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ClientError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.clone(),
            language: config.language.clone(),
            health_timeout: config.health_timeout(),
        })
    }

    /// Backend address as shown to users, without a trailing slash.
    pub fn address(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.address(), path)
    }

    fn unavailable(&self) -> ClientError {
        ClientError::BackendUnavailable {
            address: self.address().to_string(),
        }
    }

    fn classify(&self, err: reqwest::Error, fallback: fn(String) -> ClientError) -> ClientError {
        if err.is_connect() {
            warn!("Backend unreachable at {}: {}", self.address(), err);
            self.unavailable()
        } else {
            fallback(err.to_string())
        }
    }

    /// Liveness probe. Any failure degrades to `false`.
    pub async fn check_health(&self) -> bool {
        let result = self
            .client
            .get(self.endpoint("/health"))
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!("Health check status: {}", response.status());
                response.status().is_success()
            }
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Asks the backend which formats exist for `url`.
    ///
    /// A 2xx response is returned as-is: the body's `success` flag may still
    /// report a logical failure and must be checked by the caller.
    pub async fn discover_formats(&self, url: &str) -> ClientResult<DiscoveryResult> {
        debug!("Fetching formats for {}", url);
        let response = self
            .client
            .post(self.endpoint("/api/fetch-formats"))
            .json(&FetchFormatsBody {
                url,
                language: &self.language,
            })
            .send()
            .await
            .map_err(|e| self.classify(e, ClientError::DiscoveryFailed))?;

        if !response.status().is_success() {
            return Err(ClientError::DiscoveryFailed(error_message(response).await));
        }

        let result: DiscoveryResult = response
            .json()
            .await
            .map_err(|e| self.classify(e, ClientError::DiscoveryFailed))?;
        debug!(
            "Discovery returned success={} with {} formats",
            result.success,
            result.formats.len()
        );
        Ok(result)
    }

    /// Streams one format into memory.
    ///
    /// The token is observed while waiting for the response and between every
    /// chunk; on cancellation the request is dropped and partial data discarded.
    pub async fn download(
        &self,
        url: &str,
        format_id: &str,
        output_format: OutputFormat,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> ClientResult<Artifact> {
        info!("Requesting format {} as {}", format_id, output_format.extension());
        let request = self
            .client
            .post(self.endpoint("/api/download"))
            .json(&DownloadBody {
                url,
                format_id,
                output_format,
            })
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Download cancelled before response");
                return Err(ClientError::DownloadCancelled);
            }
            result = request => result.map_err(|e| self.classify(e, ClientError::DownloadFailed))?,
        };

        if !response.status().is_success() {
            return Err(ClientError::DownloadFailed(error_message(response).await));
        }

        let total = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        debug!("Download content-length: {}", total);

        let mut stream = response.bytes_stream();
        let mut buffer = BytesMut::with_capacity(total.min(MAX_PREALLOCATION) as usize);
        let mut loaded: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Download cancelled after {} bytes", loaded);
                    return Err(ClientError::DownloadCancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    loaded += chunk.len() as u64;
                    buffer.extend_from_slice(&chunk);
                    observer.on_progress(DownloadProgress { loaded, total });
                }
                Some(Err(e)) => {
                    warn!("Download stream broke after {} bytes: {}", loaded, e);
                    return Err(ClientError::DownloadFailed(format!(
                        "Download interrupted after {} bytes: {}",
                        loaded, e
                    )));
                }
                None => break,
            }
        }

        info!("Received {} bytes", loaded);
        Ok(Artifact {
            data: buffer.freeze(),
            mime_type: output_format.mime_type(),
        })
    }

    pub async fn video_details(&self, video_id: &str) -> ClientResult<VideoDetails> {
        let path = format!("/api/video/{}", urlencoding::encode(video_id));
        let response = self
            .client
            .get(self.endpoint(&path))
            .send()
            .await
            .map_err(|e| self.classify(e, ClientError::RequestFailed))?;

        if !response.status().is_success() {
            return Err(ClientError::RequestFailed(error_message(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| self.classify(e, ClientError::RequestFailed))
    }

    pub async fn search(&self, query: &str, max_results: u32) -> ClientResult<SearchResponse> {
        debug!("Searching for {:?} (max {})", query, max_results);
        let response = self
            .client
            .post(self.endpoint("/api/search"))
            .json(&SearchBody { query, max_results })
            .send()
            .await
            .map_err(|e| self.classify(e, ClientError::RequestFailed))?;

        if !response.status().is_success() {
            return Err(ClientError::RequestFailed(error_message(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| self.classify(e, ClientError::RequestFailed))
    }
}

/// The backend's `error` field if the body carries one, else the status code.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
