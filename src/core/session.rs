use crate::core::error::{ClientError, ClientResult, CANCELLED_MESSAGE};
use crate::core::metadata::{
    Artifact, DiscoveryResult, DownloadProgress, Format, FormatInfo, OutputFormat, VideoInfo,
};
use crate::core::sink::ArtifactSink;
use crate::core::transport::TransportClient;
use crate::utils::{artifact_filename, validate_video_url};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Highest percentage shown before the artifact has been saved.
pub const PROGRESS_CAP: f64 = 99.9;

/// Discovery side of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub loading: bool,
    pub error: Option<String>,
    pub formats: Vec<Format>,
    pub video_info: Option<VideoInfo>,
}

impl SessionState {
    fn begin_discovery(&mut self) {
        self.loading = true;
        self.error = None;
    }

    fn discovery_succeeded(&mut self, result: &DiscoveryResult) {
        *self = SessionState {
            loading: false,
            error: None,
            formats: result.formats.clone(),
            video_info: Some(VideoInfo::from(result)),
        };
    }

    // A failed discovery leaves no formats behind: `formats` is only ever
    // the listing of the latest successful discovery.
    fn discovery_failed(&mut self, message: String) {
        *self = SessionState {
            loading: false,
            error: Some(message),
            formats: Vec::new(),
            video_info: None,
        };
    }

    pub fn has_formats(&self) -> bool {
        !self.formats.is_empty()
    }

    pub fn find_format(&self, format_id: &str) -> Option<&Format> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

/// Download side of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadActionState {
    pub status: DownloadStatus,
    pub loading: bool,
    /// 0 to 100. Stays at or below [`PROGRESS_CAP`] until the save finished.
    pub progress: f64,
    pub error: Option<String>,
    pub format_info: Option<FormatInfo>,
    pub saved_to: Option<PathBuf>,
}

impl DownloadActionState {
    fn started(format_info: Option<FormatInfo>) -> Self {
        Self {
            status: DownloadStatus::Downloading,
            loading: true,
            format_info,
            ..Self::default()
        }
    }

    fn completed(path: PathBuf) -> Self {
        Self {
            status: DownloadStatus::Completed,
            progress: 100.0,
            saved_to: Some(path),
            ..Self::default()
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: DownloadStatus::Failed,
            error: Some(message),
            ..Self::default()
        }
    }

    fn cancelled() -> Self {
        Self {
            status: DownloadStatus::Cancelled,
            error: Some(CANCELLED_MESSAGE.to_string()),
            ..Self::default()
        }
    }

    /// Applies a progress event. Returns whether the displayed value changed.
    fn advance(&mut self, progress: DownloadProgress) -> bool {
        if self.status != DownloadStatus::Downloading {
            return false;
        }
        let Some(percent) = progress.percent() else {
            return false;
        };
        let capped = percent.min(PROGRESS_CAP);
        if capped > self.progress {
            self.progress = capped;
            true
        } else {
            false
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == DownloadStatus::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    Cancelled,
}

struct ActiveDownload {
    id: u64,
    token: CancellationToken,
}

/// Owns the state of one user session: the discovered formats and at most
/// one in-flight download.
///
/// All state lives in two `watch` channels so front ends can observe it; every
/// mutation is a short transition that never spans an `.await`. The download
/// slot holds the single cancellation token, so a second download cannot
/// start while one is active.
pub struct SessionController {
    transport: TransportClient,
    sink: Arc<dyn ArtifactSink>,
    session: watch::Sender<SessionState>,
    download: watch::Sender<DownloadActionState>,
    active: Mutex<Option<ActiveDownload>>,
    discovery_generation: AtomicU64,
    next_download_id: AtomicU64,
}

impl SessionController {
    pub fn new(transport: TransportClient, sink: Arc<dyn ArtifactSink>) -> Self {
        let (session, _) = watch::channel(SessionState::default());
        let (download, _) = watch::channel(DownloadActionState::default());
        Self {
            transport,
            sink,
            session,
            download,
            active: Mutex::new(None),
            discovery_generation: AtomicU64::new(0),
            next_download_id: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn session_state(&self) -> SessionState {
        self.session.borrow().clone()
    }

    pub fn download_state(&self) -> DownloadActionState {
        self.download.borrow().clone()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn subscribe_download(&self) -> watch::Receiver<DownloadActionState> {
        self.download.subscribe()
    }

    pub fn is_downloading(&self) -> bool {
        self.active.lock().is_some()
    }

    pub async fn check_health(&self) -> bool {
        self.transport.check_health().await
    }

    /// Discovers the formats for `url` and makes them the session's listing.
    ///
    /// Overlapping calls are ordered by a generation counter: only the most
    /// recently started discovery may write state. A superseded call still
    /// returns its own result to its caller.
    pub async fn fetch_formats(&self, url: &str) -> ClientResult<DiscoveryResult> {
        let url = validate_video_url(url)?;
        let generation = self.discovery_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.session.send_modify(SessionState::begin_discovery);
        info!("Discovering formats for {}", url);

        let outcome = match self.transport.discover_formats(url).await {
            Ok(result) if result.success => Ok(result),
            Ok(result) => Err(ClientError::DiscoveryFailed(
                result
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "Failed to fetch formats".to_string()),
            )),
            Err(e) => Err(e),
        };

        let applied = self.session.send_if_modified(|state| {
            if self.discovery_generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match &outcome {
                Ok(result) => state.discovery_succeeded(result),
                Err(e) => state.discovery_failed(e.to_string()),
            }
            true
        });

        match &outcome {
            Ok(result) if applied => info!("Found {} formats", result.formats.len()),
            Err(e) if applied => warn!("Format discovery failed: {}", e),
            _ => debug!("Discovery {} superseded, state left untouched", generation),
        }
        outcome
    }

    /// Streams `format_id` and saves it under the session's video title.
    ///
    /// Rejected with [`ClientError::DownloadInProgress`] while another
    /// download holds the slot. Cancellation resolves to
    /// [`DownloadOutcome::Cancelled`] rather than an error.
    pub async fn download(
        &self,
        url: &str,
        format_id: &str,
        output_format: OutputFormat,
        format_info: Option<FormatInfo>,
    ) -> ClientResult<DownloadOutcome> {
        let url = validate_video_url(url)?;
        if format_id.trim().is_empty() {
            return Err(ClientError::Validation("Please choose a format".to_string()));
        }
        let title = {
            let session = self.session.borrow();
            if !session.has_formats() {
                return Err(ClientError::Validation(
                    "Fetch formats before downloading".to_string(),
                ));
            }
            session.video_info.as_ref().and_then(|v| v.title.clone())
        };

        let (id, token) = {
            let mut active = self.active.lock();
            if active.is_some() {
                warn!("Rejecting download of {}: another download is active", format_id);
                return Err(ClientError::DownloadInProgress);
            }
            let id = self.next_download_id.fetch_add(1, Ordering::SeqCst) + 1;
            let token = CancellationToken::new();
            *active = Some(ActiveDownload {
                id,
                token: token.clone(),
            });
            self.download.send_replace(DownloadActionState::started(format_info));
            (id, token)
        };
        info!("Download {} started: format {}", id, format_id);

        let observer = |progress: DownloadProgress| self.record_progress(id, progress);
        let result = match self
            .transport
            .download(url, format_id, output_format, &observer, &token)
            .await
        {
            Ok(artifact) if artifact.is_empty() => Err(ClientError::EmptyDownload),
            Ok(artifact) => {
                self.persist(&token, title.as_deref(), output_format, &artifact)
                    .await
            }
            Err(e) => Err(e),
        };

        self.finish(id, result)
    }

    /// Aborts the active download, if any, and moves straight to the
    /// cancelled state. Late events from the aborted request are ignored.
    pub fn cancel_download(&self) -> bool {
        let mut active = self.active.lock();
        match active.take() {
            Some(download) => {
                download.token.cancel();
                self.download.send_replace(DownloadActionState::cancelled());
                info!("Download {} cancelled", download.id);
                true
            }
            None => false,
        }
    }

    /// Clears both states. An in-flight download keeps running; cancel it first.
    pub fn reset(&self) {
        self.discovery_generation.fetch_add(1, Ordering::SeqCst);
        self.session.send_replace(SessionState::default());
        self.download.send_replace(DownloadActionState::default());
        debug!("Session reset");
    }

    fn owns_slot(active: &Option<ActiveDownload>, id: u64) -> bool {
        matches!(active, Some(download) if download.id == id)
    }

    fn record_progress(&self, id: u64, progress: DownloadProgress) {
        let active = self.active.lock();
        if !Self::owns_slot(&active, id) {
            return;
        }
        self.download.send_if_modified(|state| state.advance(progress));
    }

    async fn persist(
        &self,
        token: &CancellationToken,
        title: Option<&str>,
        output_format: OutputFormat,
        artifact: &Artifact,
    ) -> ClientResult<PathBuf> {
        if token.is_cancelled() {
            return Err(ClientError::DownloadCancelled);
        }
        let filename = artifact_filename(title, output_format);
        Ok(self.sink.save(&filename, artifact).await?)
    }

    fn finish(&self, id: u64, result: ClientResult<PathBuf>) -> ClientResult<DownloadOutcome> {
        let mut active = self.active.lock();
        let owned = Self::owns_slot(&active, id);
        if owned {
            *active = None;
        }

        match result {
            Ok(path) if owned => {
                info!("Download {} complete: {}", id, path.display());
                self.download
                    .send_replace(DownloadActionState::completed(path.clone()));
                Ok(DownloadOutcome::Saved(path))
            }
            Ok(path) => {
                warn!(
                    "Download {} was cancelled while saving; {} left on disk",
                    id,
                    path.display()
                );
                Ok(DownloadOutcome::Cancelled)
            }
            Err(e) if e.is_cancelled() => {
                if owned {
                    self.download.send_replace(DownloadActionState::cancelled());
                }
                Ok(DownloadOutcome::Cancelled)
            }
            // Failures of an attempt that was already cancelled are part of its unwinding.
            Err(e) if !owned => {
                debug!("Download {} ended after cancellation: {}", id, e);
                Ok(DownloadOutcome::Cancelled)
            }
            Err(e) => {
                warn!("Download {} failed: {}", id, e);
                self.download.send_replace(DownloadActionState::failed(e.to_string()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(loaded: u64, total: u64) -> DownloadProgress {
        DownloadProgress { loaded, total }
    }

    #[test]
    fn test_progress_is_capped_and_monotonic() {
        let mut state = DownloadActionState::started(None);

        assert!(state.advance(progress(30, 100)));
        assert_eq!(state.progress, 30.0);
        assert!(!state.advance(progress(20, 100)));
        assert_eq!(state.progress, 30.0);
        assert!(state.advance(progress(100, 100)));
        assert_eq!(state.progress, PROGRESS_CAP);
    }

    #[test]
    fn test_unknown_total_leaves_progress_indeterminate() {
        let mut state = DownloadActionState::started(None);
        assert!(!state.advance(progress(4096, 0)));
        assert_eq!(state.progress, 0.0);
    }

    #[test]
    fn test_terminal_states_ignore_progress() {
        let mut cancelled = DownloadActionState::cancelled();
        assert!(!cancelled.advance(progress(50, 100)));
        assert_eq!(cancelled.progress, 0.0);
        assert_eq!(cancelled.error.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(cancelled.status.is_terminal());

        let mut failed = DownloadActionState::failed("HTTP 500".to_string());
        assert!(!failed.advance(progress(50, 100)));
        assert!(!failed.loading);
    }

    #[test]
    fn test_failed_discovery_clears_listing() {
        let mut state = SessionState::default();
        let result = DiscoveryResult {
            success: true,
            title: Some("Clip".to_string()),
            formats: vec![Format {
                format_id: "18".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        state.begin_discovery();
        state.discovery_succeeded(&result);
        assert!(state.has_formats());
        assert!(state.find_format("18").is_some());

        state.begin_discovery();
        assert!(state.loading);
        assert!(state.error.is_none());
        state.discovery_failed("Video unavailable".to_string());
        assert!(!state.loading);
        assert!(!state.has_formats());
        assert!(state.video_info.is_none());
        assert_eq!(state.error.as_deref(), Some("Video unavailable"));
    }
}
