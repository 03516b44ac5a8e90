pub mod error;
pub mod metadata;
pub mod session;
pub mod sink;
pub mod transport;

pub use error::{ClientError, ClientResult};
pub use metadata::{
    Artifact, DiscoveryResult, DownloadProgress, Format, FormatInfo, OutputFormat, SearchResponse,
    VideoDetails, VideoInfo, VideoResult,
};
pub use session::{
    DownloadActionState, DownloadOutcome, DownloadStatus, SessionController, SessionState,
};
pub use sink::{ArtifactSink, FileSink};
pub use transport::{ProgressObserver, TransportClient};
