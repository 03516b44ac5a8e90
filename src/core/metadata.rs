use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

/// A single encoding offered by the backend for a video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    pub format_id: String,
    pub format_name: String,
    pub ext: String,
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub audio_bitrate: Option<f64>, // bits per second
    pub video_bitrate: Option<f64>,
    pub estimated_size_mb: Option<f64>,
    pub is_dash: bool,
}

impl Format {
    /// Muxed video offers: carry a video codec and are not DASH.
    pub fn is_muxed_video(&self) -> bool {
        self.vcodec.is_some() && !self.is_dash
    }

    pub fn is_audio_only(&self) -> bool {
        self.acodec.is_some() && self.vcodec.is_none()
    }

    pub fn quality_label(&self) -> String {
        if let Some(height) = self.height {
            return format!("{}p", height.round() as u64);
        }
        if let Some(bitrate) = self.audio_bitrate {
            return format!("{}kbps", (bitrate / 1000.0).round() as u64);
        }
        self.ext.to_uppercase()
    }

    pub fn codec_label(&self) -> String {
        let codecs: Vec<String> = [self.vcodec.as_deref(), self.acodec.as_deref()]
            .into_iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .map(|c| c.split('.').next().unwrap_or(c).to_uppercase())
            .collect();

        if codecs.is_empty() {
            "Unknown".to_string()
        } else {
            codecs.join(" + ")
        }
    }

    pub fn type_label(&self) -> &'static str {
        match (self.vcodec.is_some(), self.acodec.is_some()) {
            (true, true) => "Video + Audio",
            (true, false) => "Just Video",
            (false, true) => "Just Audio",
            (false, false) => "Unknown",
        }
    }
}

/// Labels captured when a download starts; fixed for the life of that download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub quality: String,
    pub codec: String,
    #[serde(rename = "type")]
    pub format_type: String,
}

impl From<&Format> for FormatInfo {
    fn from(format: &Format) -> Self {
        Self {
            quality: format.quality_label(),
            codec: format.codec_label(),
            format_type: format.type_label().to_string(),
        }
    }
}

/// Response body of `POST /api/fetch-formats`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryResult {
    pub success: bool,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<u64>,
    pub thumbnail: Option<String>,
    pub formats: Vec<Format>,
    pub age_restricted: bool,
    pub is_live: bool,
    pub download_url: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// Video-level facts kept from the last successful discovery.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: Option<String>,
    pub duration: Option<u64>,
    pub thumbnail: Option<String>,
    pub video_id: Option<String>,
    pub age_restricted: bool,
    pub is_live: bool,
}

impl From<&DiscoveryResult> for VideoInfo {
    fn from(result: &DiscoveryResult) -> Self {
        Self {
            title: result.title.clone(),
            duration: result.duration,
            thumbnail: result.thumbnail.clone(),
            video_id: result.video_id.clone(),
            age_restricted: result.age_restricted,
            is_live: result.is_live,
        }
    }
}

/// Requested output container. Serialized as the backend's `output_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Mp3,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mp3 => "mp3",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Mp3 => "audio/mpeg",
        }
    }
}

/// Running byte count of a streaming download. `total` is 0 when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    pub loaded: u64,
    pub total: u64,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f64> {
        if self.total > 0 {
            Some(self.loaded as f64 / self.total as f64 * 100.0)
        } else {
            None
        }
    }
}

/// A fully received download payload.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Bytes,
    pub mime_type: &'static str,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Response body of `GET /api/video/{video_id}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct VideoDetails {
    pub success: bool,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<u64>,
    #[serde(deserialize_with = "count_from_string_or_number")]
    pub views: Option<u64>,
    #[serde(deserialize_with = "count_from_string_or_number")]
    pub likes: Option<u64>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// One hit from `POST /api/search`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoResult {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub channel: String,
    pub published_at: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub success: bool,
    pub videos: Vec<VideoResult>,
    pub next_page_token: Option<String>,
    pub total_results: Option<u64>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

// The search service reports statistics as strings ("1234").
fn count_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(vcodec: Option<&str>, acodec: Option<&str>) -> Format {
        Format {
            format_id: "18".to_string(),
            ext: "mp4".to_string(),
            vcodec: vcodec.map(str::to_string),
            acodec: acodec.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_labels() {
        let mut muxed = format(Some("avc1.42001E"), Some("mp4a.40.2"));
        muxed.height = Some(360.0);
        assert_eq!(muxed.quality_label(), "360p");
        assert_eq!(muxed.codec_label(), "AVC1 + MP4A");
        assert_eq!(muxed.type_label(), "Video + Audio");

        let mut audio = format(None, Some("opus"));
        audio.ext = "webm".to_string();
        audio.audio_bitrate = Some(160_000.0);
        assert_eq!(audio.quality_label(), "160kbps");
        assert_eq!(audio.type_label(), "Just Audio");
        assert!(audio.is_audio_only());

        let bare = format(None, None);
        assert_eq!(bare.quality_label(), "MP4");
        assert_eq!(bare.codec_label(), "Unknown");
        assert_eq!(bare.type_label(), "Unknown");
    }

    #[test]
    fn test_dash_video_is_not_muxed() {
        let mut dash = format(Some("vp9"), None);
        dash.is_dash = true;
        assert!(!dash.is_muxed_video());
        assert_eq!(dash.type_label(), "Just Video");
    }

    #[test]
    fn test_discovery_failure_body_parses_with_defaults() {
        let result: DiscoveryResult =
            serde_json::from_str(r#"{"success": false, "error": "Video unavailable"}"#).unwrap();
        assert!(!result.success);
        assert!(result.formats.is_empty());
        assert_eq!(result.error.as_deref(), Some("Video unavailable"));
    }

    #[test]
    fn test_video_details_accepts_string_counts() {
        let details: VideoDetails = serde_json::from_str(
            r#"{"success": true, "duration": 212, "views": "1500", "likes": 42}"#,
        )
        .unwrap();
        assert_eq!(details.views, Some(1500));
        assert_eq!(details.likes, Some(42));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(DownloadProgress { loaded: 50, total: 100 }.percent(), Some(50.0));
        assert_eq!(DownloadProgress { loaded: 50, total: 0 }.percent(), None);
    }

    #[test]
    fn test_output_format_wire_name() {
        assert_eq!(serde_json::to_string(&OutputFormat::Mp3).unwrap(), "\"mp3\"");
        assert_eq!(OutputFormat::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Mp4.mime_type(), "video/mp4");
    }
}
