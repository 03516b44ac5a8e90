use crate::core::error::ClientError;
use crate::core::metadata::{Format, OutputFormat};
use regex::Regex;
use std::sync::OnceLock;

pub fn sanitize_filename(filename: &str) -> String {
    // Remove or replace characters that are invalid in filenames
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}

/// Byte budget for a filename stem; most filesystems cap names at 255 bytes.
pub const MAX_STEM_BYTES: usize = 200;

/// Cuts `stem` to at most `max_bytes` without splitting a character.
pub fn truncate_stem(stem: &str, max_bytes: usize) -> &str {
    if stem.len() <= max_bytes {
        return stem;
    }
    let mut end = max_bytes;
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    stem[..end].trim_end().trim_end_matches('.')
}

/// `<title>.<ext>`, or `download.<ext>` when the title is missing or blank.
pub fn artifact_filename(title: Option<&str>, output_format: OutputFormat) -> String {
    let stem = title
        .map(sanitize_filename)
        .map(|t| truncate_stem(&t, MAX_STEM_BYTES).to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "download".to_string());
    format!("{}.{}", stem, output_format.extension())
}

fn video_url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"youtube\.com/watch\?v=[^&]+",
            r"youtu\.be/[^?&]+",
            r"youtube\.com/embed/[^?&]+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Client-side check run before any request is made.
pub fn validate_video_url(url: &str) -> Result<&str, ClientError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ClientError::Validation("Please enter a YouTube URL".to_string()));
    }
    if !video_url_patterns().iter().any(|re| re.is_match(url)) {
        return Err(ClientError::Validation(
            "Please enter a valid YouTube video URL (youtube.com/watch?v=... or youtu.be/...)"
                .to_string(),
        ));
    }
    Ok(url)
}

/// Splits a discovery listing into muxed video offers and audio-only offers,
/// keeping backend order. DASH video streams appear in neither list.
pub fn partition_formats(formats: &[Format]) -> (Vec<&Format>, Vec<&Format>) {
    let video = formats.iter().filter(|f| f.is_muxed_video()).collect();
    let audio = formats.iter().filter(|f| f.is_audio_only()).collect();
    (video, audio)
}

/// Default pick when no format id is given: tallest muxed video for mp4,
/// highest bitrate audio-only stream for mp3.
pub fn preferred_format(formats: &[Format], output_format: OutputFormat) -> Option<&Format> {
    let (video, audio) = partition_formats(formats);
    match output_format {
        OutputFormat::Mp4 => video.into_iter().max_by(|a, b| {
            a.height
                .unwrap_or(0.0)
                .total_cmp(&b.height.unwrap_or(0.0))
        }),
        OutputFormat::Mp3 => audio.into_iter().max_by(|a, b| {
            a.audio_bitrate
                .unwrap_or(0.0)
                .total_cmp(&b.audio_bitrate.unwrap_or(0.0))
        }),
    }
}

pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

pub fn format_size_mb(size_mb: Option<f64>) -> String {
    match size_mb {
        Some(size) if size > 1024.0 => format!("{:.1} GB", size / 1024.0),
        Some(size) if size > 0.0 => format!("{:.1} MB", size),
        _ => "Unknown".to_string(),
    }
}
