use crate::core::metadata::Artifact;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::io::ErrorKind;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Where finished downloads end up.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, filename: &str, artifact: &Artifact) -> std::io::Result<PathBuf>;
}

/// Writes artifacts into a directory on the local filesystem.
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Opens a file that did not exist before. Taken names get a ` (n)`
    /// suffix ahead of the extension, so earlier downloads are never replaced.
    async fn create_unique(&self, filename: &str) -> std::io::Result<(PathBuf, File)> {
        let mut path = self.output_dir.join(filename);
        let mut attempt = 0u32;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                    path = self.output_dir.join(numbered_name(filename, attempt));
                    debug!("{} exists, trying {}", filename, path.display());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

fn numbered_name(filename: &str, n: u32) -> String {
    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    match name.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn save(&self, filename: &str, artifact: &Artifact) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let (path, mut file) = self.create_unique(filename).await?;
        file.write_all(&artifact.data).await?;
        file.flush().await?;

        info!(
            "Saved {} bytes ({}) to {}",
            artifact.len(),
            artifact.mime_type,
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_file_sink_creates_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(temp_dir.path().join("nested"));
        let artifact = Artifact {
            data: Bytes::from_static(b"abc"),
            mime_type: "video/mp4",
        };

        let path = tokio_test::block_on(sink.save("clip.mp4", &artifact)).unwrap();

        assert_eq!(path, temp_dir.path().join("nested").join("clip.mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_file_sink_keeps_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(temp_dir.path());
        let first = Artifact {
            data: Bytes::from_static(b"first"),
            mime_type: "video/mp4",
        };
        let second = Artifact {
            data: Bytes::from_static(b"second"),
            mime_type: "video/mp4",
        };

        let first_path = tokio_test::block_on(sink.save("clip.mp4", &first)).unwrap();
        let second_path = tokio_test::block_on(sink.save("clip.mp4", &second)).unwrap();

        assert_eq!(first_path, temp_dir.path().join("clip.mp4"));
        assert_eq!(second_path, temp_dir.path().join("clip (1).mp4"));
        assert_eq!(std::fs::read(&first_path).unwrap(), b"first");
        assert_eq!(std::fs::read(&second_path).unwrap(), b"second");
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("clip.mp4", 2), "clip (2).mp4");
        assert_eq!(numbered_name("clip", 1), "clip (1)");
    }
}
