use std::{
    io,
    path::{
        Path,
        PathBuf,
    },
};

use message::VoiceFrame;

use super::RecordingMetadata;

/// Storage for finished recordings.
#[async_trait::async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Store the frames of a call, returning where they went.
    async fn write_audio(&self, stem: &str, frames: &[VoiceFrame]) -> io::Result<PathBuf>;
    async fn write_metadata(&self, stem: &str, metadata: &RecordingMetadata) -> io::Result<PathBuf>;
}

/// Writes `<stem>.ambe` (voice frames back to back) and `<stem>.json` into one directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsArtifactWriter {
    directory: PathBuf,
}

impl FsArtifactWriter {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_owned(),
        }
    }

    async fn write(&self, stem: &str, extension: &str, contents: Vec<u8>) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let path = self.directory.join(stem).with_extension(extension);
        tokio::fs::write(&path, contents).await?;

        Ok(path)
    }
}

#[async_trait::async_trait]
impl ArtifactWriter for FsArtifactWriter {
    #[tracing::instrument(skip(self, frames), fields(frames = frames.len()), err)]
    async fn write_audio(&self, stem: &str, frames: &[VoiceFrame]) -> io::Result<PathBuf> {
        let audio = frames.iter().flat_map(|frame| frame.encode()).collect::<Vec<_>>();

        self.write(stem, "ambe", audio).await
    }

    #[tracing::instrument(skip(self, metadata), err)]
    async fn write_metadata(&self, stem: &str, metadata: &RecordingMetadata) -> io::Result<PathBuf> {
        let json = serde_json::to_vec_pretty(metadata)?;

        self.write(stem, "json", json).await
    }
}
