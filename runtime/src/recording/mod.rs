use std::{
    path::PathBuf,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
};

use chrono::{
    DateTime,
    Utc,
};
use dashmap::{
    mapref::entry::Entry,
    DashMap,
};
use message::VoiceFrame;

mod writer;

pub use writer::{
    ArtifactWriter,
    FsArtifactWriter,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecorderConfig {
    pub enabled:   bool,
    pub directory: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled:   true,
            directory: PathBuf::from("./recordings"),
        }
    }
}

/// An in-progress call recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recording {
    pub call_id:      String,
    pub radio_id:     u32,
    pub talkgroup_id: u32,
    pub slot:         u8,
    pub started:      DateTime<Utc>,
    pub frames:       Vec<VoiceFrame>,
}

impl Recording {
    /// Artifact file name without extension, derived only from when and where the call
    /// happened.
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}_slot{}",
            self.started.format("%Y%m%d_%H%M%S%3f"),
            self.radio_id,
            self.talkgroup_id,
            self.slot
        )
    }

    fn metadata(&self, ended: DateTime<Utc>) -> RecordingMetadata {
        RecordingMetadata {
            call_id:      self.call_id.clone(),
            radio_id:     self.radio_id,
            talkgroup_id: self.talkgroup_id,
            slot:         self.slot,
            start:        self.started,
            end:          ended,
            duration_ms:  (ended - self.started).num_milliseconds().max(0),
            frame_count:  self.frames.len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RecordingMetadata {
    pub call_id:      String,
    pub radio_id:     u32,
    pub talkgroup_id: u32,
    pub slot:         u8,
    pub start:        DateTime<Utc>,
    pub end:          DateTime<Utc>,
    pub duration_ms:  i64,
    pub frame_count:  usize,
}

/// Accumulates voice frames per call and hands finished calls to an [`ArtifactWriter`].
pub struct Recorder {
    enabled:       AtomicBool,
    shutting_down: AtomicBool,
    active:        DashMap<String, Recording>,
    writer:        Arc<dyn ArtifactWriter>,
}

impl Recorder {
    pub fn new(enabled: bool, writer: Arc<dyn ArtifactWriter>) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            shutting_down: AtomicBool::new(false),
            active: DashMap::new(),
            writer,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(config.enabled, Arc::new(FsArtifactWriter::new(&config.directory)))
    }

    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_recording(&self, call_id: &str) -> bool {
        self.active.contains_key(call_id)
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Begin recording `call_id`. Returns `false` if recording is disabled, the recorder is
    /// shutting down, or the call is already being recorded.
    pub fn start_recording(&self, call_id: &str, radio_id: u32, talkgroup_id: u32, slot: u8) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            tracing::debug!(call_id, "recording disabled");
            return false;
        }

        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::debug!(call_id, "recorder shutting down");
            return false;
        }

        match self.active.entry(call_id.to_owned()) {
            Entry::Occupied(_) => {
                tracing::warn!(call_id, "call already being recorded");
                return false;
            },
            Entry::Vacant(entry) => {
                entry.insert(Recording {
                    call_id: call_id.to_owned(),
                    radio_id,
                    talkgroup_id,
                    slot,
                    started: Utc::now(),
                    frames: vec![],
                });
            },
        }

        // `shutdown` may have taken its snapshot between the check above and the insert.
        if self.shutting_down.load(Ordering::SeqCst) {
            self.active.remove(call_id);
            tracing::debug!(call_id, "recorder shut down while starting");
            return false;
        }

        tracing::info!(call_id, radio_id, talkgroup_id, slot, "recording started");
        true
    }

    /// Frames for calls that aren't being recorded are dropped.
    pub fn append_frame(&self, call_id: &str, frame: VoiceFrame) {
        match self.active.get_mut(call_id) {
            Some(mut recording) => recording.frames.push(frame),
            None => tracing::trace!(call_id, "frame for unknown recording"),
        }
    }

    /// Finish `call_id` and write its artifacts. Returns the audio artifact path, or `None`
    /// if nothing was recording or either write failed.
    #[tracing::instrument(skip(self))]
    pub async fn stop_recording(&self, call_id: &str) -> Option<PathBuf> {
        let (_, recording) = self.active.remove(call_id)?;
        let ended = Utc::now();
        let stem = recording.stem();

        let audio = match self.writer.write_audio(&stem, &recording.frames).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, %stem, "writing call audio");
                return None;
            },
        };

        if let Err(e) = self.writer.write_metadata(&stem, &recording.metadata(ended)).await {
            tracing::error!(error = %e, %stem, "writing call metadata");
            return None;
        }

        tracing::info!(path = %audio.display(), frames = recording.frames.len(), "recording saved");
        Some(audio)
    }

    /// Refuse new recordings and stop every active one.
    pub async fn shutdown(&self) -> Vec<PathBuf> {
        self.shutting_down.store(true, Ordering::SeqCst);

        let call_ids = self
            .active
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();

        let mut saved = vec![];
        for call_id in call_ids {
            if let Some(path) = self.stop_recording(&call_id).await {
                saved.push(path);
            }
        }

        saved
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn recorder(dir: &std::path::Path) -> Recorder {
        Recorder::new(true, Arc::new(FsArtifactWriter::new(dir)))
    }

    fn voice(n: u8) -> VoiceFrame {
        VoiceFrame::new(&[n; 33], n % VoiceFrame::FRAMES_PER_SUPERFRAME, false).unwrap()
    }

    #[tokio::test]
    async fn lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path());

        assert!(recorder.start_recording("c1", 1001, 9, 0));
        assert!(!recorder.start_recording("c1", 1001, 9, 0));

        recorder.append_frame("unknown", voice(0));
        recorder.append_frame("c1", voice(1));
        recorder.append_frame("c1", voice(2));

        let path = recorder.stop_recording("c1").await.unwrap();
        assert!(!recorder.is_recording("c1"));
        assert_eq!(recorder.active_count(), 0);

        let audio = std::fs::read(&path).unwrap();
        assert_eq!(audio.len(), 66);
        assert_eq!(audio[33], 2);

        let metadata: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path.with_extension("json")).unwrap()).unwrap();
        assert_eq!(metadata["call_id"], "c1");
        assert_eq!(metadata["frame_count"], 2);
        assert_eq!(metadata["talkgroup_id"], 9);

        assert_eq!(recorder.stop_recording("c1").await, None);
    }

    #[tokio::test]
    async fn refuses_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path());

        recorder.set_enabled(false);
        assert!(!recorder.start_recording("c1", 1, 2, 0));

        recorder.set_enabled(true);
        assert!(recorder.start_recording("c1", 1, 2, 0));
    }

    #[tokio::test]
    async fn shutdown_saves_active_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path());

        assert!(recorder.start_recording("a", 1, 2, 0));
        assert!(recorder.start_recording("b", 3, 4, 1));

        let saved = recorder.shutdown().await;
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|path| path.exists()));

        assert!(!recorder.start_recording("c", 5, 6, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn nothing_outlives_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(recorder(dir.path()));

        let starters = (0..4u32)
            .map(|worker| {
                let recorder = recorder.clone();

                tokio::spawn(async move {
                    for n in 0..200u32 {
                        recorder.start_recording(&format!("{worker}-{n}"), worker * 1000 + n, 9, 0);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect::<Vec<_>>();

        tokio::task::yield_now().await;
        recorder.shutdown().await;

        for starter in starters {
            starter.await.unwrap();
        }

        assert_eq!(recorder.active_count(), 0);
        assert!(!recorder.start_recording("late", 1, 2, 0));
    }

    #[tokio::test]
    async fn write_failure_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let recorder = recorder(&blocker);
        assert!(recorder.start_recording("c1", 1, 2, 0));

        assert_eq!(recorder.stop_recording("c1").await, None);
        assert!(!recorder.is_recording("c1"));
    }

    #[test]
    fn stem_is_deterministic() {
        let recording = Recording {
            call_id:      "ignored".into(),
            radio_id:     1001,
            talkgroup_id: 9,
            slot:         1,
            started:      Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
            frames:       vec![],
        };

        assert_eq!(recording.stem(), "20240305_140709000_1001_9_slot1");
    }
}
