//! Contracts for services the gateway consumes but does not implement.

use chrono::{
    DateTime,
    Utc,
};
use message::VoiceFrame;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceCodecError {
    #[error("operation not supported by this codec")]
    NotSupported,

    #[error("codec failure: {0}")]
    Failed(String),
}

/// Vocoder for compressed voice frames.
pub trait VoiceCodec: Send + Sync {
    fn decode(&self, frame: &VoiceFrame) -> Result<Vec<i16>, VoiceCodecError>;

    fn encode(&self, _pcm: &[i16]) -> Result<VoiceFrame, VoiceCodecError> {
        Err(VoiceCodecError::NotSupported)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("persistence failed: {0}")]
pub struct SinkError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub call_id:        String,
    pub source_id:      u32,
    pub destination_id: u32,
    pub slot:           u8,
    pub started:        DateTime<Utc>,
    pub ended:          DateTime<Utc>,
    pub frames:         usize,
    pub recording:      Option<std::path::PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GpsPosition {
    pub radio_id:    u32,
    pub received_at: DateTime<Utc>,

    /// Undecoded GPS payload, hex encoded.
    pub raw: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RadioEvent {
    pub command:        String,
    pub source_id:      u32,
    pub destination_id: u32,
    pub slot:           u8,
    pub received_at:    DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Call(CallRecord),
    Gps(GpsPosition),
    RadioEvent(RadioEvent),
}

/// Durable storage for calls, positions and radio events.
#[async_trait::async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Returns the number of rows written.
    async fn save(&self, record: Record) -> Result<u64, SinkError>;
}

/// Sink that only logs records.
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingSink;

#[async_trait::async_trait]
impl PersistenceSink for TracingSink {
    async fn save(&self, record: Record) -> Result<u64, SinkError> {
        let json = serde_json::to_string(&record).map_err(|e| SinkError(e.to_string()))?;
        tracing::info!(record = %json, "persisted record");

        Ok(1)
    }
}
