use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};
use chrono::{
    DateTime,
    Utc,
};

use crate::{
    error::{
        Error,
        Result,
    },
    AirPacket,
};

const LEN: usize = 33;

/// One compressed voice frame. Always exactly [`VoiceFrame::LEN`] bytes of vocoder data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VoiceFrame {
    data:         [u8; LEN],
    frame_number: u8,
    last:         bool,
    timestamp:    DateTime<Utc>,
}

impl VoiceFrame {
    pub const FRAMES_PER_SUPERFRAME: u8 = 6;
    pub const LEN: usize = LEN;

    /// Bytes a frame occupies inside a `VOICE_FRAME` dispatcher payload.
    pub const PAYLOAD_LEN: usize = Self::LEN + 2;

    pub fn new(data: &[u8], frame_number: u8, last: bool) -> Result<Self> {
        if frame_number >= Self::FRAMES_PER_SUPERFRAME {
            return Err(Error::FrameNumber(frame_number));
        }

        let data = <[u8; LEN]>::try_from(data).map_err(|_| Error::VoiceFrameLength {
            len:      data.len(),
            expected: Self::LEN,
        })?;

        Ok(Self {
            data,
            frame_number,
            last,
            timestamp: Utc::now(),
        })
    }

    #[inline]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[inline]
    pub fn data(&self) -> &[u8; LEN] {
        &self.data
    }

    #[inline]
    pub fn frame_number(&self) -> u8 {
        self.frame_number
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.last
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[inline]
    pub fn encode(&self) -> [u8; LEN] {
        self.data
    }

    #[inline]
    pub fn decode(src: &[u8], frame_number: u8, last: bool) -> Result<Self> {
        Self::new(src, frame_number, last)
    }

    /// Payload form used by `VOICE_FRAME` frames: data, frame number, last-frame flag.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::PAYLOAD_LEN);
        buf.put_slice(&self.data);
        buf.put_u8(self.frame_number);
        buf.put_u8(self.last as u8);

        buf.freeze()
    }

    /// Accepts the bare 33 data bytes (frame 0, not last) or the full payload form.
    pub fn from_payload(src: &[u8]) -> Result<Self> {
        match src.len() {
            Self::LEN => Self::new(src, 0, false),
            Self::PAYLOAD_LEN => Self::new(&src[..Self::LEN], src[Self::LEN], src[Self::LEN + 1] != 0),
            len => Err(Error::VoiceFrameLength {
                len,
                expected: Self::LEN,
            }),
        }
    }

    pub fn from_air_packet(packet: &AirPacket, frame_number: u8) -> Result<Self> {
        Self::new(&packet.payload, frame_number, false)
    }
}
