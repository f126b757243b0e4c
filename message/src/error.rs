use packed_struct::PackingError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reasons a byte sequence cannot be trusted as a frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("frame too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("bad signature 0x{found:04x}")]
    BadSignature { found: u16 },

    #[error("declared length {declared} does not match actual length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch (frame: 0x{frame:04x}, computed: 0x{computed:04x})")]
    BadChecksum { frame: u16, computed: u16 },

    #[error("payload of {len} bytes does not fit in a frame")]
    PayloadTooLarge { len: usize },

    #[error("voice frame must be exactly {expected} bytes, got {len}")]
    VoiceFrameLength { len: usize, expected: usize },

    #[error("voice frame number {0} outside superframe range 0..=5")]
    FrameNumber(u8),

    #[error(transparent)]
    Packing(#[from] PackingError),
}
