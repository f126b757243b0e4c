use std::fmt::{
    Display,
    Formatter,
};

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};
use packed_struct::{
    prelude::*,
    PackedStructInfo,
    PackingResult,
};

use crate::{
    checksum,
    error::{
        Error,
        Result,
    },
};

/// The 48-bit synchronisation pattern that opens a DMR burst.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct SyncPattern(pub [u8; 6]);

impl SyncPattern {
    pub const BS_DATA: Self = Self([0xdf, 0xf5, 0x7d, 0x75, 0xdf, 0x5d]);
    pub const BS_VOICE: Self = Self([0x75, 0x5f, 0xd7, 0xdf, 0x75, 0xf7]);
    pub const MS_DATA: Self = Self([0xd5, 0xd7, 0xf7, 0x7f, 0xd7, 0x57]);
    pub const MS_VOICE: Self = Self([0x7f, 0x7d, 0x5d, 0xd5, 0x7d, 0xfd]);
}

impl PackedStruct for SyncPattern {
    type ByteArray = [u8; 6];

    #[inline]
    fn pack(&self) -> PackingResult<Self::ByteArray> {
        Ok(self.0)
    }

    #[inline]
    fn unpack(src: &Self::ByteArray) -> PackingResult<Self> {
        Ok(Self(*src))
    }
}

impl PackedStructInfo for SyncPattern {
    #[inline]
    fn packed_bits() -> usize {
        6 * 8
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BurstType {
    VoiceHeader,
    Voice,
    VoiceTerminator,
    Data,
    Csbk,
    Idle,
    Reserved(u8),
}

impl BurstType {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0f {
            0x1 => Self::VoiceHeader,
            0x2 => Self::Voice,
            0x3 => Self::VoiceTerminator,
            0x4 => Self::Data,
            0x5 => Self::Csbk,
            0xf => Self::Idle,
            other => Self::Reserved(other),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Self::VoiceHeader => 0x1,
            Self::Voice => 0x2,
            Self::VoiceTerminator => 0x3,
            Self::Data => 0x4,
            Self::Csbk => 0x5,
            Self::Idle => 0xf,
            Self::Reserved(other) => other & 0x0f,
        }
    }
}

/// Color code (high nibble) and burst type (low nibble) sharing one byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BurstInfo {
    pub color_code: u8,
    pub burst_type: BurstType,
}

impl PackedStruct for BurstInfo {
    type ByteArray = [u8; 1];

    #[inline]
    fn pack(&self) -> PackingResult<Self::ByteArray> {
        Ok([(self.color_code & 0x0f) << 4 | self.burst_type.nibble()])
    }

    #[inline]
    fn unpack(src: &Self::ByteArray) -> PackingResult<Self> {
        Ok(Self {
            color_code: src[0] >> 4,
            burst_type: BurstType::from_nibble(src[0]),
        })
    }
}

impl PackedStructInfo for BurstInfo {
    #[inline]
    fn packed_bits() -> usize {
        8
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PrimitiveEnum_u8, serde::Serialize, serde::Deserialize,
)]
#[repr(u8)]
pub enum CallType {
    Private = 0x00,
    Group   = 0x01,
    All     = 0x02,
}

impl Default for CallType {
    #[inline]
    fn default() -> Self {
        Self::Group
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PackedStruct)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "19", endian = "lsb")]
pub struct AirHeader {
    #[packed_field(size_bytes = "6")]
    pub sync:           SyncPattern,
    pub slot:           u8,
    #[packed_field(size_bytes = "1")]
    pub burst:          BurstInfo,
    pub source_id:      u32,
    pub destination_id: u32,
    #[packed_field(size_bytes = "1", ty = "enum")]
    pub call_type:      CallType,
    pub sequence:       u16,
}

/// A DMR air-interface burst as captured for recording and parsing.
///
/// Source and destination keep their 32-bit wire width; only the low 24 bits carry a DMR id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AirPacket {
    pub sync:            SyncPattern,
    pub slot:            u8,
    pub color_code:      u8,
    pub burst_type:      BurstType,
    pub call_type:       CallType,
    pub source_id:       u32,
    pub destination_id:  u32,
    pub sequence_number: u16,
    pub payload:         Bytes,
}

impl AirPacket {
    pub const CRC_LEN: usize = checksum::SIZE;
    pub const HEADER_LEN: usize = 19;
    pub const MIN_LEN: usize = Self::HEADER_LEN + Self::CRC_LEN;

    #[inline]
    pub fn encoded_len(&self) -> usize {
        Self::MIN_LEN + self.payload.len()
    }

    fn header(&self) -> AirHeader {
        AirHeader {
            sync:           self.sync,
            slot:           self.slot,
            burst:          BurstInfo {
                color_code: self.color_code,
                burst_type: self.burst_type,
            },
            source_id:      self.source_id,
            destination_id: self.destination_id,
            call_type:      self.call_type,
            sequence:       self.sequence_number,
        }
    }

    /// Serialize onto the end of `dst`. The color code is truncated to its 4 wire bits.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let header = self.header().pack()?;

        let start = dst.len();
        dst.reserve(self.encoded_len());
        dst.put_slice(&header);
        dst.put_slice(&self.payload);
        checksum::seal(dst, start);

        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;

        Ok(buf.freeze())
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        let header = check_structure(src)?;

        Ok(Self {
            sync:            header.sync,
            slot:            header.slot,
            color_code:      header.burst.color_code,
            burst_type:      header.burst.burst_type,
            call_type:       header.call_type,
            source_id:       header.source_id,
            destination_id:  header.destination_id,
            sequence_number: header.sequence,
            payload:         Bytes::copy_from_slice(&src[Self::HEADER_LEN..src.len() - Self::CRC_LEN]),
        })
    }

    /// The 24 bits of the source id that carry a DMR radio id.
    #[inline]
    pub fn source_dmr_id(&self) -> u32 {
        self.source_id & 0x00ff_ffff
    }

    #[inline]
    pub fn destination_dmr_id(&self) -> u32 {
        self.destination_id & 0x00ff_ffff
    }
}

impl Display for AirPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[seq {}] {:?} {:?} cc {} slot {}: {} -> {} ({} payload bytes)",
            self.sequence_number,
            self.burst_type,
            self.call_type,
            self.color_code,
            self.slot,
            self.source_id,
            self.destination_id,
            self.payload.len()
        )
    }
}

pub(crate) fn check_structure(src: &[u8]) -> Result<AirHeader> {
    if src.len() < AirPacket::MIN_LEN {
        return Err(Error::TooShort {
            len: src.len(),
            min: AirPacket::MIN_LEN,
        });
    }

    checksum::verify(src)?;

    let mut raw = [0u8; AirPacket::HEADER_LEN];
    raw.copy_from_slice(&src[..AirPacket::HEADER_LEN]);

    Ok(AirHeader::unpack(&raw)?)
}
