use packed_struct::{
    prelude::*,
    PackedStructInfo,
    PackingResult,
};

/// The fixed big-endian "PH" marker that opens every dispatcher frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Signature;

impl Signature {
    pub const BYTES: [u8; 2] = Self::VALUE.to_be_bytes();
    pub const INSTANCE: Self = Self;
    pub const VALUE: u16 = 0x5048;

    /// Read the signature field from the start of `src`, if present.
    #[inline]
    pub fn read(src: &[u8]) -> Option<u16> {
        match src {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

impl PackedStruct for Signature {
    type ByteArray = [u8; 2];

    #[inline]
    fn pack(&self) -> PackingResult<Self::ByteArray> {
        Ok(Self::BYTES)
    }

    #[tracing::instrument(err(Display))]
    fn unpack(src: &Self::ByteArray) -> PackingResult<Self> {
        if *src == Self::BYTES {
            Ok(Self)
        } else {
            tracing::error!(expected = %hex::encode(Self::BYTES), got = %hex::encode(src), "invalid signature");
            Err(PackingError::InvalidValue)
        }
    }
}

impl PackedStructInfo for Signature {
    #[inline]
    fn packed_bits() -> usize {
        std::mem::size_of::<u16>() * 8
    }
}
