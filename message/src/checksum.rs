//! CRC-16/CCITT-FALSE (poly 0x1021, init 0xffff, MSB-first), shared by every frame format.
//!
//! The checksum always covers every byte of the serialized frame that precedes it and is
//! stored little-endian in the trailing two bytes.

use bytes::{
    BufMut,
    BytesMut,
};

use crate::error::{
    Error,
    Result,
};

const ALGORITHM: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

pub const SIZE: usize = std::mem::size_of::<u16>();

#[inline]
pub fn compute(data: &[u8]) -> u16 {
    ALGORITHM.checksum(data)
}

/// Append the checksum of `buf[start..]` to `buf`.
#[inline]
pub fn seal(buf: &mut BytesMut, start: usize) {
    let crc = compute(&buf[start..]);
    buf.put_u16_le(crc);
}

/// Check the trailing checksum of a complete serialized frame.
pub fn verify(frame: &[u8]) -> Result<()> {
    if frame.len() < SIZE {
        return Err(Error::TooShort {
            len: frame.len(),
            min: SIZE,
        });
    }

    let (body, trailer) = frame.split_at(frame.len() - SIZE);
    let stored = u16::from_le_bytes([trailer[0], trailer[1]]);
    let computed = compute(body);

    if stored != computed {
        tracing::trace!(
            stored = %format!("0x{stored:04x}"),
            computed = %format!("0x{computed:04x}"),
            body = %hex::encode(body),
            "frame with invalid checksum"
        );

        return Err(Error::BadChecksum {
            frame: stored,
            computed,
        });
    }

    Ok(())
}
