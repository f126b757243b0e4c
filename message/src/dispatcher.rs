use std::fmt::{
    Display,
    Formatter,
};

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};
use packed_struct::prelude::*;

use crate::{
    checksum,
    error::{
        Error,
        Result,
    },
    CommandCode,
    Signature,
};

/// Fixed-size leading portion of a dispatcher frame. Everything after the signature is
/// little-endian.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PackedStruct)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "19", endian = "lsb")]
pub struct DispatcherHeader {
    #[packed_field(size_bytes = "2")]
    pub signature:      Signature,
    pub sequence:       u32,
    pub total_length:   u16,
    pub command:        u16,
    pub slot:           u8,
    pub source_id:      u32,
    pub destination_id: u32,
}

/// A dispatcher-to-radio control-plane frame.
///
/// Length and checksum are not stored: they are derived from the other fields every time
/// the frame is serialized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DispatcherFrame {
    pub sequence:       u32,
    pub command:        CommandCode,
    pub slot:           u8,
    pub source_id:      u32,
    pub destination_id: u32,
    pub payload:        Bytes,
}

impl DispatcherFrame {
    pub const CRC_LEN: usize = checksum::SIZE;
    pub const HEADER_LEN: usize = 19;
    pub const MAX_PAYLOAD: usize = u16::MAX as usize - Self::MIN_LEN;
    pub const MIN_LEN: usize = Self::HEADER_LEN + Self::CRC_LEN;

    const LENGTH_OFFSET: usize = 6;

    #[inline]
    pub fn new(
        command: impl Into<CommandCode>,
        slot: u8,
        source_id: u32,
        destination_id: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            sequence: 0,
            command: command.into(),
            slot,
            source_id,
            destination_id,
            payload: payload.into(),
        }
    }

    #[inline]
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        Self::MIN_LEN + self.payload.len()
    }

    fn header(&self) -> Result<DispatcherHeader> {
        if self.payload.len() > Self::MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: self.payload.len(),
            });
        }

        Ok(DispatcherHeader {
            signature:      Signature,
            sequence:       self.sequence,
            total_length:   self.encoded_len() as u16,
            command:        self.command.raw(),
            slot:           self.slot,
            source_id:      self.source_id,
            destination_id: self.destination_id,
        })
    }

    /// Serialize onto the end of `dst`, recomputing the length and checksum fields.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let header = self.header()?.pack()?;

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
        let payload = &src[Self::HEADER_LEN..src.len() - Self::CRC_LEN];

        Ok(Self {
            sequence:       header.sequence,
            command:        CommandCode::from_raw(header.command),
            slot:           header.slot,
            source_id:      header.source_id,
            destination_id: header.destination_id,
            payload:        Bytes::copy_from_slice(payload),
        })
    }

    /// Total frame length declared by a buffered header prefix.
    ///
    /// Fails if the prefix can't start a frame, which on a stream means framing is lost.
    pub fn declared_len(prefix: &[u8]) -> Result<usize> {
        if prefix.len() < Self::LENGTH_OFFSET + 2 {
            return Err(Error::TooShort {
                len: prefix.len(),
                min: Self::LENGTH_OFFSET + 2,
            });
        }

        check_signature(prefix)?;

        let declared =
            u16::from_le_bytes([prefix[Self::LENGTH_OFFSET], prefix[Self::LENGTH_OFFSET + 1]])
                as usize;

        if declared < Self::MIN_LEN {
            return Err(Error::LengthMismatch {
                declared,
                actual: Self::MIN_LEN,
            });
        }

        Ok(declared)
    }
}

impl Display for DispatcherFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[seq {}] {} slot {}: {} -> {}",
            self.sequence, self.command, self.slot, self.source_id, self.destination_id
        )?;

        if !self.payload.is_empty() {
            write!(f, " / payload: 0x{}", hex::encode(&self.payload))?;
        }

        Ok(())
    }
}

fn check_signature(src: &[u8]) -> Result<()> {
    match Signature::read(src) {
        Some(Signature::VALUE) => Ok(()),
        Some(found) => Err(Error::BadSignature {
            found,
        }),
        None => Err(Error::TooShort {
            len: src.len(),
            min: DispatcherFrame::MIN_LEN,
        }),
    }
}

/// Structural checks shared by decoding and validation: signature, minimum size, declared
/// length and checksum, in that order.
pub(crate) fn check_structure(src: &[u8]) -> Result<DispatcherHeader> {
    check_signature(src)?;

    if src.len() < DispatcherFrame::MIN_LEN {
        return Err(Error::TooShort {
            len: src.len(),
            min: DispatcherFrame::MIN_LEN,
        });
    }

    let mut raw = [0u8; DispatcherFrame::HEADER_LEN];
    raw.copy_from_slice(&src[..DispatcherFrame::HEADER_LEN]);
    let header = DispatcherHeader::unpack(&raw)?;

    let declared = header.total_length as usize;
    if declared != src.len() {
        return Err(Error::LengthMismatch {
            declared,
            actual: src.len(),
        });
    }

    checksum::verify(src)?;

    Ok(header)
}

#[cfg(test)]
mod test {
    use packed_struct::PackedStructInfo;
    use proptest::prelude::*;

    use super::*;
    use crate::Command;

    #[test]
    fn header_size_matches_layout() {
        assert_eq!(DispatcherHeader::packed_bits() / 8, DispatcherFrame::HEADER_LEN);
    }

    #[test]
    fn ptt_press_scenario() {
        let frame = DispatcherFrame::ptt(9_000_001, 100, 0, true);
        let encoded = frame.encode().unwrap();
        let decoded = DispatcherFrame::decode(&encoded).unwrap();

        assert_eq!(decoded.command, Command::PttPress);
        assert_eq!(decoded.source_id, 9_000_001);
        assert_eq!(decoded.destination_id, 100);
        assert_eq!(decoded.slot, 0);
        assert_eq!(decoded.payload.len(), 0);
    }

    #[test]
    fn wire_layout() {
        let frame = DispatcherFrame::new(Command::Keepalive, 1, 0x0403_0201, 0x0807_0605, &b"xy"[..])
            .with_sequence(0x0d0c_0b0a);
        let encoded = frame.encode().unwrap();

        assert_eq!(encoded.len(), 23);
        assert_eq!(&encoded[0..2], b"PH");
        assert_eq!(&encoded[2..6], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(&encoded[6..8], &[23, 0]);
        assert_eq!(&encoded[8..10], &[0x00, 0x71]);
        assert_eq!(encoded[10], 1);
        assert_eq!(&encoded[11..15], &[1, 2, 3, 4]);
        assert_eq!(&encoded[15..19], &[5, 6, 7, 8]);
        assert_eq!(&encoded[19..21], b"xy");

        let crc = checksum::compute(&encoded[..21]);
        assert_eq!(&encoded[21..], &crc.to_le_bytes());
    }

    #[test]
    fn encode_appends_after_existing_data() {
        let frame = DispatcherFrame::keepalive(7);

        let mut buf = BytesMut::from(&b"prefix"[..]);
        frame.encode_into(&mut buf).unwrap();

        assert_eq!(DispatcherFrame::decode(&buf[6..]).unwrap(), frame);
    }

    #[test]
    fn rejects_bad_signature() {
        let result = DispatcherFrame::decode(&[0xff, 0xff, 0, 0, 0, 0, 8, 0]);

        assert_eq!(
            result,
            Err(Error::BadSignature {
                found: 0xffff,
            })
        );
    }

    #[test]
    fn rejects_short_input() {
        let encoded = DispatcherFrame::keepalive(1).encode().unwrap();

        assert!(matches!(
            DispatcherFrame::decode(&encoded[..20]),
            Err(Error::TooShort { len: 20, min: 21 })
        ));
        assert!(matches!(DispatcherFrame::decode(&[]), Err(Error::TooShort { .. })));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut encoded = BytesMut::from(&DispatcherFrame::keepalive(1).encode().unwrap()[..]);
        encoded.put_u8(0);

        assert!(matches!(
            DispatcherFrame::decode(&encoded),
            Err(Error::LengthMismatch {
                declared: 21,
                actual:   22,
            })
        ));
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut encoded = BytesMut::from(&DispatcherFrame::keepalive(1).encode().unwrap()[..]);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        assert!(matches!(DispatcherFrame::decode(&encoded), Err(Error::BadChecksum { .. })));
    }

    #[test]
    fn unknown_commands_decode() {
        let frame = DispatcherFrame::new(CommandCode::from_raw(0x4242), 0, 1, 2, Bytes::new());
        let decoded = DispatcherFrame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.command.raw(), 0x4242);
        assert_eq!(decoded.command.kind(), None);
    }

    #[test]
    fn oversized_payload_fails_to_encode() {
        let frame = DispatcherFrame::new(
            Command::TextMessageSend,
            0,
            1,
            2,
            vec![0u8; DispatcherFrame::MAX_PAYLOAD + 1],
        );

        assert!(matches!(frame.encode(), Err(Error::PayloadTooLarge { .. })));
    }

    #[test]
    fn declared_len_reads_prefix() {
        let encoded = DispatcherFrame::text_message(1, 2, "hi").encode().unwrap();

        assert_eq!(DispatcherFrame::declared_len(&encoded[..19]).unwrap(), encoded.len());
        assert!(matches!(
            DispatcherFrame::declared_len(&[0xff, 0xff, 0, 0, 0, 0, 30, 0]),
            Err(Error::BadSignature { .. })
        ));
        assert!(matches!(
            DispatcherFrame::declared_len(&[0x50, 0x48, 0, 0, 0, 0, 3, 0]),
            Err(Error::LengthMismatch { declared: 3, .. })
        ));
    }

    prop_compose! {
        fn frame_strategy()(
            sequence in any::<u32>(),
            command in any::<u16>(),
            slot in any::<u8>(),
            source_id in any::<u32>(),
            destination_id in any::<u32>(),
            payload in proptest::collection::vec(any::<u8>(), 0..128),
        ) -> DispatcherFrame {
            DispatcherFrame {
                sequence,
                command: CommandCode::from_raw(command),
                slot,
                source_id,
                destination_id,
                payload: payload.into(),
            }
        }
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(frame in frame_strategy()) {
            let encoded = frame.encode().unwrap();
            prop_assert_eq!(encoded.len(), frame.encoded_len());

            let decoded = DispatcherFrame::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, frame);
        }

        #[test]
        fn single_byte_corruption_is_rejected(
            frame in frame_strategy(),
            index in any::<proptest::sample::Index>(),
            flip in 1u8..,
        ) {
            let mut encoded = BytesMut::from(&frame.encode().unwrap()[..]);
            let body_len = encoded.len() - DispatcherFrame::CRC_LEN;
            let i = index.index(body_len);
            encoded[i] ^= flip;

            prop_assert!(DispatcherFrame::decode(&encoded).is_err());
        }
    }
}
