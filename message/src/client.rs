//! The framing spoken between dispatcher clients and the gateway's multi-client server.

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
    error::{
        Error,
        Result,
    },
    ClientCommand,
    ClientCommandCode,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PackedStruct)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12", endian = "lsb")]
pub struct ClientHeader {
    pub length:    u16,
    pub client_id: u32,
    pub command:   u16,
    pub sequence:  u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClientFrame {
    pub client_id: u32,
    pub command:   ClientCommandCode,
    pub sequence:  u32,
    pub payload:   Bytes,
}

impl ClientFrame {
    pub const HEADER_LEN: usize = 12;
    pub const MAX_PAYLOAD: usize = u16::MAX as usize - Self::HEADER_LEN;
    pub const MIN_LEN: usize = Self::HEADER_LEN;

    #[inline]
    pub fn new(
        client_id: u32,
        command: impl Into<ClientCommandCode>,
        sequence: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            client_id,
            command: command.into(),
            sequence,
            payload: payload.into(),
        }
    }

    /// Acknowledge a registration, echoing its sequence number.
    #[inline]
    pub fn register_ack(request: &ClientFrame) -> Self {
        Self::new(request.client_id, ClientCommand::RegisterAck, request.sequence, Bytes::new())
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.payload.len()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > Self::MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: self.payload.len(),
            });
        }

        let header = ClientHeader {
            length:    self.encoded_len() as u16,
            client_id: self.client_id,
            command:   self.command.raw(),
            sequence:  self.sequence,
        }
        .pack()?;

        dst.reserve(self.encoded_len());
        dst.put_slice(&header);
        dst.put_slice(&self.payload);

        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;

        Ok(buf.freeze())
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < Self::HEADER_LEN {
            return Err(Error::TooShort {
                len: src.len(),
                min: Self::HEADER_LEN,
            });
        }

        let mut raw = [0u8; Self::HEADER_LEN];
        raw.copy_from_slice(&src[..Self::HEADER_LEN]);
        let header = ClientHeader::unpack(&raw)?;

        if header.length as usize != src.len() {
            return Err(Error::LengthMismatch {
                declared: header.length as usize,
                actual:   src.len(),
            });
        }

        Ok(Self {
            client_id: header.client_id,
            command:   ClientCommandCode::from_raw(header.command),
            sequence:  header.sequence,
            payload:   Bytes::copy_from_slice(&src[Self::HEADER_LEN..]),
        })
    }

    pub fn declared_len(prefix: &[u8]) -> Result<usize> {
        let declared = match prefix {
            [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]) as usize,
            _ => {
                return Err(Error::TooShort {
                    len: prefix.len(),
                    min: 2,
                })
            },
        };

        if declared < Self::MIN_LEN {
            return Err(Error::LengthMismatch {
                declared,
                actual: Self::MIN_LEN,
            });
        }

        Ok(declared)
    }
}

impl Display for ClientFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "client {} [seq {}] {} ({} payload bytes)",
            self.client_id,
            self.sequence,
            self.command,
            self.payload.len()
        )
    }
}

fn read_u32(payload: &[u8], min: usize) -> Result<u32> {
    match payload {
        [a, b, c, d, ..] if payload.len() >= min => Ok(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => Err(Error::TooShort {
            len: payload.len(),
            min,
        }),
    }
}

/// `SEND_PTT` payload: target id, press flag, and an optional slot byte (slot 0 if absent).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PttRequest {
    pub target_id: u32,
    pub press:     bool,
    pub slot:      u8,
}

impl PttRequest {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let target_id = read_u32(payload, 5)?;

        Ok(Self {
            target_id,
            press: payload[4] != 0,
            slot: payload.get(5).copied().unwrap_or(0),
        })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6);
        buf.put_u32_le(self.target_id);
        buf.put_u8(self.press as u8);
        buf.put_u8(self.slot);

        buf.freeze()
    }
}

/// `SEND_GPS_REQUEST` payload: the radio to poll.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GpsRequest {
    pub target_id: u32,
}

impl GpsRequest {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            target_id: read_u32(payload, 4)?,
        })
    }

    pub fn to_payload(&self) -> Bytes {
        Bytes::copy_from_slice(&self.target_id.to_le_bytes())
    }
}

/// `SEND_TEXT` payload: target id followed by UTF-8 text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextRequest {
    pub target_id: u32,
    pub text:      String,
}

impl TextRequest {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let target_id = read_u32(payload, 4)?;

        Ok(Self {
            target_id,
            text: String::from_utf8_lossy(&payload[4..]).into_owned(),
        })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.text.len());
        buf.put_u32_le(self.target_id);
        buf.put_slice(self.text.as_bytes());

        buf.freeze()
    }
}

#[cfg(test)]
mod test {
    use packed_struct::PackedStructInfo;

    use super::*;

    #[test]
    fn header_size_matches_layout() {
        assert_eq!(ClientHeader::packed_bits() / 8, ClientFrame::HEADER_LEN);
    }

    #[test]
    fn wire_layout() {
        let frame = ClientFrame::new(0x0102_0304, ClientCommand::SendPtt, 9, &b"abc"[..]);
        let encoded = frame.encode().unwrap();

        assert_eq!(&encoded[..], &[15, 0, 4, 3, 2, 1, 0x10, 0, 9, 0, 0, 0, b'a', b'b', b'c']);
        assert_eq!(ClientFrame::decode(&encoded).unwrap(), frame);
        assert_eq!(ClientFrame::declared_len(&encoded).unwrap(), 15);
    }

    #[test]
    fn register_ack_echoes_sequence() {
        let request = ClientFrame::new(42, ClientCommand::Register, 77, Bytes::new());
        let ack = ClientFrame::register_ack(&request);

        assert_eq!(ack.command, ClientCommand::RegisterAck);
        assert_eq!(ack.sequence, 77);
        assert_eq!(ack.client_id, 42);
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(matches!(ClientFrame::decode(&[0; 4]), Err(Error::TooShort { .. })));
        assert!(matches!(
            ClientFrame::decode(&[13, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::LengthMismatch { .. })
        ));
        assert!(matches!(ClientFrame::declared_len(&[4, 0]), Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn ptt_request_payloads() {
        let parsed = PttRequest::parse(&[100, 0, 0, 0, 1]).unwrap();
        assert_eq!(parsed, PttRequest {
            target_id: 100,
            press:     true,
            slot:      0,
        });

        let with_slot = PttRequest {
            target_id: 7,
            press:     false,
            slot:      1,
        };
        assert_eq!(PttRequest::parse(&with_slot.to_payload()).unwrap(), with_slot);

        assert!(PttRequest::parse(&[1, 0, 0, 0]).is_err());
    }

    #[test]
    fn gps_and_text_payloads() {
        assert_eq!(GpsRequest::parse(&[5, 0, 0, 0]).unwrap().target_id, 5);
        assert!(GpsRequest::parse(&[5, 0]).is_err());

        let text = TextRequest {
            target_id: 3,
            text:      "hello".to_string(),
        };
        assert_eq!(TextRequest::parse(&text.to_payload()).unwrap(), text);
    }
}
