//! Canonical frames for each command so call sites never assemble byte layouts by hand.

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};
use packed_struct::PrimitiveEnum;
use tap::Pipe;

use crate::{
    CallType,
    Command,
    DispatcherFrame,
    VoiceFrame,
};

/// Radio-side id used by frames that have no meaningful destination.
pub const NO_DESTINATION: u32 = 0;

impl DispatcherFrame {
    #[inline]
    pub fn login(dispatcher_id: u32, auth: impl Into<Bytes>) -> Self {
        Self::new(Command::Login, 0, dispatcher_id, NO_DESTINATION, auth)
    }

    #[inline]
    pub fn login_response(radio_id: u32, dispatcher_id: u32) -> Self {
        Self::new(Command::LoginResponse, 0, radio_id, dispatcher_id, Bytes::new())
    }

    #[inline]
    pub fn keepalive(dispatcher_id: u32) -> Self {
        Self::new(Command::Keepalive, 0, dispatcher_id, NO_DESTINATION, Bytes::new())
    }

    #[inline]
    pub fn keepalive_response(radio_id: u32, dispatcher_id: u32) -> Self {
        Self::new(Command::KeepaliveResponse, 0, radio_id, dispatcher_id, Bytes::new())
    }

    #[inline]
    pub fn disconnect(dispatcher_id: u32) -> Self {
        Self::new(Command::Disconnect, 0, dispatcher_id, NO_DESTINATION, Bytes::new())
    }

    #[inline]
    pub fn ptt(dispatcher_id: u32, destination_id: u32, slot: u8, press: bool) -> Self {
        let command = if press { Command::PttPress } else { Command::PttRelease };

        Self::new(command, slot, dispatcher_id, destination_id, Bytes::new())
    }

    #[inline]
    pub fn gps_request(dispatcher_id: u32, target_id: u32) -> Self {
        Self::new(Command::GpsRequest, 0, dispatcher_id, target_id, Bytes::new())
    }

    pub fn text_message(dispatcher_id: u32, destination_id: u32, text: &str) -> Self {
        Self::new(Command::TextMessageSend, 0, dispatcher_id, destination_id, encode_text(text))
    }

    #[inline]
    pub fn call_start(slot: u8, source_id: u32, destination_id: u32, call_type: CallType) -> Self {
        Self::new(
            Command::CallStart,
            slot,
            source_id,
            destination_id,
            vec![call_type.to_primitive()],
        )
    }

    #[inline]
    pub fn call_end(slot: u8, source_id: u32, destination_id: u32) -> Self {
        Self::new(Command::CallEnd, slot, source_id, destination_id, Bytes::new())
    }

    #[inline]
    pub fn voice(slot: u8, source_id: u32, destination_id: u32, frame: &VoiceFrame) -> Self {
        Self::new(Command::VoiceFrame, slot, source_id, destination_id, frame.to_payload())
    }

    /// Text carried by a text-message frame, if the payload is valid UTF-16LE.
    pub fn text(&self) -> Option<String> {
        match self.command.kind()? {
            Command::TextMessageSend | Command::TextMessageReceive => decode_text(&self.payload),
            _ => None,
        }
    }

    /// Call type announced by a call-start frame; group calls when the payload omits it.
    pub fn call_type(&self) -> CallType {
        self.payload
            .first()
            .and_then(|&raw| CallType::from_primitive(raw))
            .unwrap_or_default()
    }
}

fn encode_text(text: &str) -> Bytes {
    text.encode_utf16()
        .fold(BytesMut::with_capacity(text.len() * 2), |mut buf, unit| {
            buf.put_u16_le(unit);
            buf
        })
        .freeze()
}

fn decode_text(payload: &[u8]) -> Option<String> {
    if payload.len() % 2 != 0 {
        return None;
    }

    payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>()
        .pipe(|units| String::from_utf16(&units).ok())
}
