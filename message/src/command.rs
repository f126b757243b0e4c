use std::fmt::{
    Debug,
    Display,
    Formatter,
};

use packed_struct::prelude::*;

/// Command codes of the dispatcher-to-radio protocol.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PrimitiveEnum_u16, serde::Serialize, serde::Deserialize,
)]
#[repr(u16)]
pub enum Command {
    Login              = 0x7000,
    LoginResponse      = 0x7001,
    Keepalive          = 0x7100,
    KeepaliveResponse  = 0x7101,
    Disconnect         = 0x7200,

    PttPress           = 0x8001,
    PttRelease         = 0x8002,
    CallStart          = 0x8010,
    CallEnd            = 0x8011,

    VoiceFrame         = 0x8080,

    GpsRequest         = 0x9001,
    GpsResponse        = 0x9002,

    TextMessageSend    = 0xa001,
    TextMessageReceive = 0xa002,

    StatusRequest      = 0xb001,
    RadioCheck         = 0xb010,

    EmergencyDeclare   = 0xf001,
}

/// Commands the client-facing server protocol understands.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PrimitiveEnum_u16, serde::Serialize, serde::Deserialize,
)]
#[repr(u16)]
pub enum ClientCommand {
    Register       = 0x0001,
    RegisterAck    = 0x0002,
    SendPtt        = 0x0010,
    SendGpsRequest = 0x0011,
    SendText       = 0x0012,
    RadioEvent     = 0x0100,
    RadioAudio     = 0x0101,
}

/// Declares a wire code that keeps unrecognized values instead of rejecting them, so newer
/// peers can't break the transport by sending codes this build doesn't know.
macro_rules! decl_code {
    ($name:ident, $known:ty) => {
        #[derive(
            Copy, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u16);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u16) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u16 {
                self.0
            }

            #[inline]
            pub fn kind(self) -> Option<$known> {
                <$known>::from_primitive(self.0)
            }

            #[inline]
            pub fn is_known(self) -> bool {
                self.kind().is_some()
            }
        }

        impl From<$known> for $name {
            #[inline]
            fn from(known: $known) -> Self {
                Self(known.to_primitive())
            }
        }

        impl From<u16> for $name {
            #[inline]
            fn from(raw: u16) -> Self {
                Self(raw)
            }
        }

        impl PartialEq<$known> for $name {
            #[inline]
            fn eq(&self, other: &$known) -> bool {
                self.0 == other.to_primitive()
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match self.kind() {
                    Some(known) => write!(f, "{known:?}"),
                    None => write!(f, "Unknown(0x{:04x})", self.0),
                }
            }
        }

        impl Display for $name {
            #[inline]
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                Debug::fmt(self, f)
            }
        }
    };
}

decl_code!(CommandCode, Command);
decl_code!(ClientCommandCode, ClientCommand);
