//! Wire formats spoken by the gateway: dispatcher (IPSC-style) frames, DMR air-interface
//! packets, compressed voice frames and the client-facing frame format.

mod air;
mod builder;
pub mod checksum;
mod client;
pub mod command;
mod dispatcher;
mod error;
mod signature;
pub mod validate;
mod voice;

pub use air::{
    AirHeader,
    AirPacket,
    BurstInfo,
    BurstType,
    CallType,
    SyncPattern,
};
pub use builder::NO_DESTINATION;
pub use client::{
    ClientFrame,
    ClientHeader,
    GpsRequest,
    PttRequest,
    TextRequest,
};
pub use command::{
    ClientCommand,
    ClientCommandCode,
    Command,
    CommandCode,
};
pub use dispatcher::{
    DispatcherFrame,
    DispatcherHeader,
};
pub use error::{
    Error,
    Result,
};
pub use signature::Signature;
pub use validate::{
    validate,
    validate_air,
    Severity,
    Validation,
};
pub use voice::VoiceFrame;
