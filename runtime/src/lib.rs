pub mod collab;
pub mod radio;
pub mod recording;
pub mod router;
pub mod server;
pub mod session;
pub mod signals;
pub mod supervisor;
pub mod timeslot;
pub mod watchdog;

pub use radio::RadioControl;
pub use recording::{
    Recorder,
    RecorderConfig,
};
pub use router::Router;
pub use server::{
    Broadcaster,
    RadioServer,
    ServerConfig,
};
pub use session::{
    Session,
    SessionConfig,
    SessionEvent,
    State,
};
pub use supervisor::{
    ReconnectConfig,
    Supervisor,
};
pub use timeslot::{
    Slot,
    SlotChange,
    SlotState,
    TimeslotManager,
};
pub use watchdog::{
    PttObserver,
    PttWatchdog,
    WatchdogConfig,
};
