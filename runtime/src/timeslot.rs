use std::{
    fmt::{
        Display,
        Formatter,
    },
    time::SystemTime,
};

use chrono::{
    DateTime,
    Utc,
};
use message::CallType;
use tokio::sync::mpsc;

/// One of the two TDMA timeslots of a DMR channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum Slot {
    Ts1,
    Ts2,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Ts1, Slot::Ts2];

    /// Index as carried in the `slot` byte of a frame.
    #[inline]
    pub const fn index(self) -> u8 {
        match self {
            Slot::Ts1 => 0,
            Slot::Ts2 => 1,
        }
    }
}

impl TryFrom<u8> for Slot {
    type Error = u8;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Slot::Ts1),
            1 => Ok(Slot::Ts2),
            other => Err(other),
        }
    }
}

impl Display for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {}", self.index())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SlotState {
    pub active:         bool,
    pub source_id:      u32,
    pub destination_id: u32,
    pub call_type:      CallType,
    pub started:        Option<DateTime<Utc>>,
}

/// Emitted after every mutation of a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotChange {
    pub slot:  Slot,
    pub state: SlotState,
}

/// Call state of both timeslots. Holds no policy: callers decide admission from
/// [`TimeslotManager::available_slot`].
#[derive(Debug)]
pub struct TimeslotManager {
    slots:   [SlotState; 2],
    changes: mpsc::UnboundedSender<SlotChange>,
}

impl TimeslotManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SlotChange>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let manager = Self {
            slots:   Default::default(),
            changes: tx,
        };

        (manager, rx)
    }

    pub fn handle_call_start(
        &mut self,
        slot: Slot,
        source_id: u32,
        destination_id: u32,
        call_type: CallType,
    ) {
        tracing::debug!(%slot, source_id, destination_id, ?call_type, "call started");

        self.slots[slot.index() as usize] = SlotState {
            active: true,
            source_id,
            destination_id,
            call_type,
            started: Some(SystemTime::now().into()),
        };

        self.notify(slot);
    }

    pub fn handle_call_end(&mut self, slot: Slot) {
        tracing::debug!(%slot, "call ended");

        self.slots[slot.index() as usize] = SlotState::default();
        self.notify(slot);
    }

    #[inline]
    pub fn state(&self, slot: Slot) -> &SlotState {
        &self.slots[slot.index() as usize]
    }

    #[inline]
    pub fn is_slot_available(&self, slot: Slot) -> bool {
        !self.state(slot).active
    }

    /// First idle slot, preferring slot 0.
    pub fn available_slot(&self) -> Option<Slot> {
        Slot::ALL.into_iter().find(|&slot| self.is_slot_available(slot))
    }

    fn notify(&self, slot: Slot) {
        let change = SlotChange {
            slot,
            state: self.state(slot).clone(),
        };

        if self.changes.send(change).is_err() {
            tracing::trace!(%slot, "no slot change subscriber");
        }
    }
}
