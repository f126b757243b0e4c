//! Turns frames received from the radio into call state, recordings, client events and
//! persisted records.

use std::{
    collections::HashMap,
    sync::Arc,
};

use chrono::{
    DateTime,
    Utc,
};
use message::{
    Command,
    DispatcherFrame,
    VoiceFrame,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    collab::{
        CallRecord,
        GpsPosition,
        PersistenceSink,
        RadioEvent,
        Record,
        VoiceCodec,
    },
    recording::Recorder,
    server::Broadcaster,
    timeslot::{
        Slot,
        TimeslotManager,
    },
    watchdog::PttObserver,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct ActiveCall {
    call_id:        String,
    source_id:      u32,
    destination_id: u32,
    started:        DateTime<Utc>,
    frames:         usize,
}

pub struct Router {
    timeslots:   TimeslotManager,
    recorder:    Arc<Recorder>,
    broadcaster: Broadcaster,
    sink:        Arc<dyn PersistenceSink>,
    codec:       Option<Arc<dyn VoiceCodec>>,
    ptt:         Option<Arc<dyn PttObserver>>,
    calls:       HashMap<Slot, ActiveCall>,
}

impl Router {
    pub fn new(
        timeslots: TimeslotManager,
        recorder: Arc<Recorder>,
        broadcaster: Broadcaster,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            timeslots,
            recorder,
            broadcaster,
            sink,
            codec: None,
            ptt: None,
            calls: HashMap::new(),
        }
    }

    /// Decode voice with `codec` and publish the audio to clients.
    pub fn with_codec(mut self, codec: Arc<dyn VoiceCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Report PTT presses and releases arriving from the radio to `observer`.
    pub fn with_ptt_observer(mut self, observer: Arc<dyn PttObserver>) -> Self {
        self.ptt = Some(observer);
        self
    }

    #[inline]
    pub fn timeslots(&self) -> &TimeslotManager {
        &self.timeslots
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(mut self, mut packets: mpsc::Receiver<DispatcherFrame>, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = packets.recv() => frame,
            };

            match frame {
                Some(frame) => self.handle(frame).await,
                None => break,
            }
        }

        for slot in Slot::ALL {
            self.end_call(slot).await;
        }

        tracing::debug!("router stopped");
    }

    pub async fn handle(&mut self, frame: DispatcherFrame) {
        self.broadcaster.publish_event(&frame);

        let command = match frame.command.kind() {
            Some(command) => command,
            None => return,
        };

        let slot = match Slot::try_from(frame.slot) {
            Ok(slot) => Some(slot),
            Err(raw) => {
                if matches!(command, Command::CallStart | Command::CallEnd | Command::VoiceFrame) {
                    tracing::warn!(slot = raw, %frame, "call frame for invalid slot");
                }
                None
            },
        };

        match (command, slot) {
            (Command::CallStart, Some(slot)) => self.start_call(slot, &frame).await,
            (Command::CallEnd, Some(slot)) => self.end_call(slot).await,
            (Command::VoiceFrame, Some(slot)) => self.voice(slot, &frame).await,
            (Command::PttPress, _) => {
                if let Some(ptt) = &self.ptt {
                    ptt.ptt_pressed(frame.destination_id, frame.slot);
                }
            },
            (Command::PttRelease, _) => {
                if let Some(ptt) = &self.ptt {
                    ptt.ptt_released(frame.destination_id, frame.slot);
                }
            },
            (Command::GpsResponse, _) => {
                self.save(Record::Gps(GpsPosition {
                    radio_id:    frame.source_id,
                    received_at: Utc::now(),
                    raw:         hex::encode(&frame.payload),
                }))
                .await;
            },
            _ => {},
        }

        if command != Command::VoiceFrame {
            self.save(Record::RadioEvent(RadioEvent {
                command:        format!("{:?}", command),
                source_id:      frame.source_id,
                destination_id: frame.destination_id,
                slot:           frame.slot,
                received_at:    Utc::now(),
            }))
            .await;
        }
    }

    async fn start_call(&mut self, slot: Slot, frame: &DispatcherFrame) {
        if self.calls.contains_key(&slot) {
            tracing::warn!(%slot, "call start without end of previous call");
            self.end_call(slot).await;
        }

        self.timeslots
            .handle_call_start(slot, frame.source_id, frame.destination_id, frame.call_type());

        let call_id = format!(
            "{}-{}-{}-{}",
            slot.index(),
            frame.source_id,
            frame.destination_id,
            frame.sequence
        );

        self.recorder
            .start_recording(&call_id, frame.source_id, frame.destination_id, slot.index());

        self.calls.insert(slot, ActiveCall {
            call_id,
            source_id: frame.source_id,
            destination_id: frame.destination_id,
            started: Utc::now(),
            frames: 0,
        });
    }

    async fn voice(&mut self, slot: Slot, frame: &DispatcherFrame) {
        let voice = match VoiceFrame::from_payload(&frame.payload) {
            Ok(voice) => voice,
            Err(e) => {
                tracing::warn!(error = %e, %slot, "bad voice payload");
                return;
            },
        };

        let last = voice.is_last();

        if let Some(codec) = &self.codec {
            match codec.decode(&voice) {
                Ok(pcm) => {
                    self.broadcaster.publish_audio(frame.destination_id, &pcm);
                },
                Err(e) => tracing::debug!(error = %e, "voice decode failed"),
            }
        }

        match self.calls.get_mut(&slot) {
            Some(call) => {
                call.frames += 1;
                self.recorder.append_frame(&call.call_id, voice);
            },
            None => tracing::trace!(%slot, "voice frame outside a call"),
        }

        if last {
            self.end_call(slot).await;
        }
    }

    async fn end_call(&mut self, slot: Slot) {
        let call = match self.calls.remove(&slot) {
            Some(call) => call,
            None => return,
        };

        self.timeslots.handle_call_end(slot);
        let recording = self.recorder.stop_recording(&call.call_id).await;

        self.save(Record::Call(CallRecord {
            call_id: call.call_id,
            source_id: call.source_id,
            destination_id: call.destination_id,
            slot: slot.index(),
            started: call.started,
            ended: Utc::now(),
            frames: call.frames,
            recording,
        }))
        .await;
    }

    async fn save(&self, record: Record) {
        util::trace_catch!(self.sink.save(record).await, "persisting record");
    }
}
