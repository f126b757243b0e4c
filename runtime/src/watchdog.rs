use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    radio::RadioControl,
    session::Error,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Longest a PTT may stay keyed before it is released on the operator's behalf.
    pub timeout: Duration,
    pub tick:    Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            tick:    Duration::from_secs(1),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PttKey {
    pub destination_id: u32,
    pub slot:           u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PttSession {
    pub started: Instant,
}

/// Told about PTT presses and releases seen on the radio link.
pub trait PttObserver: Send + Sync {
    fn ptt_pressed(&self, destination_id: u32, slot: u8);
    fn ptt_released(&self, destination_id: u32, slot: u8);
}

/// Releases PTT sessions that have been held longer than the configured timeout, so a lost
/// release frame can't leave a radio keyed.
///
/// Also usable as a [`RadioControl`] in front of the real link: presses and releases that
/// pass through successfully are tracked automatically.
#[derive(Debug)]
pub struct PttWatchdog<R> {
    sessions: DashMap<PttKey, PttSession>,
    radio:    R,
    config:   WatchdogConfig,
}

impl<R> PttWatchdog<R>
where
    R: RadioControl,
{
    pub fn new(radio: R, config: WatchdogConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            radio,
            config,
        }
    }

    /// Start tracking a keyed PTT. Returns `false` if this destination and slot are already
    /// keyed; the first press keeps its start time.
    pub fn on_ptt_pressed(&self, destination_id: u32, slot: u8) -> bool {
        let key = PttKey {
            destination_id,
            slot,
        };

        match self.sessions.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::debug!(?key, "ptt already held");
                false
            },
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(PttSession {
                    started: Instant::now(),
                });
                true
            },
        }
    }

    /// Returns `false` if nothing was being tracked for this destination and slot.
    pub fn on_ptt_released(&self, destination_id: u32, slot: u8) -> bool {
        self.sessions
            .remove(&PttKey {
                destination_id,
                slot,
            })
            .is_some()
    }

    #[inline]
    pub fn is_held(&self, destination_id: u32, slot: u8) -> bool {
        self.sessions.contains_key(&PttKey {
            destination_id,
            slot,
        })
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Force-release every session past its timeout. Returns how many releases were sent.
    ///
    /// A failed release is logged and the session stays dropped; the remaining expired
    /// sessions are still attempted.
    pub async fn scan(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.timeout;

        let expired = self
            .sessions
            .iter()
            .filter(|entry| now.duration_since(entry.started) >= timeout)
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();

        let mut released = 0;

        for key in expired {
            let removed = self
                .sessions
                .remove_if(&key, |_, session| now.duration_since(session.started) >= timeout);

            let Some((_, session)) = removed else {
                continue;
            };

            let held = now.duration_since(session.started);

            match self.radio.send_ptt(key.destination_id, false, key.slot).await {
                Ok(()) => {
                    tracing::warn!(?key, ?held, "forced ptt release after timeout");
                    released += 1;
                },
                Err(e) => {
                    tracing::error!(?key, ?held, error = %e, "forced ptt release failed");
                },
            }
        }

        released
    }

    /// Scan on every tick until cancelled.
    #[tracing::instrument(skip_all, fields(timeout = ?self.config.timeout))]
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.scan().await;
                },
            }
        }

        tracing::debug!(remaining = self.active(), "ptt watchdog stopped");
    }
}

impl<R> PttObserver for PttWatchdog<R>
where
    R: RadioControl,
{
    #[inline]
    fn ptt_pressed(&self, destination_id: u32, slot: u8) {
        self.on_ptt_pressed(destination_id, slot);
    }

    #[inline]
    fn ptt_released(&self, destination_id: u32, slot: u8) {
        self.on_ptt_released(destination_id, slot);
    }
}

#[async_trait::async_trait]
impl<R> RadioControl for PttWatchdog<R>
where
    R: RadioControl,
{
    async fn send_ptt(&self, destination_id: u32, press: bool, slot: u8) -> Result<(), Error> {
        self.radio.send_ptt(destination_id, press, slot).await?;

        if press {
            self.on_ptt_pressed(destination_id, slot);
        } else {
            self.on_ptt_released(destination_id, slot);
        }

        Ok(())
    }

    #[inline]
    async fn request_gps(&self, target_id: u32) -> Result<(), Error> {
        self.radio.request_gps(target_id).await
    }

    #[inline]
    async fn send_text_message(&self, destination_id: u32, text: &str) -> Result<(), Error> {
        self.radio.send_text_message(destination_id, text).await
    }
}
