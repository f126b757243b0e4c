use std::sync::Arc;

use crate::session::Error;

/// Commands a dispatcher can issue toward the radio link.
///
/// Implemented by the connection session itself and by decorators that observe commands on
/// their way through (see [`crate::watchdog::PttWatchdog`]).
#[async_trait::async_trait]
pub trait RadioControl: Send + Sync {
    async fn send_ptt(&self, destination_id: u32, press: bool, slot: u8) -> Result<(), Error>;
    async fn request_gps(&self, target_id: u32) -> Result<(), Error>;
    async fn send_text_message(&self, destination_id: u32, text: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl<T> RadioControl for Arc<T>
where
    T: RadioControl + ?Sized,
{
    #[inline]
    async fn send_ptt(&self, destination_id: u32, press: bool, slot: u8) -> Result<(), Error> {
        (**self).send_ptt(destination_id, press, slot).await
    }

    #[inline]
    async fn request_gps(&self, target_id: u32) -> Result<(), Error> {
        (**self).request_gps(target_id).await
    }

    #[inline]
    async fn send_text_message(&self, destination_id: u32, text: &str) -> Result<(), Error> {
        (**self).send_text_message(destination_id, text).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Call {
        Ptt {
            destination_id: u32,
            press:          bool,
            slot:           u8,
        },
        Gps(u32),
        Text(u32, String),
    }

    /// Records every command; fails them all while `fail` is set.
    #[derive(Debug, Default)]
    pub struct MockRadio {
        pub calls: Mutex<Vec<Call>>,
        pub fail:  std::sync::atomic::AtomicBool,
    }

    impl MockRadio {
        async fn record(&self, call: Call) -> Result<(), Error> {
            self.calls.lock().await.push(call);

            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                Err(Error::NotConnected)
            } else {
                Ok(())
            }
        }

        pub async fn releases(&self) -> usize {
            self.calls
                .lock()
                .await
                .iter()
                .filter(|call| matches!(call, Call::Ptt { press: false, .. }))
                .count()
        }
    }

    #[async_trait::async_trait]
    impl RadioControl for MockRadio {
        async fn send_ptt(&self, destination_id: u32, press: bool, slot: u8) -> Result<(), Error> {
            self.record(Call::Ptt {
                destination_id,
                press,
                slot,
            })
            .await
        }

        async fn request_gps(&self, target_id: u32) -> Result<(), Error> {
            self.record(Call::Gps(target_id)).await
        }

        async fn send_text_message(&self, destination_id: u32, text: &str) -> Result<(), Error> {
            self.record(Call::Text(destination_id, text.to_owned())).await
        }
    }
}
