use std::marker::PhantomData;

use bytes::BytesMut;
use message::{
    ClientFrame,
    DispatcherFrame,
};
use tokio_util::codec::{
    Decoder,
    Encoder,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The stream can no longer be split into frames.
    #[error("framing lost: {0}")]
    Framing(message::Error),

    #[error("encoding frame: {0}")]
    Encode(message::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A length-prefixed frame type that can be cut out of a byte stream.
pub trait Frame: Sized {
    /// Bytes needed before [`Frame::declared_len`] can be answered.
    const HEADER_LEN: usize;

    fn declared_len(prefix: &[u8]) -> message::Result<usize>;
    fn decode(src: &[u8]) -> message::Result<Self>;
    fn encode_into(&self, dst: &mut BytesMut) -> message::Result<()>;

    /// Whether the frame's command is one this build understands.
    fn is_known(&self) -> bool;
}

impl Frame for DispatcherFrame {
    const HEADER_LEN: usize = DispatcherFrame::HEADER_LEN;

    #[inline]
    fn declared_len(prefix: &[u8]) -> message::Result<usize> {
        DispatcherFrame::declared_len(prefix)
    }

    #[inline]
    fn decode(src: &[u8]) -> message::Result<Self> {
        DispatcherFrame::decode(src)
    }

    #[inline]
    fn encode_into(&self, dst: &mut BytesMut) -> message::Result<()> {
        DispatcherFrame::encode_into(self, dst)
    }

    #[inline]
    fn is_known(&self) -> bool {
        self.command.is_known()
    }
}

impl Frame for ClientFrame {
    const HEADER_LEN: usize = ClientFrame::HEADER_LEN;

    #[inline]
    fn declared_len(prefix: &[u8]) -> message::Result<usize> {
        ClientFrame::declared_len(prefix)
    }

    #[inline]
    fn decode(src: &[u8]) -> message::Result<Self> {
        ClientFrame::decode(src)
    }

    #[inline]
    fn encode_into(&self, dst: &mut BytesMut) -> message::Result<()> {
        ClientFrame::encode_into(self, dst)
    }

    #[inline]
    fn is_known(&self) -> bool {
        self.command.is_known()
    }
}

/// Splits a byte stream into frames using the length field in each header.
///
/// Frames whose length is intact but whose contents are corrupt are logged and skipped. A
/// header that can't be read at all is an error, since nothing after it can be trusted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrameCodec<T>(PhantomData<T>);

pub type DispatcherCodec = FrameCodec<DispatcherFrame>;
pub type ClientCodec = FrameCodec<ClientFrame>;

impl<T> FrameCodec<T> {
    #[inline]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FrameCodec<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Encoder<T> for FrameCodec<T>
where
    T: Frame,
{
    type Error = Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst).map_err(Error::Encode)
    }
}

impl<'a, T> Encoder<&'a T> for FrameCodec<T>
where
    T: Frame,
{
    type Error = Error;

    fn encode(&mut self, item: &'a T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst).map_err(Error::Encode)
    }
}

impl<T> Decoder for FrameCodec<T>
where
    T: Frame,
{
    type Error = Error;
    type Item = T;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < T::HEADER_LEN {
                src.reserve(T::HEADER_LEN - src.len());
                return Ok(None);
            }

            let len = T::declared_len(&src[..T::HEADER_LEN]).map_err(Error::Framing)?;

            if src.len() < len {
                src.reserve(len - src.len());
                return Ok(None);
            }

            let raw = src.split_to(len);

            match T::decode(&raw) {
                Ok(frame) => {
                    if !frame.is_known() {
                        tracing::debug!(raw = %hex::encode(&raw), "frame with unrecognized command");
                    }

                    return Ok(Some(frame));
                },
                Err(e) => {
                    tracing::warn!(error = %e, raw = %hex::encode(&raw), "dropping malformed frame");
                },
            }
        }
    }
}
