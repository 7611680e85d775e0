//! Stream codec for control frames.
//!
//! Frames are self-delimiting JSON values with no length prefix. The writer
//! terminates each frame with a newline, but the reader does not depend on it.
//!
//! Malformed input is reported as an item (`Ok(Some(Err(..)))`) rather than a
//! decoder error so the surrounding `FramedRead` keeps running. Recovery rules:
//!
//! - broken JSON: skip ahead to the next `{` and try again from there;
//! - valid JSON that is not a known message: drop exactly that value.

use crate::error::ChannelError;
use crate::message::{Frame, Message};
use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// A decoded item: either a message or a frame that had to be dropped.
pub type Decoded<T> = Result<T, ChannelError>;

pub struct MessageCodec<In, Out> {
    _marker: PhantomData<fn() -> (In, Out)>,
}

impl<In, Out> MessageCodec<In, Out> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for MessageCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset of the next candidate frame start after the current position.
fn resync_offset(buf: &[u8]) -> usize {
    buf.iter()
        .skip(1)
        .position(|&b| b == b'{')
        .map(|pos| pos + 1)
        .unwrap_or(buf.len())
}

impl<In: Message, Out> Decoder for MessageCodec<In, Out> {
    type Item = Decoded<In>;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => src.advance(start),
            None => {
                src.clear();
                return Ok(None);
            }
        }

        let mut values = serde_json::Deserializer::from_slice(src).into_iter::<Value>();
        match values.next() {
            None => Ok(None),
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                src.advance(consumed);
                let decoded = serde_json::from_value::<Frame>(value)
                    .map_err(|e| ChannelError::MalformedFrame(e.to_string()))
                    .and_then(In::from_frame);
                Ok(Some(decoded))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                let skip = resync_offset(src);
                src.advance(skip);
                Ok(Some(Err(ChannelError::MalformedFrame(e.to_string()))))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() => Ok(None),
            None => {
                let len = src.len();
                src.clear();
                Ok(Some(Err(ChannelError::MalformedFrame(format!(
                    "truncated frame at end of stream ({} bytes)",
                    len
                )))))
            }
        }
    }
}

impl<In, Out: Message> Encoder<Out> for MessageCodec<In, Out> {
    type Error = ChannelError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = item.to_frame()?;
        serde_json::to_writer(dst.writer(), &frame)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}
