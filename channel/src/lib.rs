//! Control channel between the host supervisor and the guest agent.
//!
//! A channel carries a stream of back-to-back JSON values over any byte
//! stream (a unix socket on the host, the virtio serial port in the guest).
//! Each side owns one inbound and one outbound queue, pumped by two
//! background tasks.

mod channel;
pub mod codec;
mod error;
pub mod message;

pub use channel::{Channel, EOF_BACKOFF, QUEUE_CAPACITY};
pub use codec::MessageCodec;
pub use error::ChannelError;
pub use message::{
    Ack, AckResult, AddContainer, Frame, GuestMessage, HostMessage, Message, SetIp,
};
