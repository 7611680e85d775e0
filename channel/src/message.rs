//! Message model for the control protocol.
//!
//! Every frame on the wire is `{"kind": <u8>, "payload": <value>}`. Kinds are
//! numbered per direction, so the same integer means different things
//! depending on who sent it:
//!
//! - guest → host: `AGENT_READY` (0), `ACK` (1)
//! - host → guest: `ADD_CONTAINER` (0), `SET_IP` (1)
//!
//! [`GuestMessage`] and [`HostMessage`] keep the two namespaces apart; a
//! channel is always typed by what it receives and what it sends.

use crate::error::ChannelError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Guest → Host kinds
pub const MSG_AGENT_READY: u8 = 0;
pub const MSG_ACK: u8 = 1;

// Host → Guest kinds
pub const MSG_ADD_CONTAINER: u8 = 0;
pub const MSG_SET_IP: u8 = 1;

/// A frame as it appears on the wire, before the kind is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: u8,
    #[serde(default)]
    pub payload: Value,
}

/// A typed message belonging to one direction of the protocol.
pub trait Message: Sized + Send + std::fmt::Debug + 'static {
    fn kind(&self) -> u8;

    fn to_frame(&self) -> Result<Frame, ChannelError>;

    fn from_frame(frame: Frame) -> Result<Self, ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AckResult {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub result: AckResult,
    #[serde(default)]
    pub detail: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            result: AckResult::Ok,
            detail: String::new(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            result: AckResult::Error,
            detail: detail.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == AckResult::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetIp {
    /// Interface name inside the guest, e.g. `eth0`.
    pub iface: String,
    /// Dotted-quad IPv4 address.
    pub address: String,
    /// Dotted-quad netmask.
    pub netmask: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddContainer {
    /// Root filesystem path as seen from inside the guest.
    pub rootfs: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
}

/// Messages sent by the guest agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestMessage {
    AgentReady,
    Ack(Ack),
}

/// Messages sent by the host supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    AddContainer(AddContainer),
    SetIp(SetIp),
}

fn payload<T: DeserializeOwned>(frame: Frame) -> Result<T, ChannelError> {
    let kind = frame.kind;
    serde_json::from_value(frame.payload)
        .map_err(|e| ChannelError::MalformedFrame(format!("payload for kind {}: {}", kind, e)))
}

impl Message for GuestMessage {
    fn kind(&self) -> u8 {
        match self {
            GuestMessage::AgentReady => MSG_AGENT_READY,
            GuestMessage::Ack(_) => MSG_ACK,
        }
    }

    fn to_frame(&self) -> Result<Frame, ChannelError> {
        let payload = match self {
            GuestMessage::AgentReady => Value::Object(Default::default()),
            GuestMessage::Ack(ack) => serde_json::to_value(ack)?,
        };
        Ok(Frame {
            kind: self.kind(),
            payload,
        })
    }

    fn from_frame(frame: Frame) -> Result<Self, ChannelError> {
        match frame.kind {
            MSG_AGENT_READY => Ok(GuestMessage::AgentReady),
            MSG_ACK => Ok(GuestMessage::Ack(payload(frame)?)),
            other => Err(ChannelError::UnknownKind(other)),
        }
    }
}

impl Message for HostMessage {
    fn kind(&self) -> u8 {
        match self {
            HostMessage::AddContainer(_) => MSG_ADD_CONTAINER,
            HostMessage::SetIp(_) => MSG_SET_IP,
        }
    }

    fn to_frame(&self) -> Result<Frame, ChannelError> {
        let payload = match self {
            HostMessage::AddContainer(add) => serde_json::to_value(add)?,
            HostMessage::SetIp(set_ip) => serde_json::to_value(set_ip)?,
        };
        Ok(Frame {
            kind: self.kind(),
            payload,
        })
    }

    fn from_frame(frame: Frame) -> Result<Self, ChannelError> {
        match frame.kind {
            MSG_ADD_CONTAINER => Ok(HostMessage::AddContainer(payload(frame)?)),
            MSG_SET_IP => Ok(HostMessage::SetIp(payload(frame)?)),
            other => Err(ChannelError::UnknownKind(other)),
        }
    }
}
