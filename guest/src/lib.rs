//! Capsule guest agent.
//!
//! Runs inside the VM. It mounts the basic pseudo filesystems, announces
//! itself on the control channel and then applies what the host asks for:
//! the container's IPv4 address and the container itself.

mod dispatcher;
mod error;
mod net;
mod runtime;
pub mod serial;

pub use dispatcher::{Dispatcher, GuestChannel, session_id};
pub use error::GuestError;
pub use net::{GuestNetwork, IoctlNetwork, parse_ipv4};
pub use runtime::{ContainerRuntime, RuncRuntime};
