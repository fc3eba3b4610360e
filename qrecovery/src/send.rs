//! Types for sending data on a stream.
mod sender;
mod sndbuf;

pub use sender::{SendEvent, SendState, Sender};
pub use sndbuf::{SendBuf, StreamBuffer};
