//! Types for receiving data on a stream.
mod rcvbuf;
mod recver;

pub use rcvbuf::RecvBuf;
pub use recver::{RecvEvent, RecvState, Recver};
