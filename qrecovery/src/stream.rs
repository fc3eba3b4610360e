//! The per-stream record, combining both halves of a stream.
use qbase::{
    frame::ResetStreamFrame,
    role::Role,
    sid::{Dir, StreamId},
};

use crate::{
    recv::{RecvState, Recver},
    send::{SendState, Sender},
};

/// A side effect of a state machine transition, applied by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The peer asked to stop sending, with the error code.
    StopSending(u64),
    /// Sent data was acknowledged, completion can be reported.
    Deliverable,
    /// The readability of the stream may have changed.
    UpdateReadable,
    /// The peer reset the stream, the sending half must be reset too.
    ResetSendHalf,
    /// A RESET_STREAM frame must be sent.
    QueueReset(ResetStreamFrame),
    /// The peer consumed this many more bytes of connection flow control.
    NewData(u64),
}

/// The state of a stream as a whole, derived from its two halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    /// This endpoint is done sending, data may still arrive.
    HalfClosedLocal,
    /// The peer is done sending, data may still be sent.
    HalfClosedRemote,
    Closed,
}

/// Everything the connection knows about one stream.
///
/// The half this endpoint can't use, on a unidirectional stream, starts closed.
#[derive(Debug)]
pub struct QuicStreamState {
    pub id: StreamId,
    pub send: Sender,
    pub recv: Recver,
}

impl QuicStreamState {
    /// A new stream, `send_window` is the peer's limit and `recv_window` ours.
    pub fn new(id: StreamId, local: Role, send_window: u64, recv_window: u64) -> Self {
        let send = if id.can_send(local) {
            Sender::new(send_window)
        } else {
            Sender::closed()
        };
        let recv = if id.can_recv(local) {
            Recver::new(recv_window)
        } else {
            Recver::closed()
        };
        Self { id, send, recv }
    }

    pub fn dir(&self) -> Dir {
        self.id.dir()
    }

    /// Both halves reached their terminal state.
    pub fn is_terminal(&self) -> bool {
        self.send.state() == SendState::Closed && self.recv.state() == RecvState::Closed
    }

    pub fn state(&self) -> StreamState {
        match (self.send.state(), self.recv.state()) {
            (SendState::Closed, RecvState::Closed) => StreamState::Closed,
            (SendState::Closed, RecvState::Open) => StreamState::HalfClosedLocal,
            (SendState::Open | SendState::ResetSent, RecvState::Closed) => {
                StreamState::HalfClosedRemote
            }
            (SendState::Open | SendState::ResetSent, RecvState::Open) => StreamState::Open,
        }
    }
}
