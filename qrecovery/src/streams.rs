//! Dispatching stream frames and acknowledgments to the stream state machines.
//!
//! The dispatch functions check that a frame is allowed on the stream, run the
//! state machines and apply their side effects to the connection-wide indices
//! kept by a [`StreamManager`]. Effects only the connection can apply, queuing
//! a RESET_STREAM and connection-level flow control, are handed back.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bytes::Bytes;
use qbase::{
    error::{ErrorKind, QuicError},
    frame::{BeFrame, FrameType, ResetStreamFrame, StopSendingFrame, StreamFrame},
    role::Role,
    sid::StreamId,
    varint::VarInt,
};

use crate::{
    recv::RecvEvent,
    send::{SendEvent, SendState},
    stream::{Effect, QuicStreamState},
};

pub mod error;

/// Connection-wide stream indices, updated as a side effect of transitions.
pub trait StreamManager {
    /// Both halves of the stream are terminal, reported once per stream.
    fn add_closed(&mut self, sid: StreamId);

    /// Data sent on the stream was acknowledged.
    fn add_deliverable(&mut self, sid: StreamId);

    /// The peer asked to stop sending on the stream.
    fn add_stop_sending(&mut self, sid: StreamId, app_err_code: u64);

    /// Re-evaluate whether the stream has something for the application to read.
    fn update_readable_streams(&mut self, stream: &QuicStreamState);

    /// The stream was removed from the connection.
    fn remove_stream(&mut self, _sid: StreamId) {}
}

/// The default [`StreamManager`], plain sets the application drains.
#[derive(Debug, Default)]
pub struct StreamSets {
    closed: BTreeSet<StreamId>,
    deliverable: BTreeSet<StreamId>,
    stop_sending: BTreeMap<StreamId, u64>,
    readable: BTreeSet<StreamId>,
}

impl StreamSets {
    /// Streams closed since the last call.
    pub fn take_closed(&mut self) -> BTreeSet<StreamId> {
        std::mem::take(&mut self.closed)
    }

    /// Streams with acknowledged data since the last call.
    pub fn take_deliverable(&mut self) -> BTreeSet<StreamId> {
        std::mem::take(&mut self.deliverable)
    }

    /// STOP_SENDING requests since the last call.
    pub fn take_stop_sending(&mut self) -> BTreeMap<StreamId, u64> {
        std::mem::take(&mut self.stop_sending)
    }

    pub fn closed(&self) -> &BTreeSet<StreamId> {
        &self.closed
    }

    pub fn readable(&self) -> &BTreeSet<StreamId> {
        &self.readable
    }

    pub fn is_readable(&self, sid: StreamId) -> bool {
        self.readable.contains(&sid)
    }
}

impl StreamManager for StreamSets {
    fn add_closed(&mut self, sid: StreamId) {
        self.closed.insert(sid);
    }

    fn add_deliverable(&mut self, sid: StreamId) {
        self.deliverable.insert(sid);
    }

    fn add_stop_sending(&mut self, sid: StreamId, app_err_code: u64) {
        self.stop_sending.entry(sid).or_insert(app_err_code);
    }

    fn update_readable_streams(&mut self, stream: &QuicStreamState) {
        if stream.recv.is_readable() {
            self.readable.insert(stream.id);
        } else {
            self.readable.remove(&stream.id);
        }
    }

    fn remove_stream(&mut self, sid: StreamId) {
        self.closed.remove(&sid);
        self.deliverable.remove(&sid);
        self.stop_sending.remove(&sid);
        self.readable.remove(&sid);
    }
}

fn wrong_direction(sid: StreamId, frame_type: FrameType, what: &str) -> QuicError {
    tracing::error!("   Cause by: {frame_type:?} received on {sid}, which {what}");
    QuicError::new(
        ErrorKind::StreamState,
        frame_type,
        format!("{frame_type:?} received on {sid}, which {what}"),
    )
}

/// The peer may only send data, or reset, on a stream this endpoint receives on.
pub fn check_recv_dir(sid: StreamId, local: Role, frame_type: FrameType) -> Result<(), QuicError> {
    if sid.can_recv(local) {
        Ok(())
    } else {
        Err(wrong_direction(sid, frame_type, "is send-only locally"))
    }
}

/// The peer may only ask to stop sending on a stream this endpoint sends on.
pub fn check_send_dir(sid: StreamId, local: Role, frame_type: FrameType) -> Result<(), QuicError> {
    if sid.can_send(local) {
        Ok(())
    } else {
        Err(wrong_direction(sid, frame_type, "is receive-only locally"))
    }
}

/// Apply the effects of a transition until none is left for the stream itself.
fn process(
    stream: &mut QuicStreamState,
    manager: &mut impl StreamManager,
    effects: Vec<Effect>,
) -> Vec<Effect> {
    let mut queue = VecDeque::from(effects);
    let mut leftover = Vec::new();
    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::StopSending(code) => manager.add_stop_sending(stream.id, code),
            Effect::Deliverable => manager.add_deliverable(stream.id),
            Effect::UpdateReadable => manager.update_readable_streams(stream),
            Effect::ResetSendHalf => {
                if stream.send.state() == SendState::Open {
                    let no_error = VarInt::from_u32(0);
                    queue.extend(stream.send.apply(stream.id, SendEvent::SendReset(no_error)));
                }
            }
            Effect::QueueReset(_) | Effect::NewData(_) => leftover.push(effect),
        }
    }
    leftover
}

/// Apply the effects, then report the stream if this transition closed it.
fn settle(
    stream: &mut QuicStreamState,
    manager: &mut impl StreamManager,
    was_terminal: bool,
    effects: Vec<Effect>,
) -> Vec<Effect> {
    let leftover = process(stream, manager, effects);
    if !was_terminal && stream.is_terminal() {
        tracing::debug!(sid = %stream.id, "stream closed");
        manager.add_closed(stream.id);
    }
    leftover
}

fn dispatch(
    stream: &mut QuicStreamState,
    manager: &mut impl StreamManager,
    transition: impl FnOnce(&mut QuicStreamState) -> Result<Vec<Effect>, QuicError>,
) -> Result<Vec<Effect>, QuicError> {
    let was_terminal = stream.is_terminal();
    let effects = transition(stream)?;
    Ok(settle(stream, manager, was_terminal, effects))
}

/// A STREAM frame arrived for `stream`.
pub fn on_stream_frame(
    stream: &mut QuicStreamState,
    local: Role,
    manager: &mut impl StreamManager,
    frame: StreamFrame,
    body: Bytes,
) -> Result<Vec<Effect>, QuicError> {
    check_recv_dir(stream.id, local, frame.frame_type())?;
    dispatch(stream, manager, |stream| {
        stream
            .recv
            .apply(stream.id, RecvEvent::ReadStreamFrame(frame, body))
    })
}

/// A RESET_STREAM frame arrived for `stream`.
///
/// Besides closing the receiving half, a peer reset also resets the sending
/// half if it is still open.
pub fn on_reset_stream_frame(
    stream: &mut QuicStreamState,
    local: Role,
    manager: &mut impl StreamManager,
    frame: ResetStreamFrame,
) -> Result<Vec<Effect>, QuicError> {
    check_recv_dir(stream.id, local, frame.frame_type())?;
    dispatch(stream, manager, |stream| {
        stream.recv.apply(stream.id, RecvEvent::RstStreamFrame(frame))
    })
}

/// A STOP_SENDING frame arrived for `stream`.
pub fn on_stop_sending_frame(
    stream: &mut QuicStreamState,
    local: Role,
    manager: &mut impl StreamManager,
    frame: StopSendingFrame,
) -> Result<Vec<Effect>, QuicError> {
    check_send_dir(stream.id, local, frame.frame_type())?;
    dispatch(stream, manager, |stream| {
        Ok(stream
            .send
            .apply(stream.id, SendEvent::StopSendingReceived(frame)))
    })
}

fn dispatch_send(
    stream: &mut QuicStreamState,
    manager: &mut impl StreamManager,
    event: SendEvent,
) -> Vec<Effect> {
    let was_terminal = stream.is_terminal();
    let effects = stream.send.apply(stream.id, event);
    settle(stream, manager, was_terminal, effects)
}

/// A STREAM frame sent on `stream` was acknowledged.
pub fn on_stream_acked(
    stream: &mut QuicStreamState,
    manager: &mut impl StreamManager,
    frame: StreamFrame,
) -> Vec<Effect> {
    dispatch_send(stream, manager, SendEvent::AckStreamFrame(frame))
}

/// The RESET_STREAM frame sent on `stream` was acknowledged.
pub fn on_reset_acked(stream: &mut QuicStreamState, manager: &mut impl StreamManager) -> Vec<Effect> {
    dispatch_send(stream, manager, SendEvent::ResetAcked)
}

/// The application abandons sending on `stream`.
pub fn reset_stream(
    stream: &mut QuicStreamState,
    manager: &mut impl StreamManager,
    app_err_code: VarInt,
) -> Vec<Effect> {
    dispatch_send(stream, manager, SendEvent::SendReset(app_err_code))
}

#[cfg(test)]
mod tests {
    use qbase::sid::Dir;

    use super::*;
    use crate::{recv::RecvState, stream::StreamState};

    #[derive(Default)]
    struct Recording {
        closed: Vec<StreamId>,
        deliverable: usize,
        stop_sending: Vec<(StreamId, u64)>,
        readable: Vec<(StreamId, bool)>,
    }

    impl StreamManager for Recording {
        fn add_closed(&mut self, sid: StreamId) {
            self.closed.push(sid);
        }

        fn add_deliverable(&mut self, _sid: StreamId) {
            self.deliverable += 1;
        }

        fn add_stop_sending(&mut self, sid: StreamId, app_err_code: u64) {
            self.stop_sending.push((sid, app_err_code));
        }

        fn update_readable_streams(&mut self, stream: &QuicStreamState) {
            self.readable.push((stream.id, stream.recv.is_readable()));
        }
    }

    fn stream_frame(sid: StreamId, offset: u64, len: usize, fin: bool) -> StreamFrame {
        let mut frame = StreamFrame::new(sid, offset, len);
        frame.set_eos_flag(fin);
        frame
    }

    #[test]
    fn test_closed_reported_once() {
        let sid = StreamId::new(Role::Client, Dir::Bi, 0);
        let mut stream = QuicStreamState::new(sid, Role::Client, 100, 100);
        let mut manager = Recording::default();

        // The peer finishes its half first.
        let frame = stream_frame(sid, 0, 2, true);
        let leftover = on_stream_frame(
            &mut stream,
            Role::Client,
            &mut manager,
            frame,
            Bytes::from_static(b"ok"),
        )
        .unwrap();
        assert_eq!(leftover, vec![Effect::NewData(2)]);
        assert_eq!(stream.recv.state(), RecvState::Closed);
        assert_eq!(manager.readable, vec![(sid, true)]);
        assert!(manager.closed.is_empty());

        stream.send.write(Bytes::from_static(b"hello")).unwrap();
        stream.send.finish().unwrap();
        let (first, _) = stream.send.pick_up(3, 100).unwrap();
        let (second, _) = stream.send.pick_up(100, 100).unwrap();

        on_stream_acked(
            &mut stream,
            &mut manager,
            stream_frame(sid, second.offset, second.len(), second.fin),
        );
        assert!(manager.closed.is_empty());
        on_stream_acked(
            &mut stream,
            &mut manager,
            stream_frame(sid, first.offset, first.len(), first.fin),
        );
        assert_eq!(manager.closed, vec![sid]);
        assert_eq!(stream.state(), StreamState::Closed);

        // A duplicated acknowledgment doesn't report the stream again.
        on_stream_acked(
            &mut stream,
            &mut manager,
            stream_frame(sid, first.offset, first.len(), first.fin),
        );
        assert_eq!(manager.closed, vec![sid]);
        assert_eq!(manager.deliverable, 2);
    }

    #[test]
    fn test_peer_reset_resets_send_half() {
        let sid = StreamId::new(Role::Server, Dir::Bi, 0);
        let mut stream = QuicStreamState::new(sid, Role::Client, 100, 100);
        let mut manager = Recording::default();
        stream.send.write(Bytes::from_static(b"abc")).unwrap();
        stream.send.pick_up(100, 100).unwrap();

        let reset = ResetStreamFrame::new(sid, VarInt::from_u32(5), VarInt::from_u32(4));
        let leftover =
            on_reset_stream_frame(&mut stream, Role::Client, &mut manager, reset).unwrap();
        let own_reset = ResetStreamFrame::new(sid, VarInt::from_u32(0), VarInt::from_u32(3));
        assert_eq!(
            leftover,
            vec![Effect::NewData(4), Effect::QueueReset(own_reset)]
        );
        assert_eq!(stream.recv.state(), RecvState::Closed);
        assert_eq!(stream.send.state(), SendState::ResetSent);
        assert_eq!(manager.readable, vec![(sid, true)]);
        assert!(manager.closed.is_empty());

        assert!(on_reset_acked(&mut stream, &mut manager).is_empty());
        assert_eq!(manager.closed, vec![sid]);
    }

    #[test]
    fn test_peer_reset_after_local_reset() {
        let sid = StreamId::new(Role::Client, Dir::Bi, 0);
        let mut stream = QuicStreamState::new(sid, Role::Client, 100, 100);
        let mut manager = Recording::default();
        let leftover = reset_stream(&mut stream, &mut manager, VarInt::from_u32(1));
        assert!(matches!(leftover[..], [Effect::QueueReset(_)]));

        let reset = ResetStreamFrame::new(sid, VarInt::from_u32(5), VarInt::from_u32(0));
        let leftover =
            on_reset_stream_frame(&mut stream, Role::Client, &mut manager, reset).unwrap();
        assert_eq!(leftover, vec![Effect::NewData(0)]);
        assert_eq!(
            stream.send.reset_frame().map(|frame| frame.app_error_code()),
            Some(1)
        );
    }

    #[test]
    fn test_stop_sending() {
        let sid = StreamId::new(Role::Client, Dir::Uni, 0);
        let mut stream = QuicStreamState::new(sid, Role::Client, 100, 100);
        let mut manager = Recording::default();
        let frame = StopSendingFrame::new(sid, VarInt::from_u32(8));
        let leftover = on_stop_sending_frame(&mut stream, Role::Client, &mut manager, frame).unwrap();
        assert!(leftover.is_empty());
        assert_eq!(manager.stop_sending, vec![(sid, 8)]);
        assert_eq!(stream.send.state(), SendState::Open);
    }

    #[test]
    fn test_directionality_violations() {
        let mut manager = Recording::default();

        // A unidirectional stream this endpoint opened only sends.
        let sid = StreamId::new(Role::Client, Dir::Uni, 0);
        let mut stream = QuicStreamState::new(sid, Role::Client, 100, 100);
        let error = on_stream_frame(
            &mut stream,
            Role::Client,
            &mut manager,
            stream_frame(sid, 0, 1, false),
            Bytes::from_static(b"x"),
        )
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::StreamState);
        assert!(matches!(error.frame_type(), FrameType::Stream(_)));
        let reset = ResetStreamFrame::new(sid, VarInt::from_u32(0), VarInt::from_u32(0));
        let error =
            on_reset_stream_frame(&mut stream, Role::Client, &mut manager, reset).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::StreamState);

        // A unidirectional stream the peer opened only receives.
        let sid = StreamId::new(Role::Server, Dir::Uni, 0);
        let mut stream = QuicStreamState::new(sid, Role::Client, 100, 100);
        let frame = StopSendingFrame::new(sid, VarInt::from_u32(0));
        let error =
            on_stop_sending_frame(&mut stream, Role::Client, &mut manager, frame).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::StreamState);
        assert_eq!(error.frame_type(), FrameType::StopSending);

        assert!(manager.readable.is_empty());
        assert!(manager.stop_sending.is_empty());
    }

    #[test]
    fn test_stream_sets() {
        let sid = StreamId::new(Role::Server, Dir::Uni, 1);
        let mut stream = QuicStreamState::new(sid, Role::Client, 0, 100);
        let mut sets = StreamSets::default();
        on_stream_frame(
            &mut stream,
            Role::Client,
            &mut sets,
            stream_frame(sid, 0, 3, true),
            Bytes::from_static(b"abc"),
        )
        .unwrap();
        assert!(sets.is_readable(sid));
        // The sending half never existed, the stream is done once all data arrived.
        assert_eq!(sets.take_closed().into_iter().collect::<Vec<_>>(), [sid]);
        assert!(sets.closed().is_empty());

        stream.recv.read(usize::MAX).unwrap();
        sets.update_readable_streams(&stream);
        assert!(!sets.is_readable(sid));

        sets.add_stop_sending(sid, 1);
        sets.add_stop_sending(sid, 2);
        assert_eq!(sets.take_stop_sending().get(&sid), Some(&1));
        sets.add_deliverable(sid);
        sets.remove_stream(sid);
        assert!(sets.take_deliverable().is_empty());
    }
}
