use bytes::Bytes;
use qbase::{
    frame::{ResetStreamError, ResetStreamFrame, StopSendingFrame, StreamFrame},
    sid::StreamId,
    varint::VarInt,
};

use super::sndbuf::{SendBuf, StreamBuffer};
use crate::{stream::Effect, streams::error::StreamError};

/// States of the sending half of a stream.
///
/// `Open` covers the "Ready", "Send" and "Data Sent" states of RFC 9000: the
/// stream accepts data from the application until it is finished, and is done
/// once everything up to the FIN is acknowledged. `ResetSent` waits for the
/// RESET_STREAM frame to be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Open,
    ResetSent,
    Closed,
}

/// Events driving the sending half of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    /// The peer sent STOP_SENDING.
    StopSendingReceived(StopSendingFrame),
    /// Abandon the stream with the application error code.
    SendReset(VarInt),
    /// A STREAM frame sent on the stream was acknowledged.
    AckStreamFrame(StreamFrame),
    /// The RESET_STREAM frame was acknowledged.
    ResetAcked,
}

/// The sending half of a stream.
#[derive(Debug)]
pub struct Sender {
    state: SendState,
    sndbuf: SendBuf,
    max_stream_data: u64,
    stop_sending: Option<u64>,
    reset: Option<ResetStreamFrame>,
}

impl Sender {
    /// A sender allowed to send up to `max_stream_data` bytes by the peer.
    pub fn new(max_stream_data: u64) -> Self {
        Self {
            state: SendState::Open,
            sndbuf: SendBuf::default(),
            max_stream_data,
            stop_sending: None,
            reset: None,
        }
    }

    /// The sending half of a stream this endpoint can't send on.
    pub fn closed() -> Self {
        Self {
            state: SendState::Closed,
            ..Self::new(0)
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn sndbuf(&self) -> &SendBuf {
        &self.sndbuf
    }

    pub fn max_stream_data(&self) -> u64 {
        self.max_stream_data
    }

    /// The error code of the STOP_SENDING the peer sent, if any.
    pub fn stop_sending(&self) -> Option<u64> {
        self.stop_sending
    }

    /// The RESET_STREAM frame to deliver, while the reset is not acknowledged.
    pub fn reset_frame(&self) -> Option<&ResetStreamFrame> {
        match self.state {
            SendState::ResetSent => self.reset.as_ref(),
            SendState::Open | SendState::Closed => None,
        }
    }

    fn check_writable(&self) -> Result<(), StreamError> {
        if let Some(reset) = &self.reset {
            return Err(StreamError::Reset(ResetStreamError::from(reset)));
        }
        if self.state != SendState::Open || self.sndbuf.is_finished() {
            return Err(StreamError::EosSent);
        }
        Ok(())
    }

    pub fn write(&mut self, data: Bytes) -> Result<(), StreamError> {
        self.check_writable()?;
        self.sndbuf.write(data);
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), StreamError> {
        self.check_writable()?;
        self.sndbuf.finish();
        Ok(())
    }

    /// Raise the limit with MAX_STREAM_DATA, returns whether it grew.
    pub fn update_window(&mut self, max_stream_data: u64) -> bool {
        if max_stream_data > self.max_stream_data {
            self.max_stream_data = max_stream_data;
            true
        } else {
            false
        }
    }

    /// Whether data, lost data or a FIN waits to be sent.
    pub fn has_pending_data(&self) -> bool {
        self.state == SendState::Open && self.sndbuf.has_pending_data()
    }

    /// Pick up the next chunk to send, see [`SendBuf::pick_up`].
    ///
    /// Fresh data is bounded by the stream window and the `conn_available` bytes
    /// of connection-level credit.
    pub fn pick_up(&mut self, max_len: usize, conn_available: u64) -> Option<(StreamBuffer, usize)> {
        if self.state != SendState::Open {
            return None;
        }
        let limit = self
            .max_stream_data
            .min(self.sndbuf.sent().saturating_add(conn_available));
        self.sndbuf.pick_up(max_len, limit)
    }

    /// The chunk at `offset` was in a lost packet.
    pub fn on_lost(&mut self, offset: u64) {
        if self.state == SendState::Open {
            self.sndbuf.on_lost(offset);
        }
    }

    /// The chunk in flight at `offset`, only while the stream may still send.
    pub fn retransmittable(&self, offset: u64) -> Option<&StreamBuffer> {
        match self.state {
            SendState::Open => self.sndbuf.retransmittable(offset),
            SendState::ResetSent | SendState::Closed => None,
        }
    }

    fn transit(&mut self, sid: StreamId, to: SendState) {
        tracing::debug!(%sid, from = ?self.state, ?to, "sending half transits");
        self.state = to;
    }

    /// Apply an event, returning the side effects for the connection.
    ///
    /// # Panics
    ///
    /// Panics on `ResetAcked` in `Open`: no reset was ever sent.
    pub fn apply(&mut self, sid: StreamId, event: SendEvent) -> Vec<Effect> {
        match (self.state, event) {
            (SendState::Open, SendEvent::StopSendingReceived(frame)) => {
                let code = frame.app_err_code();
                self.stop_sending.get_or_insert(code);
                vec![Effect::StopSending(code)]
            }
            (SendState::Open, SendEvent::SendReset(app_error_code)) => {
                let final_size = self.sndbuf.abandon();
                let frame = ResetStreamFrame::new(
                    sid,
                    app_error_code,
                    VarInt::from_u64(final_size).expect("final size must not exceed 2^62"),
                );
                self.reset = Some(frame);
                self.transit(sid, SendState::ResetSent);
                vec![Effect::QueueReset(frame)]
            }
            (SendState::Open, SendEvent::AckStreamFrame(frame)) => {
                if !self
                    .sndbuf
                    .on_acked(frame.offset(), frame.len(), frame.is_fin())
                {
                    tracing::trace!(%sid, range = ?frame.range(), "acked data is no longer buffered");
                }
                if self.sndbuf.all_bytes_till_fin_acked() {
                    self.transit(sid, SendState::Closed);
                }
                vec![Effect::Deliverable]
            }
            (SendState::Open, SendEvent::ResetAcked) => {
                panic!("{sid} acknowledged a reset it never sent")
            }
            (SendState::ResetSent, SendEvent::ResetAcked) => {
                self.transit(sid, SendState::Closed);
                vec![]
            }
            (
                SendState::ResetSent,
                event @ (SendEvent::StopSendingReceived(_)
                | SendEvent::SendReset(_)
                | SendEvent::AckStreamFrame(_)),
            ) => {
                tracing::trace!(%sid, ?event, "ignored after reset");
                vec![]
            }
            (SendState::Closed, event) => {
                tracing::trace!(%sid, ?event, "ignored on closed sending half");
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use qbase::{role::Role, sid::Dir};

    use super::*;

    fn sid() -> StreamId {
        StreamId::new(Role::Client, Dir::Bi, 0)
    }

    fn frame_of(chunk: &StreamBuffer) -> StreamFrame {
        let mut frame = StreamFrame::new(sid(), chunk.offset, chunk.len());
        frame.set_eos_flag(chunk.fin);
        frame
    }

    #[test]
    fn test_ack_till_fin_closes() {
        let mut sender = Sender::new(100);
        sender.write(Bytes::from_static(b"hello world")).unwrap();
        sender.finish().unwrap();
        assert_eq!(sender.write(Bytes::from_static(b"!")), Err(StreamError::EosSent));

        let (first, fresh) = sender.pick_up(5, 100).unwrap();
        assert_eq!(fresh, 5);
        let (second, _) = sender.pick_up(100, 100).unwrap();
        assert!(second.fin);

        let effects = sender.apply(sid(), SendEvent::AckStreamFrame(frame_of(&second)));
        assert_eq!(effects, vec![Effect::Deliverable]);
        assert_eq!(sender.state(), SendState::Open);

        let effects = sender.apply(sid(), SendEvent::AckStreamFrame(frame_of(&first)));
        assert_eq!(effects, vec![Effect::Deliverable]);
        assert_eq!(sender.state(), SendState::Closed);

        // Duplicated acknowledgment on a closed stream.
        assert!(
            sender
                .apply(sid(), SendEvent::AckStreamFrame(frame_of(&first)))
                .is_empty()
        );
    }

    #[test]
    fn test_window_bounds_fresh_data() {
        let mut sender = Sender::new(4);
        sender.write(Bytes::from_static(b"hello")).unwrap();
        assert_eq!(sender.pick_up(100, 2).unwrap().0.len(), 2);
        assert_eq!(sender.pick_up(100, 100).unwrap().0.len(), 2);
        assert!(sender.pick_up(100, 100).is_none());
        assert!(sender.update_window(5));
        assert!(!sender.update_window(5));
        assert_eq!(sender.pick_up(100, 100).unwrap().0.len(), 1);
    }

    #[test]
    fn test_stop_sending_keeps_state() {
        let mut sender = Sender::new(100);
        let frame = StopSendingFrame::new(sid(), VarInt::from_u32(7));
        let effects = sender.apply(sid(), SendEvent::StopSendingReceived(frame));
        assert_eq!(effects, vec![Effect::StopSending(7)]);
        assert_eq!(sender.state(), SendState::Open);
        assert_eq!(sender.stop_sending(), Some(7));
    }

    #[test]
    fn test_reset_abandons_data() {
        let mut sender = Sender::new(100);
        sender.write(Bytes::from_static(b"hello world")).unwrap();
        let (chunk, _) = sender.pick_up(5, 100).unwrap();

        let effects = sender.apply(sid(), SendEvent::SendReset(VarInt::from_u32(3)));
        let reset = ResetStreamFrame::new(sid(), VarInt::from_u32(3), VarInt::from_u32(5));
        assert_eq!(effects, vec![Effect::QueueReset(reset)]);
        assert_eq!(sender.state(), SendState::ResetSent);
        assert_eq!(sender.reset_frame(), Some(&reset));
        assert!(sender.retransmittable(chunk.offset).is_none());
        assert!(!sender.has_pending_data());
        assert!(matches!(
            sender.write(Bytes::from_static(b"!")),
            Err(StreamError::Reset(_))
        ));

        // Acknowledgments after the reset are not applied.
        assert!(
            sender
                .apply(sid(), SendEvent::AckStreamFrame(frame_of(&chunk)))
                .is_empty()
        );
        assert!(
            sender
                .apply(sid(), SendEvent::SendReset(VarInt::from_u32(4)))
                .is_empty()
        );
        assert_eq!(sender.reset_frame(), Some(&reset));

        assert!(sender.apply(sid(), SendEvent::ResetAcked).is_empty());
        assert_eq!(sender.state(), SendState::Closed);
        assert_eq!(sender.reset_frame(), None);
    }

    #[test]
    #[should_panic]
    fn test_reset_acked_without_reset() {
        let mut sender = Sender::new(100);
        sender.apply(sid(), SendEvent::ResetAcked);
    }
}
