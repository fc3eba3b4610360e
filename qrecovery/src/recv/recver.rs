use bytes::Bytes;
use qbase::{
    error::{ErrorKind, QuicError},
    frame::{
        BeFrame, MaxStreamDataFrame, ResetStreamError, ResetStreamFrame, StopSendingFrame,
        StreamFrame,
    },
    sid::StreamId,
    varint::{VARINT_MAX, VarInt},
};

use super::rcvbuf::RecvBuf;
use crate::{stream::Effect, streams::error::StreamError};

/// States of the receiving half of a stream.
///
/// `Closed` is reached once every byte up to the final size has arrived, or
/// the peer reset the stream. Data already received may still be read by the
/// application afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Open,
    Closed,
}

/// Events driving the receiving half of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvEvent {
    /// A STREAM frame and its data arrived.
    ReadStreamFrame(StreamFrame, Bytes),
    /// A RESET_STREAM frame arrived.
    RstStreamFrame(ResetStreamFrame),
}

/// The receiving half of a stream.
#[derive(Debug)]
pub struct Recver {
    state: RecvState,
    rcvbuf: RecvBuf,
    largest: u64,
    final_size: Option<u64>,
    max_stream_data: u64,
    window: u64,
    reset: Option<ResetStreamError>,
    stopped: Option<u64>,
}

impl Recver {
    /// A receiver advertising a window of `window` bytes to the peer.
    pub fn new(window: u64) -> Self {
        Self {
            state: RecvState::Open,
            rcvbuf: RecvBuf::default(),
            largest: 0,
            final_size: None,
            max_stream_data: window,
            window,
            reset: None,
            stopped: None,
        }
    }

    /// The receiving half of a stream this endpoint can't receive on.
    pub fn closed() -> Self {
        Self {
            state: RecvState::Closed,
            ..Self::new(0)
        }
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    pub fn rcvbuf(&self) -> &RecvBuf {
        &self.rcvbuf
    }

    /// The limit currently advertised to the peer with MAX_STREAM_DATA.
    pub fn max_stream_data(&self) -> u64 {
        self.max_stream_data
    }

    /// The largest offset the peer has sent, which it consumed of flow control.
    pub fn largest(&self) -> u64 {
        self.largest
    }

    pub fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    /// The reset the peer sent, if any.
    pub fn reset(&self) -> Option<ResetStreamError> {
        self.reset
    }

    /// The error code this endpoint asked the peer to stop sending with.
    pub fn stopped(&self) -> Option<u64> {
        self.stopped
    }

    /// Bytes the application may read right now.
    pub fn available(&self) -> u64 {
        self.rcvbuf.available()
    }

    /// Whether a read would return something: data, or the reset error.
    pub fn is_readable(&self) -> bool {
        self.available() > 0 || self.reset.is_some()
    }

    /// Whether the application has read everything up to the final size.
    pub fn is_finished(&self) -> bool {
        self.final_size == Some(self.rcvbuf.nread())
    }

    /// Whether the application has nothing left to learn from this half.
    pub fn is_drained(&self) -> bool {
        self.state == RecvState::Closed && (self.reset.is_some() || self.available() == 0)
    }

    /// Read up to `max` bytes of continuous data.
    ///
    /// Once the peer reset the stream, reading fails with the reset.
    pub fn read(&mut self, max: usize) -> Result<Bytes, StreamError> {
        if let Some(reset) = self.reset {
            return Err(StreamError::Reset(reset));
        }
        Ok(self.rcvbuf.read(max))
    }

    /// Extend the window after the application read data.
    ///
    /// A MAX_STREAM_DATA frame is produced once half of the window has been
    /// consumed, and only while more data is expected.
    pub fn window_update(&mut self, sid: StreamId) -> Option<MaxStreamDataFrame> {
        if self.state != RecvState::Open {
            return None;
        }
        let nread = self.rcvbuf.nread();
        if nread + self.window / 2 < self.max_stream_data {
            return None;
        }
        let max_stream_data = (nread + self.window).min(VARINT_MAX);
        if max_stream_data <= self.max_stream_data {
            return None;
        }
        self.max_stream_data = max_stream_data;
        Some(MaxStreamDataFrame::new(
            sid,
            VarInt::from_u64(max_stream_data).expect("max stream data must not exceed 2^62"),
        ))
    }

    /// Ask the peer to stop sending, only once and while data is still expected.
    pub fn stop(&mut self, sid: StreamId, app_err_code: VarInt) -> Option<StopSendingFrame> {
        if self.state != RecvState::Open || self.stopped.is_some() {
            return None;
        }
        self.stopped = Some(app_err_code.into_inner());
        Some(StopSendingFrame::new(sid, app_err_code))
    }

    fn transit(&mut self, sid: StreamId, to: RecvState) {
        tracing::debug!(%sid, from = ?self.state, ?to, "receiving half transits");
        self.state = to;
    }

    fn check_final_size(&self, sid: StreamId, frame: &StreamFrame) -> Result<(), QuicError> {
        let end = frame.offset() + frame.len() as u64;
        match self.final_size {
            Some(final_size) if end > final_size || (frame.is_fin() && end != final_size) => {
                tracing::error!("   Cause by: {sid} received data beyond or changing its final size");
                Err(QuicError::new(
                    ErrorKind::FinalSize,
                    frame.frame_type(),
                    format!("{sid} received data ending at {end}, but the final size is {final_size}"),
                ))
            }
            None if frame.is_fin() && self.largest > end => {
                tracing::error!("   Cause by: {sid} received an end stream frame with a smaller final size");
                Err(QuicError::new(
                    ErrorKind::FinalSize,
                    frame.frame_type(),
                    format!(
                        "{sid} received a final size {end} smaller than the largest received offset {}",
                        self.largest
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    fn on_stream_frame(
        &mut self,
        sid: StreamId,
        frame: StreamFrame,
        body: Bytes,
    ) -> Result<Vec<Effect>, QuicError> {
        let end = frame.offset() + body.len() as u64;
        if end > self.max_stream_data {
            tracing::error!("   Cause by: the stream data size received by {sid} exceeds the limit");
            return Err(QuicError::new(
                ErrorKind::FlowControl,
                frame.frame_type(),
                format!(
                    "{sid} send {end} bytes which exceeds the stream data limit {}",
                    self.max_stream_data
                ),
            ));
        }
        self.check_final_size(sid, &frame)?;

        if frame.is_fin() {
            self.final_size = Some(end);
        }
        let fresh = self.rcvbuf.recv(frame.offset(), body);
        tracing::trace!(%sid, range = ?frame.range(), fresh, "stream data received");

        let mut effects = Vec::with_capacity(2);
        if end > self.largest {
            effects.push(Effect::NewData(end - self.largest));
            self.largest = end;
        }
        if self.final_size == Some(self.rcvbuf.contiguous_end()) {
            self.transit(sid, RecvState::Closed);
        }
        effects.push(Effect::UpdateReadable);
        Ok(effects)
    }

    fn on_reset_frame(
        &mut self,
        sid: StreamId,
        frame: ResetStreamFrame,
    ) -> Result<Vec<Effect>, QuicError> {
        let final_size = frame.final_size();
        if final_size < self.largest || self.final_size.is_some_and(|known| known != final_size) {
            tracing::error!("   Cause by: {sid} was reset with a wrong final size");
            return Err(QuicError::new(
                ErrorKind::FinalSize,
                frame.frame_type(),
                format!(
                    "{sid} was reset with final size {final_size}, but {} bytes were received",
                    self.final_size.unwrap_or(self.largest)
                ),
            ));
        }
        if final_size > self.max_stream_data {
            tracing::error!("   Cause by: {sid} was reset with a final size exceeding the limit");
            return Err(QuicError::new(
                ErrorKind::FlowControl,
                frame.frame_type(),
                format!(
                    "{sid} was reset with final size {final_size} exceeding the stream data limit {}",
                    self.max_stream_data
                ),
            ));
        }

        // The receiving half is closed before anything observes the reset.
        self.transit(sid, RecvState::Closed);
        self.reset = Some(ResetStreamError::from(&frame));
        self.final_size = Some(final_size);
        self.rcvbuf.clear();
        let new_data = final_size - self.largest;
        self.largest = final_size;
        Ok(vec![
            Effect::ResetSendHalf,
            Effect::UpdateReadable,
            Effect::NewData(new_data),
        ])
    }

    /// Apply an event, returning the side effects for the connection.
    ///
    /// Flow control and final size violations are connection errors, nothing
    /// is changed when they are returned.
    pub fn apply(&mut self, sid: StreamId, event: RecvEvent) -> Result<Vec<Effect>, QuicError> {
        match (self.state, event) {
            (RecvState::Open, RecvEvent::ReadStreamFrame(frame, body)) => {
                self.on_stream_frame(sid, frame, body)
            }
            (RecvState::Open, RecvEvent::RstStreamFrame(frame)) => self.on_reset_frame(sid, frame),
            (RecvState::Closed, event) => {
                tracing::trace!(%sid, ?event, "ignored on closed receiving half");
                Ok(vec![])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use qbase::{role::Role, sid::Dir};

    use super::*;

    fn sid() -> StreamId {
        StreamId::new(Role::Server, Dir::Uni, 0)
    }

    fn stream_frame(offset: u64, data: &'static [u8], fin: bool) -> RecvEvent {
        let mut frame = StreamFrame::new(sid(), offset, data.len());
        frame.set_eos_flag(fin);
        RecvEvent::ReadStreamFrame(frame, Bytes::from_static(data))
    }

    fn reset_frame(final_size: u32) -> RecvEvent {
        RecvEvent::RstStreamFrame(ResetStreamFrame::new(
            sid(),
            VarInt::from_u32(9),
            VarInt::from_u32(final_size),
        ))
    }

    #[test]
    fn test_out_of_order_till_fin() {
        let mut recver = Recver::new(100);
        let effects = recver.apply(sid(), stream_frame(6, b"world", true)).unwrap();
        assert_eq!(effects, vec![Effect::NewData(11), Effect::UpdateReadable]);
        assert_eq!(recver.final_size(), Some(11));
        assert!(!recver.is_readable());

        let effects = recver.apply(sid(), stream_frame(3, b"lo w", false)).unwrap();
        assert_eq!(effects, vec![Effect::UpdateReadable]);
        assert_eq!(recver.state(), RecvState::Open);

        recver.apply(sid(), stream_frame(0, b"hel", false)).unwrap();
        assert_eq!(recver.state(), RecvState::Closed);
        assert_eq!(recver.available(), 11);
        assert!(!recver.is_drained());

        assert_eq!(&recver.read(usize::MAX).unwrap()[..], b"hello world");
        assert!(recver.is_finished());
        assert!(recver.is_drained());

        // Retransmitted data after closing is benign.
        assert!(recver.apply(sid(), stream_frame(0, b"hel", false)).unwrap().is_empty());
    }

    #[test]
    fn test_flow_control_violation() {
        let mut recver = Recver::new(4);
        let error = recver.apply(sid(), stream_frame(0, b"hello", false)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::FlowControl);
        assert_eq!(recver.available(), 0);
    }

    #[test]
    fn test_final_size_violations() {
        let mut recver = Recver::new(100);
        recver.apply(sid(), stream_frame(0, b"hello", false)).unwrap();
        let error = recver.apply(sid(), stream_frame(0, b"hel", true)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::FinalSize);

        let mut recver = Recver::new(100);
        recver.apply(sid(), stream_frame(6, b"world", true)).unwrap();
        let error = recver.apply(sid(), stream_frame(11, b"!", false)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::FinalSize);
        let error = recver.apply(sid(), stream_frame(0, b"hello", true)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::FinalSize);
        let error = recver.apply(sid(), reset_frame(12)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::FinalSize);
    }

    #[test]
    fn test_reset() {
        let mut recver = Recver::new(100);
        recver.apply(sid(), stream_frame(0, b"hello", false)).unwrap();
        assert_eq!(
            recver.apply(sid(), reset_frame(3)).unwrap_err().kind(),
            ErrorKind::FinalSize
        );
        assert_eq!(
            recver.apply(sid(), reset_frame(101)).unwrap_err().kind(),
            ErrorKind::FlowControl
        );

        let effects = recver.apply(sid(), reset_frame(8)).unwrap();
        assert_eq!(
            effects,
            vec![
                Effect::ResetSendHalf,
                Effect::UpdateReadable,
                Effect::NewData(3)
            ]
        );
        assert_eq!(recver.state(), RecvState::Closed);
        assert!(recver.is_readable());
        assert!(recver.is_drained());
        assert_eq!(
            recver.read(10),
            Err(StreamError::Reset(ResetStreamError::new(
                VarInt::from_u32(9),
                VarInt::from_u32(8)
            )))
        );
        assert!(recver.apply(sid(), reset_frame(8)).unwrap().is_empty());
    }

    #[test]
    fn test_window_update() {
        let mut recver = Recver::new(10);
        recver.apply(sid(), stream_frame(0, b"hell", false)).unwrap();
        recver.read(4).unwrap();
        assert!(recver.window_update(sid()).is_none());

        recver.apply(sid(), stream_frame(4, b"o", false)).unwrap();
        recver.read(4).unwrap();
        let frame = recver.window_update(sid()).unwrap();
        assert_eq!(frame.max_stream_data(), 15);
        assert_eq!(recver.max_stream_data(), 15);
        assert!(recver.window_update(sid()).is_none());
    }

    #[test]
    fn test_stop_once() {
        let mut recver = Recver::new(10);
        let frame = recver.stop(sid(), VarInt::from_u32(1)).unwrap();
        assert_eq!(frame.app_err_code(), 1);
        assert!(recver.stop(sid(), VarInt::from_u32(2)).is_none());
        assert_eq!(recver.stopped(), Some(1));
    }
}
