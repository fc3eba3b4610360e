use thiserror::Error;

use crate::{
    error::{ErrorKind, QuicError},
    frame::{DataBlockedFrame, FrameType, MaxDataFrame},
    varint::VarInt,
};

/// Connection-level send flow control.
///
/// All fresh data sent in STREAM frames counts toward the limit the peer
/// advertised, retransmissions don't.
#[derive(Debug, Default)]
pub struct SendController {
    total_sent: u64,
    max_data: u64,
    blocked_at: Option<u64>,
}

impl SendController {
    /// `initial_max_data` is allowed to be 0, which is reasonable before the
    /// peer's transport parameters are known.
    pub fn with_initial(initial_max_data: u64) -> Self {
        Self {
            total_sent: 0,
            max_data: initial_max_data,
            blocked_at: None,
        }
    }

    /// Increase the limit by a MAX_DATA frame from peer, returns whether it grew.
    ///
    /// MAX_DATA frames that do not increase the limit are ignored.
    pub fn on_max_data_frame(&mut self, frame: &MaxDataFrame) -> bool {
        self.set_max_data(frame.max_data())
    }

    /// Raise the limit, as the peer's transport parameters arrive.
    pub fn set_max_data(&mut self, max_data: u64) -> bool {
        if max_data > self.max_data {
            self.max_data = max_data;
            true
        } else {
            false
        }
    }

    pub fn max_data(&self) -> u64 {
        self.max_data
    }

    /// How many more fresh bytes may be sent.
    pub fn available(&self) -> u64 {
        self.max_data - self.total_sent
    }

    /// Account `amount` fresh bytes just sent.
    pub fn post_sent(&mut self, amount: u64) {
        debug_assert!(self.total_sent + amount <= self.max_data);
        self.total_sent += amount;
    }

    /// A DATA_BLOCKED frame, once per limit, when all the credit is used up.
    pub fn blocked(&mut self) -> Option<DataBlockedFrame> {
        if self.total_sent < self.max_data || self.blocked_at == Some(self.max_data) {
            return None;
        }
        self.blocked_at = Some(self.max_data);
        VarInt::from_u64(self.max_data)
            .ok()
            .map(DataBlockedFrame::new)
    }
}

/// The peer sent more data than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Flow Control exceed {exceeded} bytes on receiving")]
pub struct Overflow {
    exceeded: u64,
}

impl Overflow {
    /// The FLOW_CONTROL_ERROR closing the connection, blamed on the frame
    /// that carried the excess data.
    pub fn into_quic_error(self, frame_type: FrameType) -> QuicError {
        tracing::error!("   Cause by: {self}");
        QuicError::new(ErrorKind::FlowControl, frame_type, self.to_string())
    }
}

/// Connection-level receive flow control.
///
/// Data received counts toward the advertised limit, data read by the application
/// moves the window forward. A MAX_DATA frame is produced once half of the window
/// has been consumed.
#[derive(Debug, Default)]
pub struct RecvController {
    rcvd: u64,
    consumed: u64,
    max_data: u64,
    window: u64,
}

impl RecvController {
    pub fn with_initial(initial_max_data: u64) -> Self {
        Self {
            rcvd: 0,
            consumed: 0,
            max_data: initial_max_data,
            window: initial_max_data,
        }
    }

    /// Check that `amount` more bytes would stay within the advertised limit.
    pub fn check(&self, amount: u64) -> Result<(), Overflow> {
        let rcvd = self.rcvd.saturating_add(amount);
        if rcvd > self.max_data {
            return Err(Overflow {
                exceeded: rcvd - self.max_data,
            });
        }
        Ok(())
    }

    /// Account `amount` bytes of newly received data.
    pub fn on_new_rcvd(&mut self, amount: u64) -> Result<u64, Overflow> {
        self.check(amount)?;
        self.rcvd += amount;
        Ok(amount)
    }

    /// Account `amount` bytes the application has read, which may extend the limit.
    pub fn on_data_read(&mut self, amount: u64) -> Option<MaxDataFrame> {
        self.consumed += amount;
        let max_data = self.consumed + self.window;
        if self.consumed + self.window / 2 < self.max_data || max_data <= self.max_data {
            return None;
        }
        self.max_data = max_data;
        VarInt::from_u64(self.max_data).ok().map(MaxDataFrame::new)
    }

    /// The limit currently advertised to the peer.
    pub fn max_data(&self) -> u64 {
        self.max_data
    }

    pub fn rcvd(&self) -> u64 {
        self.rcvd
    }
}

/// Connection-level flow control in both directions.
#[derive(Debug, Default)]
pub struct FlowController {
    pub sender: SendController,
    pub recver: RecvController,
}

impl FlowController {
    /// Creates a new `FlowController` with the specified initial send and receive window sizes.
    pub fn with_initial(peer_initial_max_data: u64, local_initial_max_data: u64) -> Self {
        Self {
            sender: SendController::with_initial(peer_initial_max_data),
            recver: RecvController::with_initial(local_initial_max_data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_controller() {
        let mut sender = SendController::with_initial(10);
        assert_eq!(sender.available(), 10);
        assert!(sender.blocked().is_none());

        sender.post_sent(10);
        assert_eq!(sender.available(), 0);
        assert_eq!(sender.blocked().map(|f| f.limit()), Some(10));
        assert!(sender.blocked().is_none());

        assert!(!sender.on_max_data_frame(&MaxDataFrame::new(VarInt::from_u32(5))));
        assert!(sender.on_max_data_frame(&MaxDataFrame::new(VarInt::from_u32(20))));
        assert_eq!(sender.available(), 10);
        sender.post_sent(10);
        assert_eq!(sender.blocked().map(|f| f.limit()), Some(20));
    }

    #[test]
    fn test_recv_controller() {
        let mut recver = RecvController::with_initial(100);
        assert_eq!(recver.on_new_rcvd(60), Ok(60));
        assert_eq!(recver.on_new_rcvd(41), Err(Overflow { exceeded: 1 }));
        assert_eq!(recver.rcvd(), 60);

        assert_eq!(recver.on_data_read(40), None);
        let frame = recver.on_data_read(10).unwrap();
        assert_eq!(frame.max_data(), 150);
        assert_eq!(recver.max_data(), 150);
        assert_eq!(recver.on_new_rcvd(90), Ok(90));
    }

    #[test]
    fn test_no_update_without_growth() {
        let mut recver = RecvController::with_initial(0);
        assert_eq!(recver.on_data_read(0), None);
        assert_eq!(recver.max_data(), 0);

        let mut recver = RecvController::with_initial(100);
        assert_eq!(recver.on_new_rcvd(100), Ok(100));
        assert_eq!(recver.on_data_read(100).map(|f| f.max_data()), Some(200));
        assert_eq!(recver.on_data_read(0), None);
    }

    #[test]
    fn test_overflow_into_quic_error() {
        let error = Overflow { exceeded: 3 }.into_quic_error(FrameType::ResetStream);
        assert_eq!(error.kind(), ErrorKind::FlowControl);
        assert_eq!(error.frame_type(), FrameType::ResetStream);
    }
}
