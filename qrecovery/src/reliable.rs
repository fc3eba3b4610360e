//! The frames that must reach the peer, recorded per sent packet.
use qbase::frame::{CryptoFrame, Frame, ReliableFrame, StreamFrame};

/// A frame whose delivery is guaranteed: on loss its content is sent again.
///
/// STREAM and CRYPTO frames are recorded without their body, the data stays in
/// the send buffers until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuaranteedFrame {
    Stream(StreamFrame),
    Crypto(CryptoFrame),
    Reliable(ReliableFrame),
}

impl GuaranteedFrame {
    /// The guaranteed part of a written frame; PADDING, PING and
    /// CONNECTION_CLOSE are not retransmitted.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match frame {
            Frame::Stream(frame, _) => Some(Self::Stream(*frame)),
            Frame::Crypto(frame, _) => Some(Self::Crypto(*frame)),
            Frame::MaxData(frame) => Some(Self::Reliable(ReliableFrame::MaxData(*frame))),
            Frame::DataBlocked(frame) => Some(Self::Reliable(ReliableFrame::DataBlocked(*frame))),
            Frame::HandshakeDone(frame) => {
                Some(Self::Reliable(ReliableFrame::HandshakeDone(*frame)))
            }
            Frame::StreamCtl(frame) => Some(Self::Reliable(ReliableFrame::Stream(frame.clone()))),
            Frame::Padding(_) | Frame::Ping(_) | Frame::Close(_) => None,
        }
    }

    /// The guaranteed frames among the frames of a written packet.
    pub fn collect<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> Vec<Self> {
        frames.into_iter().filter_map(Self::from_frame).collect()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use qbase::{
        frame::{HandshakeDoneFrame, MaxDataFrame, PaddingFrame, PingFrame},
        role::Role,
        sid::{Dir, StreamId},
        varint::VarInt,
    };

    use super::*;

    #[test]
    fn test_collect() {
        let sid = StreamId::new(Role::Client, Dir::Bi, 0);
        let stream = StreamFrame::new(sid, 0, 3);
        let max_data = MaxDataFrame::new(VarInt::from_u32(100));
        let frames = [
            Frame::Ping(PingFrame),
            Frame::Stream(stream, Bytes::from_static(b"abc")),
            Frame::MaxData(max_data),
            Frame::HandshakeDone(HandshakeDoneFrame),
            Frame::Padding(PaddingFrame),
        ];
        assert_eq!(
            GuaranteedFrame::collect(&frames),
            vec![
                GuaranteedFrame::Stream(stream),
                GuaranteedFrame::Reliable(ReliableFrame::MaxData(max_data)),
                GuaranteedFrame::Reliable(ReliableFrame::HandshakeDone(HandshakeDoneFrame)),
            ]
        );
    }
}
