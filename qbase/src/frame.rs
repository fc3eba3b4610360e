use bytes::{Buf, BufMut, Bytes};
use enum_dispatch::enum_dispatch;
use io::{WriteDataFrame, WriteFrame};

use crate::{packet::Epoch, varint::VarInt};

mod connection_close;
mod crypto;
mod data_blocked;
mod handshake_done;
mod max_data;
mod max_stream_data;
mod padding;
mod ping;
mod reset_stream;
mod stop_sending;
mod stream;

/// Error module for parsing frames
pub mod error;
/// IO module for frame encoding and decoding
pub mod io;

pub use connection_close::ConnectionCloseFrame;
pub use crypto::CryptoFrame;
pub use data_blocked::DataBlockedFrame;
#[doc(hidden)]
pub use error::Error;
pub use handshake_done::HandshakeDoneFrame;
pub use max_data::MaxDataFrame;
pub use max_stream_data::MaxStreamDataFrame;
pub use padding::PaddingFrame;
pub use ping::PingFrame;
pub use reset_stream::{ResetStreamError, ResetStreamFrame};
pub use stop_sending::StopSendingFrame;
pub use stream::{STREAM_FRAME_MAX_ENCODING_SIZE, StreamFrame};

/// Define the basic behaviors for all kinds of frames
#[enum_dispatch]
pub trait BeFrame {
    /// Return the type of frame
    fn frame_type(&self) -> FrameType;

    /// Return the max number of bytes needed to encode this value
    ///
    /// Calculate the maximum size by summing up the maximum length of each field.
    /// If a field type has a maximum length, use it, otherwise use the actual length
    /// of the data in that field.
    fn max_encoding_size(&self) -> usize {
        1
    }

    /// Return the exact number of bytes needed to encode this value
    fn encoding_size(&self) -> usize {
        1
    }
}

/// The sum type of all the core QUIC frame types.
///
/// Only some of them are produced or consumed by this crate, the whole type space
/// is kept so that errors can always name the frame that caused them.
///
/// See [table-3](https://www.rfc-editor.org/rfc/rfc9000.html#table-3)
/// and [frame types and formats](https://www.rfc-editor.org/rfc/rfc9000.html#name-frame-types-and-formats)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FrameType {
    /// PADDING frame, see [`PaddingFrame`].
    Padding,
    /// PING frame, see [`PingFrame`].
    Ping,
    /// ACK frame
    Ack(u8),
    /// RESET_STREAM frame, see [`ResetStreamFrame`].
    ResetStream,
    /// STOP_SENDING frame, see [`StopSendingFrame`].
    StopSending,
    /// CRYPTO frame, see [`CryptoFrame`].
    Crypto,
    /// NEW_TOKEN frame
    NewToken,
    /// STREAM frame, see [`StreamFrame`].
    Stream(u8),
    /// MAX_DATA frame, see [`MaxDataFrame`].
    MaxData,
    /// MAX_STREAM_DATA frame, see [`MaxStreamDataFrame`].
    MaxStreamData,
    /// MAX_STREAMS frame
    MaxStreams(u8),
    /// DATA_BLOCKED frame, see [`DataBlockedFrame`].
    DataBlocked,
    /// STREAM_DATA_BLOCKED frame
    StreamDataBlocked,
    /// STREAMS_BLOCKED frame
    StreamsBlocked(u8),
    /// NEW_CONNECTION_ID frame
    NewConnectionId,
    /// RETIRE_CONNECTION_ID frame
    RetireConnectionId,
    /// PATH_CHALLENGE frame
    PathChallenge,
    /// PATH_RESPONSE frame
    PathResponse,
    /// CONNECTION_CLOSE frame, see [`ConnectionCloseFrame`].
    ConnectionClose(u8),
    /// HANDSHAKE_DONE frame, see [`HandshakeDoneFrame`].
    HandshakeDone,
}

impl FrameType {
    /// Return whether a frame of this type may be carried in a packet of `epoch`.
    ///
    /// Initial and Handshake packets only carry the handshake machinery:
    /// PADDING, PING, ACK, CRYPTO and the transport variant of CONNECTION_CLOSE.
    pub fn belongs_to(&self, epoch: Epoch) -> bool {
        match epoch {
            Epoch::Initial | Epoch::Handshake => matches!(
                self,
                FrameType::Padding
                    | FrameType::Ping
                    | FrameType::Ack(_)
                    | FrameType::Crypto
                    | FrameType::ConnectionClose(0)
            ),
            Epoch::Data => true,
        }
    }

    /// Return if the frame type is ack-eliciting
    pub fn is_ack_eliciting(&self) -> bool {
        !matches!(
            self,
            Self::Padding | Self::Ack(..) | Self::ConnectionClose(..)
        )
    }
}

impl TryFrom<VarInt> for FrameType {
    type Error = Error;

    fn try_from(frame_type: VarInt) -> Result<Self, Self::Error> {
        Ok(match frame_type.into_inner() {
            0x00 => FrameType::Padding,
            0x01 => FrameType::Ping,
            // The last bit is the ECN flag.
            ty @ (0x02 | 0x03) => FrameType::Ack(ty as u8 & 0b1),
            0x04 => FrameType::ResetStream,
            0x05 => FrameType::StopSending,
            0x06 => FrameType::Crypto,
            0x07 => FrameType::NewToken,
            // The last three bits are the offset, length, and fin flag bits respectively.
            ty @ 0x08..=0x0f => FrameType::Stream(ty as u8 & 0b111),
            0x10 => FrameType::MaxData,
            0x11 => FrameType::MaxStreamData,
            ty @ (0x12 | 0x13) => FrameType::MaxStreams(ty as u8 & 0b1),
            0x14 => FrameType::DataBlocked,
            0x15 => FrameType::StreamDataBlocked,
            ty @ (0x16 | 0x17) => FrameType::StreamsBlocked(ty as u8 & 0b1),
            0x18 => FrameType::NewConnectionId,
            0x19 => FrameType::RetireConnectionId,
            0x1a => FrameType::PathChallenge,
            0x1b => FrameType::PathResponse,
            // The last bit is the layer flag bit, 0 indicates transport layer, 1 indicates application layer.
            ty @ (0x1c | 0x1d) => FrameType::ConnectionClose(ty as u8 & 0x1),
            0x1e => FrameType::HandshakeDone,
            _ => return Err(Error::InvalidType(frame_type)),
        })
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::Padding => 0x00,
            FrameType::Ping => 0x01,
            FrameType::Ack(ecn) => 0x02 | ecn,
            FrameType::ResetStream => 0x04,
            FrameType::StopSending => 0x05,
            FrameType::Crypto => 0x06,
            FrameType::NewToken => 0x07,
            FrameType::Stream(flag) => 0x08 | flag,
            FrameType::MaxData => 0x10,
            FrameType::MaxStreamData => 0x11,
            FrameType::MaxStreams(dir) => 0x12 | dir,
            FrameType::DataBlocked => 0x14,
            FrameType::StreamDataBlocked => 0x15,
            FrameType::StreamsBlocked(dir) => 0x16 | dir,
            FrameType::NewConnectionId => 0x18,
            FrameType::RetireConnectionId => 0x19,
            FrameType::PathChallenge => 0x1a,
            FrameType::PathResponse => 0x1b,
            FrameType::ConnectionClose(layer) => 0x1c | layer,
            FrameType::HandshakeDone => 0x1e,
        }
    }
}

impl From<FrameType> for VarInt {
    fn from(frame_type: FrameType) -> Self {
        VarInt::from(u8::from(frame_type))
    }
}

/// Sum type of all the stream related control frames.
#[derive(Debug, Clone, Eq, PartialEq)]
#[enum_dispatch(BeFrame)]
pub enum StreamCtlFrame {
    /// RESET_STREAM frame, see [`ResetStreamFrame`].
    ResetStream(ResetStreamFrame),
    /// STOP_SENDING frame, see [`StopSendingFrame`].
    StopSending(StopSendingFrame),
    /// MAX_STREAM_DATA frame, see [`MaxStreamDataFrame`].
    MaxStreamData(MaxStreamDataFrame),
}

impl StreamCtlFrame {
    /// The stream this control frame is about.
    pub fn stream_id(&self) -> crate::sid::StreamId {
        match self {
            StreamCtlFrame::ResetStream(frame) => frame.stream_id(),
            StreamCtlFrame::StopSending(frame) => frame.stream_id(),
            StreamCtlFrame::MaxStreamData(frame) => frame.stream_id(),
        }
    }
}

/// Sum type of the connection-level control frames which must be delivered reliably.
///
/// Such frames are not retransmitted verbatim when lost: they are re-emitted
/// with the latest value only if they still make sense.
#[derive(Debug, Clone, Eq, PartialEq)]
#[enum_dispatch(BeFrame)]
pub enum ReliableFrame {
    /// MAX_DATA frame, see [`MaxDataFrame`].
    MaxData(MaxDataFrame),
    /// DATA_BLOCKED frame, see [`DataBlockedFrame`].
    DataBlocked(DataBlockedFrame),
    /// HANDSHAKE_DONE frame, see [`HandshakeDoneFrame`].
    HandshakeDone(HandshakeDoneFrame),
    /// STREAM control frame, see [`StreamCtlFrame`].
    Stream(StreamCtlFrame),
}

/// Sum type of all the frames this crate reads and writes.
///
/// The data frames' body are stored in the second field.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Frame {
    /// PADDING frame, see [`PaddingFrame`].
    Padding(PaddingFrame),
    /// PING frame, see [`PingFrame`].
    Ping(PingFrame),
    /// CONNECTION_CLOSE frame, see [`ConnectionCloseFrame`].
    Close(ConnectionCloseFrame),
    /// MAX_DATA frame, see [`MaxDataFrame`].
    MaxData(MaxDataFrame),
    /// DATA_BLOCKED frame, see [`DataBlockedFrame`].
    DataBlocked(DataBlockedFrame),
    /// HANDSHAKE_DONE frame, see [`HandshakeDoneFrame`].
    HandshakeDone(HandshakeDoneFrame),
    /// Stream control frame, see [`StreamCtlFrame`].
    StreamCtl(StreamCtlFrame),
    /// STREAM frame and its data, see [`StreamFrame`].
    Stream(StreamFrame, Bytes),
    /// CRYPTO frame and its data, see [`CryptoFrame`].
    Crypto(CryptoFrame, Bytes),
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Padding(f) => f.frame_type(),
            Frame::Ping(f) => f.frame_type(),
            Frame::Close(f) => f.frame_type(),
            Frame::MaxData(f) => f.frame_type(),
            Frame::DataBlocked(f) => f.frame_type(),
            Frame::HandshakeDone(f) => f.frame_type(),
            Frame::StreamCtl(f) => f.frame_type(),
            Frame::Stream(f, _) => f.frame_type(),
            Frame::Crypto(f, _) => f.frame_type(),
        }
    }

    /// The exact number of bytes this frame takes on the wire, body included.
    pub fn encoding_size(&self) -> usize {
        match self {
            Frame::Padding(f) => f.encoding_size(),
            Frame::Ping(f) => f.encoding_size(),
            Frame::Close(f) => f.encoding_size(),
            Frame::MaxData(f) => f.encoding_size(),
            Frame::DataBlocked(f) => f.encoding_size(),
            Frame::HandshakeDone(f) => f.encoding_size(),
            Frame::StreamCtl(f) => f.encoding_size(),
            Frame::Stream(f, _) => f.encoding_size(),
            Frame::Crypto(f, _) => f.encoding_size(),
        }
    }

    pub fn is_ack_eliciting(&self) -> bool {
        self.frame_type().is_ack_eliciting()
    }
}

impl From<ReliableFrame> for Frame {
    fn from(frame: ReliableFrame) -> Self {
        match frame {
            ReliableFrame::MaxData(f) => Frame::MaxData(f),
            ReliableFrame::DataBlocked(f) => Frame::DataBlocked(f),
            ReliableFrame::HandshakeDone(f) => Frame::HandshakeDone(f),
            ReliableFrame::Stream(f) => Frame::StreamCtl(f),
        }
    }
}

/// Reads frames from a packet payload until it is exhausted.
///
/// After the first error the reader yields nothing more, the packet is unusable.
pub struct FrameReader {
    payload: Bytes,
    epoch: Epoch,
}

impl FrameReader {
    /// Creates a [`FrameReader`] for the payload of a packet in `epoch`.
    pub fn new(payload: Bytes, epoch: Epoch) -> Self {
        Self { payload, epoch }
    }
}

impl Iterator for FrameReader {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.payload.is_empty() {
            return None;
        }

        match io::be_frame(&self.payload, self.epoch) {
            Ok((consumed, frame)) => {
                self.payload.advance(consumed);
                Some(Ok(frame))
            }
            Err(e) => {
                self.payload.clear();
                Some(Err(e))
            }
        }
    }
}

impl<T: BufMut> WriteFrame<StreamCtlFrame> for T {
    fn put_frame(&mut self, frame: &StreamCtlFrame) {
        match frame {
            StreamCtlFrame::ResetStream(frame) => self.put_frame(frame),
            StreamCtlFrame::StopSending(frame) => self.put_frame(frame),
            StreamCtlFrame::MaxStreamData(frame) => self.put_frame(frame),
        }
    }
}

impl<T: BufMut> WriteFrame<ReliableFrame> for T {
    fn put_frame(&mut self, frame: &ReliableFrame) {
        match frame {
            ReliableFrame::MaxData(frame) => self.put_frame(frame),
            ReliableFrame::DataBlocked(frame) => self.put_frame(frame),
            ReliableFrame::HandshakeDone(frame) => self.put_frame(frame),
            ReliableFrame::Stream(frame) => self.put_frame(frame),
        }
    }
}

impl<T: BufMut> WriteFrame<Frame> for T {
    fn put_frame(&mut self, frame: &Frame) {
        match frame {
            Frame::Padding(frame) => self.put_frame(frame),
            Frame::Ping(frame) => self.put_frame(frame),
            Frame::Close(frame) => self.put_frame(frame),
            Frame::MaxData(frame) => self.put_frame(frame),
            Frame::DataBlocked(frame) => self.put_frame(frame),
            Frame::HandshakeDone(frame) => self.put_frame(frame),
            Frame::StreamCtl(frame) => self.put_frame(frame),
            Frame::Stream(frame, data) => self.put_data_frame(frame, data),
            Frame::Crypto(frame, data) => self.put_data_frame(frame, data),
        }
    }
}
