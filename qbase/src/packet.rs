use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frame::{Frame, FrameType, io::WriteFrame};

/// The encryption level, and so the packet number space and crypto stream,
/// a packet belongs to.
///
/// 0-RTT and 1-RTT packets share the [`Epoch::Data`] space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Epoch {
    Initial = 0,
    Handshake = 1,
    Data = 2,
}

impl Epoch {
    /// All the epochs, in the order the handshake goes through them.
    pub const ALL: [Epoch; 3] = [Epoch::Initial, Epoch::Handshake, Epoch::Data];

    /// Index of the epoch, for per-epoch tables.
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Epoch::Initial => "initial",
            Epoch::Handshake => "handshake",
            Epoch::Data => "data",
        })
    }
}

/// A frame could not be appended to a packet; nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("frame needs {needed} bytes but only {remaining} bytes remain")]
    Capacity { needed: usize, remaining: usize },
    #[error("frame {0:?} can't be carried in {1} packet")]
    WrongEpoch(FrameType, Epoch),
}

/// The packet builder contract: everything that puts frames into a packet
/// goes through it and never constructs wire bytes itself.
pub trait PacketBuilder {
    /// The finished packet.
    type Packet;

    /// The fixed overhead of the packet: header and packet number.
    ///
    /// It is known up front, so that callers can reserve budget before deciding
    /// what to put in the packet.
    fn header_bytes(&self) -> usize;

    /// How many bytes frames may still occupy.
    fn remaining(&self) -> usize;

    /// Append a frame, STREAM and CRYPTO frames carry their body along.
    ///
    /// All or nothing: if the frame does not fit, it is not written at all and
    /// the builder is left as it was.
    fn append_frame(&mut self, frame: &Frame) -> Result<(), WriteError>;

    /// Whether no frame has been appended yet.
    fn is_empty(&self) -> bool;

    /// Close the packet and hand it out.
    fn finalize(self) -> Self::Packet
    where
        Self: Sized;
}

/// A packet assembled by a [`PacketWriter`], ready to be protected and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPacket {
    pub epoch: Epoch,
    pub pn: u64,
    /// The plaintext packet: opaque header, packet number and frames.
    pub bytes: Bytes,
    /// The frames carried, in writing order.
    pub frames: Vec<Frame>,
    pub ack_eliciting: bool,
}

/// A concrete [`PacketBuilder`], writing an opaque header, a 4-byte packet
/// number and frames into a buffer bounded by the maximum packet size.
///
/// ```
/// use bytes::Bytes;
/// use qbase::{
///     frame::{Frame, PingFrame},
///     packet::{Epoch, PacketBuilder, PacketWriter},
/// };
///
/// let mut writer = PacketWriter::new(Epoch::Initial, 0, &[0xc0; 8], 20).unwrap();
/// assert_eq!(writer.header_bytes(), 12);
/// assert_eq!(writer.remaining(), 8);
/// writer.append_frame(&Frame::Ping(PingFrame)).unwrap();
/// let packet = writer.finalize();
/// assert_eq!(packet.bytes.len(), 13);
/// assert!(packet.ack_eliciting);
/// ```
#[derive(Debug)]
pub struct PacketWriter {
    epoch: Epoch,
    pn: u64,
    header_len: usize,
    max_size: usize,
    buffer: BytesMut,
    frames: Vec<Frame>,
    ack_eliciting: bool,
}

/// Packet numbers are always written in 4 bytes.
const PN_LEN: usize = 4;

impl PacketWriter {
    /// Start a packet of `epoch` with packet number `pn`, writing the given
    /// header. Fails if the header alone does not fit in `max_size`.
    pub fn new(epoch: Epoch, pn: u64, header: &[u8], max_size: usize) -> Result<Self, WriteError> {
        let header_len = header.len() + PN_LEN;
        if header_len > max_size {
            return Err(WriteError::Capacity {
                needed: header_len,
                remaining: max_size,
            });
        }
        let mut buffer = BytesMut::with_capacity(max_size);
        buffer.put_slice(header);
        buffer.put_u32(pn as u32);
        Ok(Self {
            epoch,
            pn,
            header_len,
            max_size,
            buffer,
            frames: Vec::new(),
            ack_eliciting: false,
        })
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn pn(&self) -> u64 {
        self.pn
    }

    /// The frames appended so far.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl PacketBuilder for PacketWriter {
    type Packet = WrittenPacket;

    fn header_bytes(&self) -> usize {
        self.header_len
    }

    fn remaining(&self) -> usize {
        self.max_size - self.buffer.len()
    }

    fn append_frame(&mut self, frame: &Frame) -> Result<(), WriteError> {
        let frame_type = frame.frame_type();
        if !frame_type.belongs_to(self.epoch) {
            return Err(WriteError::WrongEpoch(frame_type, self.epoch));
        }
        let needed = frame.encoding_size();
        let remaining = self.remaining();
        if needed > remaining {
            return Err(WriteError::Capacity { needed, remaining });
        }
        self.buffer.put_frame(frame);
        self.ack_eliciting |= frame.is_ack_eliciting();
        self.frames.push(frame.clone());
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn finalize(self) -> WrittenPacket {
        WrittenPacket {
            epoch: self.epoch,
            pn: self.pn,
            bytes: self.buffer.freeze(),
            frames: self.frames,
            ack_eliciting: self.ack_eliciting,
        }
    }
}
