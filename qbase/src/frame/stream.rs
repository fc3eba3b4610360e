use std::ops::Range;

use super::BeFrame;
use crate::{
    sid::{StreamId, WriteStreamId, be_streamid},
    varint::{VARINT_MAX, VarInt, WriteVarInt, be_varint},
};

/// STREAM frame.
///
/// ```text
/// STREAM Frame {
///   Type (i) = 0x08..0x0f,
///   Stream ID (i),
///   [Offset (i)],
///   [Length (i)],
///   Stream Data (..),
/// }
/// ```
///
/// The OFF bit is derived from the offset when writing, so only the LEN and FIN
/// bits are kept in the frame.
///
/// See [STREAM Frames](https://www.rfc-editor.org/rfc/rfc9000.html#name-stream-frames)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFrame {
    id: StreamId,
    offset: VarInt,
    length: usize,
    flag: u8,
}

const STREAM_FRAME_TYPE: u8 = 0x08;

const OFF_BIT: u8 = 0x04;
const LEN_BIT: u8 = 0x02;
const FIN_BIT: u8 = 0x01;

/// The maximum encoding size of a STREAM frame header, excluding the data.
pub const STREAM_FRAME_MAX_ENCODING_SIZE: usize = 1 + 8 + 8 + 8;

impl BeFrame for StreamFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::Stream(self.type_bits())
    }

    fn max_encoding_size(&self) -> usize {
        STREAM_FRAME_MAX_ENCODING_SIZE + self.length
    }

    fn encoding_size(&self) -> usize {
        1 + self.id.encoding_size()
            + if self.offset.into_inner() != 0 {
                self.offset.encoding_size()
            } else {
                0
            }
            + if self.flag & LEN_BIT != 0 {
                VarInt(self.length as u64).encoding_size()
            } else {
                0
            }
            + self.length
    }
}

impl StreamFrame {
    /// Create a STREAM frame for `length` bytes at `offset` of stream `id`.
    ///
    /// Frames built locally always carry the Length field, so that other frames
    /// may follow them in the same packet.
    ///
    /// # Panics
    ///
    /// Panics if the end of the data exceeds 2^62-1.
    pub fn new(id: StreamId, offset: u64, length: usize) -> Self {
        assert!(offset.saturating_add(length as u64) <= VARINT_MAX);
        Self {
            id,
            offset: VarInt(offset),
            length,
            flag: LEN_BIT,
        }
    }

    /// Return the stream ID of the frame.
    pub fn stream_id(&self) -> StreamId {
        self.id
    }

    /// Return the offset of the data in the stream.
    pub fn offset(&self) -> u64 {
        self.offset.into_inner()
    }

    /// Return the length of the stream data.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the frame carries the last byte of the stream.
    pub fn is_fin(&self) -> bool {
        self.flag & FIN_BIT != 0
    }

    /// Return the range of the stream the data occupies.
    pub fn range(&self) -> Range<u64> {
        self.offset()..self.offset() + self.length as u64
    }

    pub fn set_eos_flag(&mut self, is_eos: bool) {
        if is_eos {
            self.flag |= FIN_BIT;
        } else {
            self.flag &= !FIN_BIT;
        }
    }

    /// Estimate how much stream data fits in `capacity` bytes,
    /// with the given stream ID and offset.
    pub fn estimate_max_capacity(capacity: usize, sid: StreamId, offset: u64) -> Option<usize> {
        assert!(offset <= VARINT_MAX);
        let mut least = 1 + sid.encoding_size() + VarInt(capacity as u64).encoding_size();
        if offset != 0 {
            least += VarInt(offset).encoding_size();
        }
        capacity.checked_sub(least)
    }

    fn type_bits(&self) -> u8 {
        if self.offset.into_inner() != 0 {
            self.flag | OFF_BIT
        } else {
            self.flag
        }
    }
}

/// Return a parser for a STREAM frame header with the given flag bits,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// Without the LEN bit the data extends to the end of the packet.
pub fn stream_frame_with_flag(flag: u8) -> impl Fn(&[u8]) -> nom::IResult<&[u8], StreamFrame> {
    move |input| {
        let (remain, id) = be_streamid(input)?;
        let (remain, offset) = if flag & OFF_BIT != 0 {
            be_varint(remain)?
        } else {
            (remain, VarInt::default())
        };
        let (remain, length) = if flag & LEN_BIT != 0 {
            let (remain, length) = be_varint(remain)?;
            (remain, length.into_inner() as usize)
        } else {
            (remain, remain.len())
        };
        if offset.into_inner() + length as u64 > VARINT_MAX {
            return Err(nom::Err::Error(nom::error::make_error(
                input,
                nom::error::ErrorKind::TooLarge,
            )));
        }
        Ok((
            remain,
            StreamFrame {
                id,
                offset,
                length,
                flag: flag & (LEN_BIT | FIN_BIT),
            },
        ))
    }
}

impl<T: bytes::BufMut> super::io::WriteDataFrame<StreamFrame> for T {
    fn put_data_frame(&mut self, frame: &StreamFrame, data: &[u8]) {
        assert_eq!(frame.length, data.len());
        self.put_u8(STREAM_FRAME_TYPE | frame.type_bits());
        self.put_streamid(&frame.id);
        if frame.offset.into_inner() != 0 {
            self.put_varint(&frame.offset);
        }
        if frame.flag & LEN_BIT != 0 {
            self.put_varint(&VarInt(frame.length as u64));
        }
        self.put_slice(data);
    }
}
