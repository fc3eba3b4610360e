use std::ops::Range;

use crate::varint::{VARINT_MAX, VarInt, WriteVarInt, be_varint};

/// CRYPTO frame.
///
/// ```text
/// CRYPTO Frame {
///   Type (i) = 0x06,
///   Offset (i),
///   Length (i),
///   Crypto Data (..),
/// }
/// ```
///
/// See [CRYPTO Frames](https://www.rfc-editor.org/rfc/rfc9000.html#name-crypto-frames)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoFrame {
    offset: VarInt,
    length: VarInt,
}

const CRYPTO_FRAME_TYPE: u8 = 0x06;

impl super::BeFrame for CryptoFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::Crypto
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + self.length.into_inner() as usize
    }

    fn encoding_size(&self) -> usize {
        1 + self.offset.encoding_size()
            + self.length.encoding_size()
            + self.length.into_inner() as usize
    }
}

impl CryptoFrame {
    /// Create a new [`CryptoFrame`] describing `length` bytes at `offset` of the crypto stream.
    ///
    /// # Panics
    ///
    /// Panics if the end of the data exceeds 2^62-1.
    pub fn new(offset: u64, length: u64) -> Self {
        assert!(offset.saturating_add(length) <= VARINT_MAX);
        Self {
            offset: VarInt(offset),
            length: VarInt(length),
        }
    }

    /// Return the offset of the data in the crypto stream.
    pub fn offset(&self) -> u64 {
        self.offset.into_inner()
    }

    /// Return the length of the crypto data.
    pub fn len(&self) -> u64 {
        self.length.into_inner()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the range of the crypto stream the data occupies.
    pub fn range(&self) -> Range<u64> {
        self.offset()..self.offset() + self.len()
    }

    /// Estimate how much crypto data fits in `capacity` bytes with this `offset`.
    pub fn estimate_max_capacity(capacity: usize, offset: u64) -> Option<usize> {
        let head = 1 + VarInt(offset).encoding_size();
        // the Length field can't take more bytes than the capacity needs
        let len_size = VarInt(capacity as u64).encoding_size();
        capacity
            .checked_sub(head + len_size)
            .filter(|&capacity| capacity > 0)
    }
}

/// Parse a CRYPTO frame header from the input buffer,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_crypto_frame(input: &[u8]) -> nom::IResult<&[u8], CryptoFrame> {
    let (remain, offset) = be_varint(input)?;
    let (remain, length) = be_varint(remain)?;
    if offset.into_inner() + length.into_inner() > VARINT_MAX {
        return Err(nom::Err::Error(nom::error::make_error(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    Ok((remain, CryptoFrame { offset, length }))
}

impl<T: bytes::BufMut> super::io::WriteDataFrame<CryptoFrame> for T {
    fn put_data_frame(&mut self, frame: &CryptoFrame, data: &[u8]) {
        assert_eq!(frame.len(), data.len() as u64);
        self.put_u8(CRYPTO_FRAME_TYPE);
        self.put_varint(&frame.offset);
        self.put_varint(&frame.length);
        self.put_slice(data);
    }
}
