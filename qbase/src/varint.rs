use std::{cmp::Ordering, convert::TryFrom, fmt};

use bytes::{Buf, BufMut};
use nom::{IResult, Parser, bits::streaming::take, combinator::flat_map, error::Error};

/// An integer less than 2^62
///
/// Values of this type are suitable for encoding as QUIC variable-length integer.
/// The two most significant bits of the first encoded byte carry the length class,
/// the remaining bits carry the value in network byte order.
///
/// See [variable-length integers](https://www.rfc-editor.org/rfc/rfc9000.html#name-variable-length-integer-enc)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarInt(pub(crate) u64);

/// The maximum value that can be represented by a QUIC variable-length integer.
pub const VARINT_MAX: u64 = 0x3fff_ffff_ffff_ffff;

/// The length classes a [`VarInt`] can be encoded in.
///
/// [`VarInt`] doesn't need to be encoded on the minimum number of bytes necessary,
/// with the sole exception of the Frame Type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeBytes {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl EncodeBytes {
    fn tag(self) -> u64 {
        match self {
            EncodeBytes::One => 0b00,
            EncodeBytes::Two => 0b01,
            EncodeBytes::Four => 0b10,
            EncodeBytes::Eight => 0b11,
        }
    }

    fn limit(self) -> u64 {
        1u64 << (self as usize * 8 - 2)
    }
}

impl VarInt {
    /// The largest representable value
    pub const MAX: Self = Self(VARINT_MAX);
    /// The largest encoded value length
    pub const MAX_SIZE: usize = 8;

    /// Construct a `VarInt` from a [`u32`].
    pub const fn from_u32(x: u32) -> Self {
        Self(x as u64)
    }

    /// Construct a `VarInt` from a [`u64`].
    /// Succeeds if `x` < 2^62.
    pub fn from_u64(x: u64) -> Result<Self, err::Overflow> {
        if x <= VARINT_MAX {
            Ok(Self(x))
        } else {
            Err(err::Overflow(x))
        }
    }

    /// Construct a `VarInt` from a [`u128`], used for durations in milliseconds.
    pub fn from_u128(x: u128) -> Result<Self, err::Overflow> {
        u64::try_from(x)
            .map_err(|_| err::Overflow(u64::MAX))
            .and_then(Self::from_u64)
    }

    /// Extract the integer value
    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// Compute the number of bytes needed to encode this value
    pub const fn encoding_size(self) -> usize {
        let x = self.0;
        if x < (1 << 6) {
            1
        } else if x < (1 << 14) {
            2
        } else if x < (1 << 30) {
            4
        } else {
            8
        }
    }
}

impl From<VarInt> for u64 {
    fn from(x: VarInt) -> Self {
        x.0
    }
}

impl From<u8> for VarInt {
    fn from(x: u8) -> Self {
        Self(x.into())
    }
}

impl From<u16> for VarInt {
    fn from(x: u16) -> Self {
        Self(x.into())
    }
}

impl From<u32> for VarInt {
    fn from(x: u32) -> Self {
        Self(x.into())
    }
}

impl TryFrom<u64> for VarInt {
    type Error = err::Overflow;

    /// Succeeds if `x` < 2^62
    fn try_from(x: u64) -> Result<Self, Self::Error> {
        Self::from_u64(x)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = err::Overflow;

    /// Succeeds if `x` < 2^62
    fn try_from(x: usize) -> Result<Self, Self::Error> {
        Self::try_from(x as u64)
    }
}

impl nom::ToUsize for VarInt {
    fn to_usize(&self) -> usize {
        self.0 as usize
    }
}

impl PartialEq<u64> for VarInt {
    fn eq(&self, other: &u64) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<u64> for VarInt {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error module for VarInt
pub mod err {
    use thiserror::Error;

    /// Overflow error indicating that a value exceeds 2^62 - 1
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
    #[error("value({0}) too large for varint encoding")]
    pub struct Overflow(pub(crate) u64);

    impl Overflow {
        /// The value which could not be encoded.
        pub fn value(&self) -> u64 {
            self.0
        }
    }

    /// The input ended, or the caller's byte budget ran out, before the whole
    /// variable-length integer could be read.
    ///
    /// Nothing was consumed from the input when this is returned.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
    #[error("incomplete varint: need {needed} bytes, {available} available")]
    pub struct Incomplete {
        pub needed: usize,
        pub available: usize,
    }
}

/// Return the number of bytes `value` would be encoded in, without writing it.
///
/// Fails if `value` does not fit in 62 bits.
pub fn encoding_size(value: u64) -> Result<usize, err::Overflow> {
    VarInt::from_u64(value).map(VarInt::encoding_size)
}

/// Encode `value` in its smallest length class into `buf`, returning the
/// number of bytes written.
///
/// Fails without writing anything if `value` does not fit in 62 bits.
pub fn encode(value: u64, buf: &mut impl BufMut) -> Result<usize, err::Overflow> {
    let varint = VarInt::from_u64(value)?;
    buf.put_varint(&varint);
    Ok(varint.encoding_size())
}

/// Parse a variable-length integer from the input buffer,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
///
/// ## Example
/// ```
/// use qbase::varint::be_varint;
///
/// let input = &[0b01000000, 0x01][..];
/// let result = be_varint(input);
/// assert_eq!(result, Ok((&[][..], 1u32.into())));
/// ```
pub fn be_varint(input: &[u8]) -> IResult<&[u8], VarInt> {
    flat_map(take(2usize), |prefix: u8| {
        take::<&[u8], u64, usize, Error<(&[u8], usize)>>((8 << prefix) - 2)
    })
    .parse((input, 0))
    .map_err(|err| match err {
        nom::Err::Incomplete(needed) => {
            nom::Err::Incomplete(needed.map(|n| n.get().div_ceil(8) - input.len()))
        }
        _ => unreachable!(),
    })
    .map(|((buf, _), value)| (buf, VarInt(value)))
}

/// A [`bytes::Buf`] extension trait, reads a VarInt from a cursor that may span
/// several chunks.
///
/// The length class is determined by peeking the first byte. If fewer bytes than
/// the length class are available, either in the buffer or within the `at_most`
/// budget, an [`err::Incomplete`] is returned and the cursor stays untouched.
///
/// ```
/// use qbase::varint::{ReadVarInt, VarInt};
///
/// let mut buf: &[u8] = &[0x7b, 0xbd, 0xff];
/// assert!(buf.try_get_varint_within(1).is_err());
/// assert_eq!(buf.len(), 3);
/// assert_eq!(buf.try_get_varint(), Ok((VarInt::from_u32(15293), 2)));
/// assert_eq!(buf, &[0xff][..]);
/// ```
pub trait ReadVarInt: Buf {
    /// Read a variable-length integer, returning it with the number of bytes consumed.
    fn try_get_varint(&mut self) -> Result<(VarInt, usize), err::Incomplete> {
        self.try_get_varint_within(usize::MAX)
    }

    /// Read a variable-length integer which must be encoded within `at_most` bytes.
    fn try_get_varint_within(&mut self, at_most: usize) -> Result<(VarInt, usize), err::Incomplete>;
}

impl<T: Buf> ReadVarInt for T {
    fn try_get_varint_within(&mut self, at_most: usize) -> Result<(VarInt, usize), err::Incomplete> {
        let available = self.remaining().min(at_most);
        if available == 0 {
            return Err(err::Incomplete {
                needed: 1,
                available,
            });
        }
        let len = 1usize << (self.chunk()[0] >> 6);
        if available < len {
            return Err(err::Incomplete {
                needed: len,
                available,
            });
        }

        let mut raw = [0u8; VarInt::MAX_SIZE];
        self.copy_to_slice(&mut raw[..len]);
        raw[0] &= 0x3f;
        let value = raw[..len]
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | *byte as u64);
        Ok((VarInt(value), len))
    }
}

/// A [`bytes::BufMut`] extension trait, makes buffer more friendly to write VarInt.
pub trait WriteVarInt: BufMut {
    /// Write a variable-length integer.
    ///
    /// `put_varint` will write the smallest number of bytes needed to represent the value.
    /// `encode_varint` will write the specified number of bytes, and panic if the specified number of bytes
    /// is less than the smallest number of bytes needed to repressent the value.
    ///
    /// # Example
    /// ```rust
    /// use qbase::varint::{EncodeBytes, VarInt, WriteVarInt};
    ///
    /// let val = VarInt::from_u32(1);
    /// let mut encode_buf = [0u8; 8];
    ///
    /// let mut buf = &mut encode_buf[..];
    /// buf.put_varint(&val);
    /// assert_eq!(buf.len(), 7);
    /// assert_eq!(encode_buf[0..1], [0x01]);
    ///
    /// let mut buf = &mut encode_buf[..];
    /// buf.encode_varint(&val, EncodeBytes::Two);
    /// assert_eq!(buf.len(), 6);
    /// assert_eq!(encode_buf[0..2], [0x40, 0x01]);
    /// ```
    fn put_varint(&mut self, value: &VarInt);

    /// Write a variable-length integer with specified number of bytes.
    fn encode_varint(&mut self, value: &VarInt, nbytes: EncodeBytes);
}

impl<T: BufMut> WriteVarInt for T {
    fn put_varint(&mut self, value: &VarInt) {
        let nbytes = match value.encoding_size() {
            1 => EncodeBytes::One,
            2 => EncodeBytes::Two,
            4 => EncodeBytes::Four,
            _ => EncodeBytes::Eight,
        };
        self.encode_varint(value, nbytes);
    }

    fn encode_varint(&mut self, value: &VarInt, nbytes: EncodeBytes) {
        assert!(
            value.0 < nbytes.limit(),
            "{value} does not fit in {} bytes",
            nbytes as usize
        );
        let tagged = (nbytes.tag() << (nbytes as usize * 8 - 2)) | value.0;
        self.put_uint(tagged, nbytes as usize);
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Buf, Bytes};

    use super::*;

    fn unhex(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }

    // (decoded, hex, encoded length)
    const DECODE_VECTORS: &[(u64, &str, usize)] = &[
        (151288809941952652, "c2197c5eff14e88c", 8),
        (494878333, "9d7f3e7d", 4),
        (15293, "7bbd", 2),
        (37, "25", 1),
        (37, "4025", 2),
        (37, "80000025", 4),
        (37, "C000000000000025", 8),
    ];

    const ENCODE_VECTORS: &[(u64, &str)] = &[
        (151288809941952652, "c2197c5eff14e88c"),
        (494878333, "9d7f3e7d"),
        (15293, "7bbd"),
        (37, "25"),
    ];

    #[test]
    fn test_be_varint() {
        {
            let buf = &[0b00000001u8, 0x01][..];
            let r = be_varint(buf);
            assert_eq!(r, Ok((&[0x01][..], VarInt(1))));
        }
        {
            let buf = &[0b01000000u8, 0x06u8][..];
            let r = be_varint(buf);
            assert_eq!(r, Ok((&[][..], VarInt(6))));
        }
        {
            let buf = &[0b10000000u8, 1, 1, 1][..];
            let r = be_varint(buf);
            assert_eq!(r, Ok((&[][..], VarInt(0x010101))));
        }
        {
            let buf = &[0b11000000u8, 1, 1, 1, 1, 1, 1, 1][..];
            let r = be_varint(buf);
            assert_eq!(r, Ok((&[][..], VarInt(0x01010101010101))));
        }
        {
            let buf = &[0b11000000u8, 0x06u8][..];
            let r = be_varint(buf);
            assert_eq!(r, Err(nom::Err::Incomplete(nom::Needed::new(6))));
        }
        {
            assert_eq!(be_varint(&[]), Err(nom::Err::Incomplete(nom::Needed::new(1))));
            let buf = &[0b10000000u8, 1][..];
            assert_eq!(be_varint(buf), Err(nom::Err::Incomplete(nom::Needed::new(2))));
        }
    }

    #[test]
    fn test_decode_vectors() {
        for &(decoded, hex, len) in DECODE_VECTORS {
            let raw = unhex(hex);
            let mut cursor = &raw[..];
            assert_eq!(cursor.try_get_varint(), Ok((VarInt(decoded), len)), "{hex}");
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn test_decode_truncated_leaves_cursor() {
        for &(_, hex, len) in DECODE_VECTORS {
            let raw = unhex(hex);
            for keep in 0..len {
                let mut cursor = &raw[..keep];
                let err = cursor.try_get_varint().unwrap_err();
                assert_eq!(err.available, keep);
                assert_eq!(cursor.len(), keep, "{hex} truncated to {keep}");
            }
        }

        let raw = unhex("40");
        let mut cursor = &raw[..];
        assert!(cursor.try_get_varint().is_err());
        assert_eq!(cursor.len(), 1);
    }

    #[test]
    fn test_decode_at_most() {
        for &(decoded, hex, len) in DECODE_VECTORS {
            let raw = unhex(hex);
            for at_most in 0..=len {
                let mut cursor = &raw[..];
                let result = cursor.try_get_varint_within(at_most);
                if at_most == len {
                    assert_eq!(result, Ok((VarInt(decoded), len)));
                    assert!(cursor.is_empty());
                } else {
                    assert!(result.is_err(), "{hex} within {at_most}");
                    assert_eq!(cursor.len(), len);
                }
            }
        }
    }

    #[test]
    fn test_decode_across_chunks() {
        let raw = unhex("c2197c5eff14e88c");
        let mut chained = Bytes::copy_from_slice(&raw[..3]).chain(Bytes::copy_from_slice(&raw[3..]));
        assert_eq!(
            chained.try_get_varint(),
            Ok((VarInt(151288809941952652), 8))
        );
        assert!(!chained.has_remaining());
    }

    #[test]
    fn test_encode_vectors() {
        for &(value, hex) in ENCODE_VECTORS {
            let mut buf = vec![];
            let written = encode(value, &mut buf).unwrap();
            assert_eq!(buf, unhex(hex));
            assert_eq!(written, buf.len());
            assert_eq!(encoding_size(value), Ok(written));
        }
    }

    #[test]
    fn test_encode_overflow() {
        let mut buf = vec![];
        assert_eq!(encode(u64::MAX, &mut buf), Err(err::Overflow(u64::MAX)));
        assert!(buf.is_empty());
        assert_eq!(encoding_size(u64::MAX), Err(err::Overflow(u64::MAX)));
        assert_eq!(encoding_size(VARINT_MAX + 1), Err(err::Overflow(VARINT_MAX + 1)));
        assert_eq!(encoding_size(VARINT_MAX), Ok(8));
    }

    #[test]
    fn test_round_trip_boundaries() {
        let boundaries = [
            0,
            (1 << 6) - 1,
            1 << 6,
            (1 << 14) - 1,
            1 << 14,
            (1 << 30) - 1,
            1 << 30,
            VARINT_MAX,
        ];
        for value in boundaries {
            let mut buf = vec![];
            let len = encode(value, &mut buf).unwrap();
            let mut cursor = &buf[..];
            assert_eq!(cursor.try_get_varint(), Ok((VarInt(value), len)));
            assert_eq!(encoding_size(value), Ok(len));
        }
    }

    #[test]
    fn test_encode_oversized() {
        let val = VarInt::from_u32(37);
        for (nbytes, hex) in [
            (EncodeBytes::Two, "4025"),
            (EncodeBytes::Four, "80000025"),
            (EncodeBytes::Eight, "c000000000000025"),
        ] {
            let mut buf = vec![];
            buf.encode_varint(&val, nbytes);
            assert_eq!(buf, unhex(hex));
        }
    }

    #[test]
    #[should_panic]
    fn test_encode_too_short() {
        let mut buf = vec![];
        buf.encode_varint(&VarInt::from_u32(64), EncodeBytes::One);
    }
}
