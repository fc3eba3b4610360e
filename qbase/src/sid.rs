use std::fmt;

use crate::{
    role::Role,
    varint::{VarInt, WriteVarInt, be_varint},
};

/// Sum type for stream directions.
///
/// Streams can be unidirectional or bidirectional.
/// Unidirectional streams carry data in one direction: from the initiator of the stream to its peer.
/// Bidirectional streams allow for data to be sent in both directions.
/// See [section-2.1-1](https://www.rfc-editor.org/rfc/rfc9000.html#section-2.1-1)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html).
///
/// The second least significant bit (0x02) of the [`StreamId`] distinguishes between
/// bidirectional streams (with the bit set to 0) and unidirectional streams (with the bit set to 1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Dir {
    /// Data flows in both directions
    Bi = 0,
    /// Data flows only from the stream's initiator
    Uni = 1,
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match *self {
            Self::Bi => "bidirectional",
            Self::Uni => "unidirectional",
        })
    }
}

/// Streams are identified within a connection by a numeric value,
/// referred to as the stream ID.
///
/// A stream ID is a 62-bit integer (0 to 2^62-1) that is unique for all streams on a connection,
/// encoded as a [`VarInt`]. Once assigned it never changes.
///
/// There are four types of streams in QUIC, divided according to the role and direction of the stream.
/// See [Stream ID Types](https://www.rfc-editor.org/rfc/rfc9000.html#name-stream-id-types)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StreamId(u64);

/// Maximum ID for each type of stream.
///
/// After removing the lowest 2 bits for direction and role,
/// the remaining 60 bits are used to represent the actual ID for each type of stream.
pub const MAX_STREAMS_LIMIT: u64 = (1 << 60) - 1;

impl StreamId {
    /// Create a new stream ID with the given role, direction, and sequence within that type.
    ///
    /// # Panics
    ///
    /// Panics if `id` exceeds [`MAX_STREAMS_LIMIT`].
    pub fn new(role: Role, dir: Dir, id: u64) -> Self {
        assert!(id <= MAX_STREAMS_LIMIT);
        Self((((id << 1) | (dir as u64)) << 1) | (role as u64))
    }

    /// Returns the role which initiated this stream.
    pub fn role(&self) -> Role {
        if self.0 & 0x1 == 0 {
            Role::Client
        } else {
            Role::Server
        }
    }

    /// Returns the direction of this stream.
    pub fn dir(&self) -> Dir {
        if self.0 & 0x2 == 0 { Dir::Bi } else { Dir::Uni }
    }

    /// Returns the sequence of this stream among the streams of the same type.
    pub fn id(&self) -> u64 {
        self.0 >> 2
    }

    pub fn is_bidirectional(&self) -> bool {
        self.dir() == Dir::Bi
    }

    /// Whether an endpoint playing `local` may send data on this stream.
    ///
    /// A unidirectional stream can only be sent on by its initiator.
    ///
    /// ```
    /// use qbase::{role::Role, sid::{Dir, StreamId}};
    ///
    /// let sid = StreamId::new(Role::Client, Dir::Uni, 0);
    /// assert!(sid.can_send(Role::Client));
    /// assert!(!sid.can_send(Role::Server));
    /// assert!(sid.can_recv(Role::Server));
    /// ```
    pub fn can_send(&self, local: Role) -> bool {
        self.is_bidirectional() || self.role() == local
    }

    /// Whether an endpoint playing `local` may receive data on this stream.
    pub fn can_recv(&self, local: Role) -> bool {
        self.is_bidirectional() || self.role() != local
    }

    /// Returns the number of bytes needed to encode this stream ID.
    pub fn encoding_size(&self) -> usize {
        VarInt(self.0).encoding_size()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.role(), self.dir(), self.id())
    }
}

impl From<VarInt> for StreamId {
    fn from(v: VarInt) -> Self {
        Self(v.into_inner())
    }
}

impl From<StreamId> for VarInt {
    fn from(s: StreamId) -> Self {
        VarInt(s.0)
    }
}

impl From<StreamId> for u64 {
    fn from(s: StreamId) -> Self {
        s.0
    }
}

/// Parse a stream ID from the input buffer,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_streamid(input: &[u8]) -> nom::IResult<&[u8], StreamId> {
    use nom::{Parser, combinator::map};
    map(be_varint, StreamId::from).parse(input)
}

/// A [`bytes::BufMut`] extension trait, makes buffer more friendly to write stream ID.
pub trait WriteStreamId: bytes::BufMut {
    /// Write a stream ID to the buffer.
    fn put_streamid(&mut self, stream_id: &StreamId);
}

impl<T: bytes::BufMut> WriteStreamId for T {
    fn put_streamid(&mut self, stream_id: &StreamId) {
        self.put_varint(&(*stream_id).into());
    }
}
