//! An implementation of the receiving buffer for stream data.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Received data of a stream is stored in [`RecvBuf`].
///
/// Fragments may arrive out of order and overlap, they are stored by offset
/// without overlapping: bytes already present are never applied twice. The
/// application reads the continuous data from the front.
#[derive(Default, Debug)]
pub struct RecvBuf {
    nread: u64,
    largest_offset: u64,
    // The first segment starts at or after nread, segments never overlap.
    segments: BTreeMap<u64, Bytes>,
}

impl RecvBuf {
    /// Returns whether no unread data is buffered.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns how many continuous data have been read.
    pub fn nread(&self) -> u64 {
        self.nread
    }

    /// Returns the largest offset received.
    pub fn largest_offset(&self) -> u64 {
        self.largest_offset
    }

    /// Receive a fragment of data, return the new data's size.
    ///
    /// ```
    /// use bytes::Bytes;
    /// use qrecovery::recv::RecvBuf;
    ///
    /// let mut recvbuf = RecvBuf::default();
    /// // data:    "hello, world!"
    /// assert_eq!(recvbuf.recv(0, Bytes::from("hell")), 4);
    /// assert_eq!(recvbuf.recv(7, Bytes::from("world")), 5);
    /// // recvbuf: "hell" "world"
    /// assert_eq!(recvbuf.recv(3, Bytes::from("lo, ")), 3);
    /// // new:         "o, "
    /// assert_eq!(recvbuf.recv(7, Bytes::from("world!")), 1);
    /// // new:                 "!"
    /// assert_eq!(&recvbuf.read(usize::MAX)[..], b"hello, world!");
    /// ```
    pub fn recv(&mut self, offset: u64, mut data: Bytes) -> u64 {
        let end = offset + data.len() as u64;
        self.largest_offset = self.largest_offset.max(end);

        // Data already read is dropped.
        let mut start = offset.max(self.nread);
        if start >= end {
            return 0;
        }
        data.advance((start - offset) as usize);

        let mut fresh = 0;
        while start < end {
            if let Some((&seg_offset, seg)) = self.segments.range(..=start).next_back() {
                let seg_end = seg_offset + seg.len() as u64;
                if seg_end > start {
                    let covered = seg_end.min(end) - start;
                    data.advance(covered as usize);
                    start += covered;
                    continue;
                }
            }
            let gap_end = self
                .segments
                .range(start..)
                .next()
                .map_or(end, |(&next_offset, _)| next_offset.min(end));
            let piece = data.split_to((gap_end - start) as usize);
            fresh += piece.len() as u64;
            self.segments.insert(start, piece);
            start = gap_end;
        }
        fresh
    }

    /// The end of the continuous data from the beginning of the stream.
    pub fn contiguous_end(&self) -> u64 {
        let mut end = self.nread;
        for (&offset, seg) in &self.segments {
            if offset != end {
                break;
            }
            end += seg.len() as u64;
        }
        end
    }

    /// Returns the length of continuous unread data.
    pub fn available(&self) -> u64 {
        self.contiguous_end() - self.nread
    }

    /// Try to read continuous data into `dst`, returns how much was read.
    pub fn try_read(&mut self, dst: &mut impl BufMut) -> usize {
        let origin = dst.remaining_mut();
        while dst.has_remaining_mut() {
            let Some(mut entry) = self.segments.first_entry() else {
                break;
            };
            if *entry.key() != self.nread {
                break;
            }
            let read = dst.remaining_mut().min(entry.get().len());
            dst.put(entry.get_mut().split_to(read));
            self.nread += read as u64;
            let rest = entry.remove();
            if !rest.is_empty() {
                self.segments.insert(self.nread, rest);
            }
        }
        origin - dst.remaining_mut()
    }

    /// Read at most `max` bytes of continuous data.
    pub fn read(&mut self, max: usize) -> Bytes {
        let mut dst = BytesMut::new().limit(max);
        self.try_read(&mut dst);
        dst.into_inner().freeze()
    }

    /// Drop all the unread data, the stream has been reset.
    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recvbuf_recv() {
        let mut buf = RecvBuf::default();
        assert_eq!(buf.recv(0, Bytes::from("hello")), 5);
        assert_eq!(buf.recv(6, Bytes::from("world")), 5);
        assert_eq!(buf.segments.len(), 2);
        assert_eq!(buf.available(), 5);

        assert_eq!(buf.recv(5, Bytes::from(" ")), 1);
        assert_eq!(buf.segments.keys().copied().collect::<Vec<_>>(), [0, 5, 6]);
        assert_eq!(buf.available(), 11);

        assert_eq!(buf.recv(12, Bytes::from("hello")), 5);
        assert_eq!(buf.recv(6, Bytes::from("world.hell")), 1);
        assert_eq!(buf.largest_offset(), 17);
        assert_eq!(buf.contiguous_end(), 17);
    }

    #[test]
    fn test_overlap() {
        let mut buf = RecvBuf::default();
        assert_eq!(buf.recv(2, Bytes::from("4514")), 4);
        assert_eq!(buf.recv(0, Bytes::from("1199")), 2);
        assert_eq!(buf.available(), 6);
        assert_eq!(&buf.read(usize::MAX)[..], b"114514");
    }

    #[test]
    fn test_covered() {
        let mut buf = RecvBuf::default();
        assert_eq!(buf.recv(0, Bytes::from("114514")), 6);
        assert_eq!(buf.recv(2, Bytes::from("45")), 0);
        assert_eq!(buf.segments.len(), 1);

        let mut buf = RecvBuf::default();
        assert_eq!(buf.recv(2, Bytes::from("45")), 2);
        assert_eq!(buf.recv(0, Bytes::from("114514")), 4);
        assert_eq!(buf.segments.keys().copied().collect::<Vec<_>>(), [0, 2, 4]);
        assert_eq!(&buf.read(usize::MAX)[..], b"114514");
    }

    #[test]
    fn test_recv_across_gaps() {
        let mut buf = RecvBuf::default();
        assert_eq!(buf.recv(0, Bytes::from("he")), 2);
        assert_eq!(buf.recv(6, Bytes::from("wo")), 2);
        assert_eq!(buf.recv(12, Bytes::from("00")), 2);
        assert_eq!(buf.recv(0, Bytes::from("hello world")), 7);
        assert_eq!(buf.available(), 11);
        assert_eq!(buf.contiguous_end(), 11);
    }

    #[test]
    fn test_read_partially() {
        let mut buf = RecvBuf::default();
        buf.recv(0, Bytes::from("hello"));
        buf.recv(6, Bytes::from("world"));

        assert_eq!(&buf.read(3)[..], b"hel");
        assert_eq!(buf.nread(), 3);
        assert_eq!(&buf.read(10)[..], b"lo");
        assert!(buf.read(10).is_empty());

        // Data before nread is ignored.
        assert_eq!(buf.recv(0, Bytes::from("hello ")), 1);
        let mut dst = Vec::new();
        assert_eq!(buf.try_read(&mut dst), 6);
        assert_eq!(dst, b" world");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut buf = RecvBuf::default();
        buf.recv(3, Bytes::from("lo"));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.largest_offset(), 5);
        assert_eq!(buf.available(), 0);
    }
}
