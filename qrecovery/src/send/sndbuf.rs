//! An implementation of the sending buffer for stream data.

use std::collections::{BTreeMap, VecDeque};

use bytes::{BufMut, Bytes, BytesMut};

/// A contiguous chunk of stream data that has been sent at least once.
///
/// Only the last chunk of a finished stream carries `fin`, it may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBuffer {
    pub offset: u64,
    pub data: Bytes,
    pub fin: bool,
}

impl StreamBuffer {
    pub fn new(offset: u64, data: Bytes, fin: bool) -> Self {
        Self { offset, data, fin }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Data written by the application to a stream is stored in [`SendBuf`].
///
/// Three areas are kept:
/// - the pending bytes, written but never sent;
/// - the retransmission buffer, chunks in flight ordered by offset;
/// - the loss buffer, chunks whose packet was declared lost, sent again before
///   any fresh data.
///
/// The chunks of the retransmission buffer and the loss buffer never overlap:
/// every byte is in exactly one of the three areas until it is acknowledged.
#[derive(Default, Debug)]
pub struct SendBuf {
    pending: VecDeque<Bytes>,
    written: u64,
    sent: u64,
    fin: bool,
    fin_sent: bool,
    inflight: Vec<StreamBuffer>,
    lost: BTreeMap<u64, StreamBuffer>,
}

impl SendBuf {
    /// Append data to the end of the stream.
    ///
    /// # Panics
    ///
    /// Panics if the stream has been finished.
    pub fn write(&mut self, data: Bytes) {
        assert!(!self.fin, "write after finish");
        if data.is_empty() {
            return;
        }
        self.written += data.len() as u64;
        self.pending.push_back(data);
    }

    /// Mark the end of the stream, no data can be written after.
    pub fn finish(&mut self) {
        self.fin = true;
    }

    pub fn is_finished(&self) -> bool {
        self.fin
    }

    /// Total bytes written by the application.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// The largest offset sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// The final size, once the stream is finished.
    pub fn final_size(&self) -> Option<u64> {
        self.fin.then_some(self.written)
    }

    /// Whether there is anything left to send, fresh data, lost data or a bare FIN.
    pub fn has_pending_data(&self) -> bool {
        !self.lost.is_empty() || !self.pending.is_empty() || (self.fin && !self.fin_sent)
    }

    /// Pick up the next chunk to send, at most `max_len` bytes.
    ///
    /// Lost chunks go first and are split to fit. Otherwise fresh data is picked,
    /// never beyond the offset `limit` granted by flow control. Returns the chunk
    /// and how many fresh bytes it carries, which is what flow control accounts.
    ///
    /// ```
    /// use bytes::Bytes;
    /// use qrecovery::send::SendBuf;
    ///
    /// let mut sndbuf = SendBuf::default();
    /// sndbuf.write(Bytes::from_static(b"hello world"));
    /// sndbuf.finish();
    ///
    /// let (chunk, fresh) = sndbuf.pick_up(5, 100).unwrap();
    /// assert_eq!((chunk.offset, &chunk.data[..], chunk.fin, fresh), (0, &b"hello"[..], false, 5));
    /// let (chunk, _) = sndbuf.pick_up(100, 100).unwrap();
    /// assert_eq!((chunk.offset, &chunk.data[..], chunk.fin), (5, &b" world"[..], true));
    /// assert!(sndbuf.pick_up(100, 100).is_none());
    /// ```
    pub fn pick_up(&mut self, max_len: usize, limit: u64) -> Option<(StreamBuffer, usize)> {
        if let Some(chunk) = self.pick_up_lost(max_len) {
            return Some((chunk, 0));
        }

        let allowance = (limit.saturating_sub(self.sent))
            .min(self.written - self.sent)
            .min(max_len as u64) as usize;
        if allowance == 0 && !(self.fin && !self.fin_sent && self.pending.is_empty()) {
            return None;
        }

        let data = self.take_pending(allowance);
        let fin = self.fin && self.pending.is_empty();
        let chunk = StreamBuffer::new(self.sent, data, fin);
        self.sent += allowance as u64;
        self.fin_sent |= fin;
        self.insert_inflight(chunk.clone());
        Some((chunk, allowance))
    }

    fn pick_up_lost(&mut self, max_len: usize) -> Option<StreamBuffer> {
        let mut entry = self.lost.first_entry()?;
        let chunk = entry.get_mut();
        if chunk.len() > max_len {
            if max_len == 0 {
                return None;
            }
            let head = StreamBuffer::new(chunk.offset, chunk.data.split_to(max_len), false);
            chunk.offset += max_len as u64;
            let rest = entry.remove();
            self.lost.insert(rest.offset, rest);
            self.insert_inflight(head.clone());
            return Some(head);
        }
        let chunk = entry.remove();
        self.insert_inflight(chunk.clone());
        Some(chunk)
    }

    fn take_pending(&mut self, mut len: usize) -> Bytes {
        // Zero-copy when the front chunk is enough.
        if let Some(front) = self.pending.front_mut() {
            if front.len() > len {
                return front.split_to(len);
            }
            if front.len() == len {
                return self.pending.pop_front().unwrap_or_default();
            }
        }
        let mut data = BytesMut::with_capacity(len);
        while len > 0 {
            let Some(front) = self.pending.front_mut() else {
                break;
            };
            let n = front.len().min(len);
            data.put(front.split_to(n));
            if front.is_empty() {
                self.pending.pop_front();
            }
            len -= n;
        }
        data.freeze()
    }

    fn insert_inflight(&mut self, chunk: StreamBuffer) {
        let index = self
            .inflight
            .partition_point(|inflight| inflight.offset < chunk.offset);
        self.inflight.insert(index, chunk);
    }

    /// The chunk at `offset` was acknowledged, returns whether it was still buffered.
    ///
    /// # Panics
    ///
    /// Panics if the buffered chunk at `offset` differs from the acknowledged one
    /// in length or FIN: the sent state is already inconsistent.
    pub fn on_acked(&mut self, offset: u64, len: usize, fin: bool) -> bool {
        let chunk = match self
            .inflight
            .binary_search_by_key(&offset, |chunk| chunk.offset)
        {
            Ok(index) => self.inflight.remove(index),
            Err(_) => match self.lost.remove(&offset) {
                Some(chunk) => chunk,
                None => return false,
            },
        };
        assert!(
            chunk.len() == len && chunk.fin == fin,
            "acked [{offset}, +{len}, fin={fin}] mismatches the buffered [{}, +{}, fin={}]",
            chunk.offset,
            chunk.len(),
            chunk.fin
        );
        true
    }

    /// The packet carrying the chunk at `offset` was lost, the chunk must be sent again.
    pub fn on_lost(&mut self, offset: u64) {
        if let Ok(index) = self
            .inflight
            .binary_search_by_key(&offset, |chunk| chunk.offset)
        {
            let chunk = self.inflight.remove(index);
            self.lost.insert(chunk.offset, chunk);
        }
    }

    /// The chunk in flight at `offset`, if it still waits for an acknowledgment.
    pub fn retransmittable(&self, offset: u64) -> Option<&StreamBuffer> {
        self.inflight
            .binary_search_by_key(&offset, |chunk| chunk.offset)
            .ok()
            .map(|index| &self.inflight[index])
    }

    /// Whether every byte up to and including the FIN has been acknowledged.
    pub fn all_bytes_till_fin_acked(&self) -> bool {
        self.fin_sent && self.pending.is_empty() && self.inflight.is_empty() && self.lost.is_empty()
    }

    /// Give up all the data, for a reset. Returns the final size to reset with,
    /// the largest offset sent.
    pub fn abandon(&mut self) -> u64 {
        self.pending.clear();
        self.inflight.clear();
        self.lost.clear();
        self.sent
    }
}
