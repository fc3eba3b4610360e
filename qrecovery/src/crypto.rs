//! The crypto stream of an epoch, carrying the handshake messages.
use bytes::Bytes;
use qbase::{
    error::{ErrorKind, QuicError},
    frame::{BeFrame, CryptoFrame},
    packet::Epoch,
};

use crate::{
    recv::RecvBuf,
    send::{SendBuf, StreamBuffer},
};

/// How far beyond the read offset handshake data is buffered.
pub const CRYPTO_BUFFER_LIMIT: u64 = 1 << 16;

/// A crypto stream, one per epoch.
///
/// Unlike a stream it is never finished nor reset and has no flow control, so
/// CRYPTO frames are always retransmittable while their data is in flight.
#[derive(Debug)]
pub struct CryptoStream {
    epoch: Epoch,
    sndbuf: SendBuf,
    rcvbuf: RecvBuf,
}

impl CryptoStream {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            sndbuf: SendBuf::default(),
            rcvbuf: RecvBuf::default(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Queue handshake data to be sent.
    pub fn write(&mut self, data: Bytes) {
        self.sndbuf.write(data);
    }

    pub fn has_pending_data(&self) -> bool {
        self.sndbuf.has_pending_data()
    }

    /// No data to send starts beyond this offset.
    pub fn max_offset(&self) -> u64 {
        self.sndbuf.written()
    }

    /// Pick up at most `max_len` bytes to send, lost data first.
    pub fn pick_up(&mut self, max_len: usize) -> Option<StreamBuffer> {
        self.sndbuf
            .pick_up(max_len, u64::MAX)
            .map(|(chunk, _fresh)| chunk)
            .filter(|chunk| !chunk.is_empty())
    }

    pub fn on_acked(&mut self, frame: &CryptoFrame) {
        if !self
            .sndbuf
            .on_acked(frame.offset(), frame.len() as usize, false)
        {
            tracing::trace!(epoch = %self.epoch, range = ?frame.range(), "acked crypto data is no longer buffered");
        }
    }

    pub fn on_lost(&mut self, frame: &CryptoFrame) {
        self.sndbuf.on_lost(frame.offset());
    }

    /// The in-flight data a CRYPTO frame carried, to be sent again as is.
    pub fn retransmittable(&self, frame: &CryptoFrame) -> Option<&StreamBuffer> {
        self.sndbuf.retransmittable(frame.offset())
    }

    /// Receive a CRYPTO frame, returns whether new data became readable.
    pub fn recv(&mut self, frame: &CryptoFrame, body: Bytes) -> Result<bool, QuicError> {
        let end = frame.offset() + body.len() as u64;
        if end > self.rcvbuf.nread() + CRYPTO_BUFFER_LIMIT {
            tracing::error!("   Cause by: {} crypto data exceeds the buffer limit", self.epoch);
            return Err(QuicError::new(
                ErrorKind::CryptoBufferExceeded,
                frame.frame_type(),
                format!(
                    "{} crypto data ends at {end}, beyond the buffer limit from offset {}",
                    self.epoch,
                    self.rcvbuf.nread()
                ),
            ));
        }
        let available = self.rcvbuf.available();
        self.rcvbuf.recv(frame.offset(), body);
        Ok(self.rcvbuf.available() > available)
    }

    /// Read at most `max` bytes of continuous handshake data.
    pub fn read(&mut self, max: usize) -> Bytes {
        self.rcvbuf.read(max)
    }
}
