//! Rebuilding an outstanding packet into a new one, before its fate is known.
use qbase::{
    frame::{CryptoFrame, Frame, ReliableFrame, StreamFrame},
    packet::{Epoch, PacketBuilder, WriteError},
};

use crate::{
    conn::ConnectionState,
    journal::PacketEvent,
    reliable::GuaranteedFrame,
    streams::StreamManager,
};

/// Writes the still-needed content of an outstanding packet into a new packet,
/// typically for a probe.
///
/// The rebuilt packet joins the clone group of the original: whichever of
/// them is resolved first decides for the whole group.
///
/// ```ignore
/// let mut rebuilder = PacketRebuilder::new(&mut conn, writer);
/// if let Some(event) = rebuilder.rebuild_from_packet(Epoch::Data, pn) {
///     let packet = rebuilder.finalize();
///     conn.record_rebuilt_packet(Epoch::Data, packet.pn, &packet.frames, event, now);
/// }
/// ```
pub struct PacketRebuilder<'a, B, M> {
    conn: &'a mut ConnectionState<M>,
    builder: B,
}

impl<'a, B: PacketBuilder, M: StreamManager> PacketRebuilder<'a, B, M> {
    pub fn new(conn: &'a mut ConnectionState<M>, builder: B) -> Self {
        Self { conn, builder }
    }

    /// The fixed overhead of the packet being built.
    pub fn header_bytes(&self) -> usize {
        self.builder.header_bytes()
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Give up the rebuilder, returning the builder as it is.
    pub fn into_builder(self) -> B {
        self.builder
    }

    pub fn finalize(self) -> B::Packet {
        self.builder.finalize()
    }

    /// Write the content of the outstanding packet `pn` of `epoch` that still
    /// needs delivery: in-flight stream and crypto data, and up-to-date versions
    /// of its control frames.
    ///
    /// Returns the clone group the new packet belongs to. Returns `None`, and the
    /// packet should not be sent, if `pn` is not outstanding, its group is already
    /// resolved, nothing is left to send or the packet is too small for it.
    pub fn rebuild_from_packet(&mut self, epoch: Epoch, pn: u64) -> Option<PacketEvent> {
        let journal = self.conn.journal(epoch);
        let packet = journal.get(pn)?;
        if packet
            .associated_event
            .is_some_and(|event| journal.is_resolved(event))
        {
            tracing::trace!(%epoch, pn, "clone group already resolved, not rebuilt");
            return None;
        }
        let frames = packet.frames.clone();

        let mut written = 0;
        for frame in &frames {
            match self.rebuild_frame(epoch, frame) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::debug!(%epoch, pn, %error, "packet can't be rebuilt");
                    return None;
                }
            }
        }
        if written == 0 {
            tracing::trace!(%epoch, pn, "nothing left to rebuild");
            return None;
        }
        self.conn.journal_mut(epoch).clone_outstanding_packet(pn)
    }

    fn rebuild_frame(&mut self, epoch: Epoch, frame: &GuaranteedFrame) -> Result<bool, WriteError> {
        let rebuilt = match frame {
            GuaranteedFrame::Stream(frame) => {
                let Some(chunk) = self
                    .conn
                    .stream(frame.stream_id())
                    .and_then(|stream| stream.send.retransmittable(frame.offset()))
                else {
                    return Ok(false);
                };
                let mut rebuilt = StreamFrame::new(frame.stream_id(), chunk.offset, chunk.len());
                rebuilt.set_eos_flag(chunk.fin);
                Frame::Stream(rebuilt, chunk.data.clone())
            }
            GuaranteedFrame::Crypto(frame) => {
                let Some(chunk) = self.conn.crypto(epoch).retransmittable(frame) else {
                    return Ok(false);
                };
                let rebuilt = CryptoFrame::new(chunk.offset, chunk.len() as u64);
                Frame::Crypto(rebuilt, chunk.data.clone())
            }
            GuaranteedFrame::Reliable(frame) => {
                let Some(refreshed) = self.conn.refresh_reliable(frame) else {
                    return Ok(false);
                };
                Frame::from(refreshed)
            }
        };
        self.builder.append_frame(&rebuilt)?;
        Ok(true)
    }

    /// A control frame that needs delivery, if it is still meaningful.
    pub fn refresh(&self, frame: &ReliableFrame) -> Option<ReliableFrame> {
        self.conn.refresh_reliable(frame)
    }
}
