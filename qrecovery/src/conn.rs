//! The connection arena: streams, crypto streams, sent packets and flow control
//! of one connection, driven by frames, acknowledgments and losses.
use std::{
    collections::{BTreeMap, VecDeque},
    time::Instant,
};

use bytes::Bytes;
use qbase::{
    config::TransportConfig,
    error::{ErrorKind, QuicError},
    flow::FlowController,
    frame::{
        BeFrame, CryptoFrame, Frame, FrameReader, FrameType, MaxDataFrame, MaxStreamDataFrame,
        ReliableFrame, ResetStreamFrame, StopSendingFrame, StreamCtlFrame, StreamFrame,
        error::Error as FrameError,
    },
    packet::{Epoch, PacketBuilder},
    role::Role,
    sid::{Dir, StreamId},
    varint::VarInt,
};

use crate::{
    crypto::CryptoStream,
    journal::{OutstandingPacket, PacketEvent, SentJournal},
    recv::RecvState,
    reliable::GuaranteedFrame,
    send::SendState,
    stream::{Effect, QuicStreamState},
    streams::{self, StreamManager, StreamSets, error::StreamError},
};

/// Per-direction stream counters, indexed by [`Dir`].
#[derive(Debug, Default, Clone, Copy)]
struct StreamCounts([u64; 2]);

impl StreamCounts {
    fn get(&self, dir: Dir) -> u64 {
        self.0[dir as usize]
    }

    fn set(&mut self, dir: Dir, value: u64) {
        self.0[dir as usize] = value;
    }
}

/// Everything one connection owns of the reliability core.
///
/// All operations run to completion on the caller's thread. Frames carrying a
/// protocol violation are rejected with a [`QuicError`] before any state they
/// would have changed is touched, and the caller is expected to close the
/// connection with it.
#[derive(Debug)]
pub struct ConnectionState<M = StreamSets> {
    role: Role,
    local: TransportConfig,
    peer: Option<TransportConfig>,
    streams: BTreeMap<StreamId, QuicStreamState>,
    crypto: [CryptoStream; 3],
    journals: [SentJournal; 3],
    manager: M,
    flow: FlowController,
    next_local: StreamCounts,
    max_local: StreamCounts,
    next_remote: StreamCounts,
    max_remote: StreamCounts,
    pending_resets: VecDeque<ResetStreamFrame>,
    pending_ctl: VecDeque<ReliableFrame>,
}

impl<M: StreamManager + Default> ConnectionState<M> {
    pub fn new(role: Role, local: &TransportConfig) -> Self {
        Self::with_manager(role, local, M::default())
    }
}

impl<M: StreamManager> ConnectionState<M> {
    /// A connection playing `role`, advertising the `local` settings.
    ///
    /// Nothing may be sent on streams before the peer's settings are known,
    /// see [`ConnectionState::set_peer_config`].
    pub fn with_manager(role: Role, local: &TransportConfig, manager: M) -> Self {
        let mut max_remote = StreamCounts::default();
        max_remote.set(Dir::Bi, local.initial_max_streams_bidi());
        max_remote.set(Dir::Uni, local.initial_max_streams_uni());
        Self {
            role,
            local: local.clone(),
            peer: None,
            streams: BTreeMap::new(),
            crypto: Epoch::ALL.map(CryptoStream::new),
            journals: Epoch::ALL.map(SentJournal::new),
            manager,
            flow: FlowController::with_initial(0, local.initial_max_data()),
            next_local: StreamCounts::default(),
            max_local: StreamCounts::default(),
            next_remote: StreamCounts::default(),
            max_remote,
            pending_resets: VecDeque::new(),
            pending_ctl: VecDeque::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_config(&self) -> &TransportConfig {
        &self.local
    }

    pub fn peer_config(&self) -> Option<&TransportConfig> {
        self.peer.as_ref()
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    pub fn stream(&self, sid: StreamId) -> Option<&QuicStreamState> {
        self.streams.get(&sid)
    }

    pub fn stream_ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.streams.keys().copied()
    }

    pub fn crypto(&self, epoch: Epoch) -> &CryptoStream {
        &self.crypto[epoch.index()]
    }

    pub fn journal(&self, epoch: Epoch) -> &SentJournal {
        &self.journals[epoch.index()]
    }

    pub(crate) fn journal_mut(&mut self, epoch: Epoch) -> &mut SentJournal {
        &mut self.journals[epoch.index()]
    }

    /// The connection-level limit currently advertised to the peer.
    pub fn current_max_data(&self) -> u64 {
        self.flow.recver.max_data()
    }

    /// How many more fresh stream bytes the peer allows.
    pub fn send_credit(&self) -> u64 {
        self.flow.sender.available()
    }

    /// RESET_STREAM frames waiting to be sent.
    pub fn pending_resets(&self) -> impl Iterator<Item = &ResetStreamFrame> {
        self.pending_resets.iter()
    }

    /// Other control frames waiting to be sent.
    pub fn pending_control(&self) -> impl Iterator<Item = &ReliableFrame> {
        self.pending_ctl.iter()
    }

    /// The stream windows: the peer's limit for sending, ours for receiving.
    fn windows(&self, sid: StreamId) -> (u64, u64) {
        let peer = self.peer.as_ref();
        let send = match (sid.dir(), sid.role() == self.role) {
            (Dir::Bi, true) => peer.map_or(0, |p| p.initial_max_stream_data_bidi_remote()),
            (Dir::Bi, false) => peer.map_or(0, |p| p.initial_max_stream_data_bidi_local()),
            (Dir::Uni, true) => peer.map_or(0, |p| p.initial_max_stream_data_uni()),
            (Dir::Uni, false) => 0,
        };
        let recv = match (sid.dir(), sid.role() == self.role) {
            (Dir::Bi, true) => self.local.initial_max_stream_data_bidi_local(),
            (Dir::Bi, false) => self.local.initial_max_stream_data_bidi_remote(),
            (Dir::Uni, true) => 0,
            (Dir::Uni, false) => self.local.initial_max_stream_data_uni(),
        };
        (send, recv)
    }

    fn insert_stream(&mut self, sid: StreamId) {
        let (send_window, recv_window) = self.windows(sid);
        let stream = QuicStreamState::new(sid, self.role, send_window, recv_window);
        tracing::debug!(%sid, send_window, recv_window, "stream created");
        self.streams.insert(sid, stream);
    }

    /// Apply the limits the peer advertised in its transport parameters.
    pub fn set_peer_config(&mut self, peer: &TransportConfig) {
        self.flow.sender.set_max_data(peer.initial_max_data());
        self.max_local.set(Dir::Bi, peer.initial_max_streams_bidi());
        self.max_local.set(Dir::Uni, peer.initial_max_streams_uni());
        self.peer = Some(peer.clone());
        let windows = self
            .streams
            .keys()
            .map(|&sid| (sid, self.windows(sid).0))
            .collect::<Vec<_>>();
        for (sid, send_window) in windows {
            if let Some(stream) = self.streams.get_mut(&sid) {
                stream.send.update_window(send_window);
            }
        }
    }

    /// Open a stream initiated by this endpoint.
    pub fn open_stream(&mut self, dir: Dir) -> Result<StreamId, StreamError> {
        let id = self.next_local.get(dir);
        if id >= self.max_local.get(dir) {
            return Err(StreamError::StreamsExhausted(dir));
        }
        let sid = StreamId::new(self.role, dir, id);
        self.next_local.set(dir, id + 1);
        self.insert_stream(sid);
        Ok(sid)
    }

    /// Make sure the stream a frame refers to exists, returns whether it does.
    ///
    /// A stream opened by the peer implicitly opens all the streams of the same
    /// type with lower ids. A stream already closed and removed is gone.
    fn ensure_stream(&mut self, sid: StreamId, frame_type: FrameType) -> Result<bool, QuicError> {
        let dir = sid.dir();
        if sid.role() == self.role {
            if sid.id() >= self.next_local.get(dir) {
                tracing::error!("   Cause by: {frame_type:?} received on {sid}, which is not opened yet");
                return Err(QuicError::new(
                    ErrorKind::StreamState,
                    frame_type,
                    format!("{sid} has not been opened locally"),
                ));
            }
            return Ok(self.streams.contains_key(&sid));
        }

        if sid.id() >= self.max_remote.get(dir) {
            tracing::error!("   Cause by: {sid} exceeds the stream limit");
            return Err(QuicError::new(
                ErrorKind::StreamLimit,
                frame_type,
                format!(
                    "{sid} exceeds the limit of {} {dir} streams",
                    self.max_remote.get(dir)
                ),
            ));
        }
        let next = self.next_remote.get(dir);
        if sid.id() < next {
            return Ok(self.streams.contains_key(&sid));
        }
        for id in next..=sid.id() {
            self.insert_stream(StreamId::new(sid.role(), dir, id));
        }
        self.next_remote.set(dir, sid.id() + 1);
        Ok(true)
    }

    /// The stream `sid`, opening it if the peer initiated it.
    ///
    /// `None` if the stream was closed and removed already.
    pub fn get_or_create_peer_stream(
        &mut self,
        sid: StreamId,
        frame_type: FrameType,
    ) -> Result<Option<&mut QuicStreamState>, QuicError> {
        if self.ensure_stream(sid, frame_type)? {
            Ok(self.streams.get_mut(&sid))
        } else {
            Ok(None)
        }
    }

    fn apply_effects(
        &mut self,
        frame_type: FrameType,
        effects: Vec<Effect>,
    ) -> Result<(), QuicError> {
        for effect in effects {
            match effect {
                Effect::QueueReset(frame) => self.pending_resets.push_back(frame),
                Effect::NewData(amount) => {
                    self.flow
                        .recver
                        .on_new_rcvd(amount)
                        .map_err(|e| e.into_quic_error(frame_type))?;
                }
                // Applied by the dispatcher.
                Effect::StopSending(_)
                | Effect::Deliverable
                | Effect::UpdateReadable
                | Effect::ResetSendHalf => {}
            }
        }
        Ok(())
    }

    fn queue_resets(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            if let Effect::QueueReset(frame) = effect {
                self.pending_resets.push_back(frame);
            }
        }
    }

    /// Queue a control frame to be sent, RESET_STREAM frames go first.
    pub fn queue_control(&mut self, frame: ReliableFrame) {
        match frame {
            ReliableFrame::Stream(StreamCtlFrame::ResetStream(reset)) => {
                self.pending_resets.push_back(reset)
            }
            frame => self.pending_ctl.push_back(frame),
        }
    }

    pub fn on_stream_frame(&mut self, frame: StreamFrame, body: Bytes) -> Result<(), QuicError> {
        let sid = frame.stream_id();
        streams::check_recv_dir(sid, self.role, frame.frame_type())?;
        if !self.ensure_stream(sid, frame.frame_type())? {
            tracing::trace!(%sid, "STREAM frame for a removed stream");
            return Ok(());
        }
        let Some(stream) = self.streams.get_mut(&sid) else {
            return Ok(());
        };
        let frame_type = frame.frame_type();
        if stream.recv.state() == RecvState::Open {
            let end = frame.offset() + body.len() as u64;
            self.flow
                .recver
                .check(end.saturating_sub(stream.recv.largest()))
                .map_err(|e| e.into_quic_error(frame_type))?;
        }
        let effects = streams::on_stream_frame(stream, self.role, &mut self.manager, frame, body)?;
        self.apply_effects(frame_type, effects)
    }

    pub fn on_reset_stream_frame(&mut self, frame: ResetStreamFrame) -> Result<(), QuicError> {
        let sid = frame.stream_id();
        streams::check_recv_dir(sid, self.role, frame.frame_type())?;
        if !self.ensure_stream(sid, frame.frame_type())? {
            tracing::trace!(%sid, "RESET_STREAM frame for a removed stream");
            return Ok(());
        }
        let Some(stream) = self.streams.get_mut(&sid) else {
            return Ok(());
        };
        let was_open = stream.recv.state() == RecvState::Open;
        let nread = stream.recv.rcvbuf().nread();
        if was_open {
            self.flow
                .recver
                .check(frame.final_size().saturating_sub(stream.recv.largest()))
                .map_err(|e| e.into_quic_error(frame.frame_type()))?;
        }
        let effects = streams::on_reset_stream_frame(stream, self.role, &mut self.manager, frame)?;
        self.apply_effects(frame.frame_type(), effects)?;
        if was_open {
            // The unread data is dropped, it no longer holds the connection window.
            let dropped = frame.final_size() - nread;
            if let Some(max_data) = self.flow.recver.on_data_read(dropped) {
                self.pending_ctl.push_back(max_data.into());
            }
        }
        Ok(())
    }

    pub fn on_stop_sending_frame(&mut self, frame: StopSendingFrame) -> Result<(), QuicError> {
        let sid = frame.stream_id();
        streams::check_send_dir(sid, self.role, frame.frame_type())?;
        if !self.ensure_stream(sid, frame.frame_type())? {
            tracing::trace!(%sid, "STOP_SENDING frame for a removed stream");
            return Ok(());
        }
        let Some(stream) = self.streams.get_mut(&sid) else {
            return Ok(());
        };
        let effects = streams::on_stop_sending_frame(stream, self.role, &mut self.manager, frame)?;
        self.apply_effects(frame.frame_type(), effects)
    }

    pub fn on_max_data_frame(&mut self, frame: &MaxDataFrame) {
        if self.flow.sender.on_max_data_frame(frame) {
            tracing::trace!(max_data = frame.max_data(), "connection window raised");
        }
    }

    pub fn on_max_stream_data_frame(&mut self, frame: &MaxStreamDataFrame) -> Result<(), QuicError> {
        let sid = frame.stream_id();
        streams::check_send_dir(sid, self.role, frame.frame_type())?;
        if self.ensure_stream(sid, frame.frame_type())? {
            if let Some(stream) = self.streams.get_mut(&sid) {
                stream.send.update_window(frame.max_stream_data());
            }
        }
        Ok(())
    }

    pub fn on_crypto_frame(
        &mut self,
        epoch: Epoch,
        frame: &CryptoFrame,
        body: Bytes,
    ) -> Result<bool, QuicError> {
        self.crypto[epoch.index()].recv(frame, body)
    }

    /// Handle one frame received in a packet of `epoch`.
    pub fn recv_frame(&mut self, epoch: Epoch, frame: Frame) -> Result<(), QuicError> {
        let frame_type = frame.frame_type();
        if !frame_type.belongs_to(epoch) {
            return Err(FrameError::WrongType(frame_type, epoch).into());
        }
        match frame {
            Frame::Padding(_) | Frame::Ping(_) => Ok(()),
            // Tearing the connection down is up to the caller.
            Frame::Close(close) => {
                tracing::debug!(?close, "CONNECTION_CLOSE received");
                Ok(())
            }
            Frame::MaxData(frame) => {
                self.on_max_data_frame(&frame);
                Ok(())
            }
            Frame::DataBlocked(frame) => {
                tracing::trace!(limit = frame.limit(), "peer is blocked by connection flow control");
                Ok(())
            }
            Frame::HandshakeDone(frame) => {
                if self.role == Role::Server {
                    tracing::error!("   Cause by: server received HANDSHAKE_DONE");
                    return Err(QuicError::new(
                        ErrorKind::ProtocolViolation,
                        frame.frame_type(),
                        "HANDSHAKE_DONE is only sent by servers",
                    ));
                }
                Ok(())
            }
            Frame::StreamCtl(StreamCtlFrame::ResetStream(frame)) => {
                self.on_reset_stream_frame(frame)
            }
            Frame::StreamCtl(StreamCtlFrame::StopSending(frame)) => {
                self.on_stop_sending_frame(frame)
            }
            Frame::StreamCtl(StreamCtlFrame::MaxStreamData(frame)) => {
                self.on_max_stream_data_frame(&frame)
            }
            Frame::Stream(frame, body) => self.on_stream_frame(frame, body),
            Frame::Crypto(frame, body) => self.on_crypto_frame(epoch, &frame, body).map(|_| ()),
        }
    }

    /// Handle all the frames of a decrypted packet payload.
    pub fn recv_payload(&mut self, epoch: Epoch, payload: Bytes) -> Result<(), QuicError> {
        if payload.is_empty() {
            return Err(FrameError::NoFrames.into());
        }
        for frame in FrameReader::new(payload, epoch) {
            self.recv_frame(epoch, frame?)?;
        }
        Ok(())
    }

    pub fn write_stream(&mut self, sid: StreamId, data: Bytes) -> Result<(), StreamError> {
        if !sid.can_send(self.role) {
            return Err(StreamError::NotWritable(sid));
        }
        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(StreamError::NotFound(sid))?;
        stream.send.write(data)
    }

    /// Mark the end of the data written on the stream.
    pub fn finish_stream(&mut self, sid: StreamId) -> Result<(), StreamError> {
        if !sid.can_send(self.role) {
            return Err(StreamError::NotWritable(sid));
        }
        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(StreamError::NotFound(sid))?;
        stream.send.finish()
    }

    /// Read at most `max` bytes from the stream.
    ///
    /// Reading may extend the stream and connection windows, the MAX_STREAM_DATA
    /// and MAX_DATA frames are queued.
    pub fn read_stream(&mut self, sid: StreamId, max: usize) -> Result<Bytes, StreamError> {
        if !sid.can_recv(self.role) {
            return Err(StreamError::NotReadable(sid));
        }
        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(StreamError::NotFound(sid))?;
        let data = stream.recv.read(max)?;
        if let Some(max_stream_data) = stream.recv.window_update(sid) {
            self.pending_ctl
                .push_back(StreamCtlFrame::from(max_stream_data).into());
        }
        self.manager.update_readable_streams(stream);
        if let Some(max_data) = self.flow.recver.on_data_read(data.len() as u64) {
            self.pending_ctl.push_back(max_data.into());
        }
        Ok(data)
    }

    /// The application abandons sending on the stream.
    pub fn reset_stream(&mut self, sid: StreamId, app_err_code: VarInt) -> Result<(), StreamError> {
        if !sid.can_send(self.role) {
            return Err(StreamError::NotWritable(sid));
        }
        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(StreamError::NotFound(sid))?;
        let effects = streams::reset_stream(stream, &mut self.manager, app_err_code);
        self.queue_resets(effects);
        Ok(())
    }

    /// The application asks the peer to stop sending on the stream.
    pub fn stop_sending(&mut self, sid: StreamId, app_err_code: VarInt) -> Result<(), StreamError> {
        if !sid.can_recv(self.role) {
            return Err(StreamError::NotReadable(sid));
        }
        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(StreamError::NotFound(sid))?;
        if let Some(frame) = stream.recv.stop(sid, app_err_code) {
            self.pending_ctl.push_back(StreamCtlFrame::from(frame).into());
        }
        Ok(())
    }

    pub fn write_crypto(&mut self, epoch: Epoch, data: Bytes) {
        self.crypto[epoch.index()].write(data);
    }

    pub fn read_crypto(&mut self, epoch: Epoch, max: usize) -> Bytes {
        self.crypto[epoch.index()].read(max)
    }

    /// The up-to-date version of a control frame to send again, `None` if it is
    /// no longer meaningful.
    pub fn refresh_reliable(&self, frame: &ReliableFrame) -> Option<ReliableFrame> {
        match frame {
            ReliableFrame::MaxData(_) => {
                let max_data = VarInt::from_u64(self.current_max_data()).ok()?;
                Some(MaxDataFrame::new(max_data).into())
            }
            ReliableFrame::DataBlocked(_) | ReliableFrame::HandshakeDone(_) => Some(frame.clone()),
            ReliableFrame::Stream(ctl) => {
                let stream = self.streams.get(&ctl.stream_id())?;
                match ctl {
                    StreamCtlFrame::MaxStreamData(_) => {
                        if stream.recv.state() != RecvState::Open {
                            return None;
                        }
                        let max_stream_data = VarInt::from_u64(stream.recv.max_stream_data()).ok()?;
                        Some(StreamCtlFrame::from(MaxStreamDataFrame::new(stream.id, max_stream_data)).into())
                    }
                    StreamCtlFrame::ResetStream(_) => {
                        if stream.send.state() != SendState::ResetSent {
                            return None;
                        }
                        stream
                            .send
                            .reset_frame()
                            .map(|reset| StreamCtlFrame::from(*reset).into())
                    }
                    StreamCtlFrame::StopSending(_) => {
                        (stream.recv.state() == RecvState::Open).then(|| frame.clone())
                    }
                }
            }
        }
    }

    /// Record a packet just sent, with the frames written in it.
    pub fn record_sent_packet(&mut self, epoch: Epoch, pn: u64, frames: &[Frame], sent_time: Instant) {
        let frames = GuaranteedFrame::collect(frames);
        self.journals[epoch.index()].record(OutstandingPacket::new(pn, epoch, frames, sent_time));
    }

    /// Record a packet rebuilt from the clone group `event`.
    pub fn record_rebuilt_packet(
        &mut self,
        epoch: Epoch,
        pn: u64,
        frames: &[Frame],
        event: PacketEvent,
        sent_time: Instant,
    ) {
        let frames = GuaranteedFrame::collect(frames);
        self.journals[epoch.index()].register_clone(pn, frames, event, sent_time);
    }

    pub fn on_packet_acked(&mut self, epoch: Epoch, pn: u64) {
        let Some(frames) = self.journals[epoch.index()].on_packet_acked(pn) else {
            return;
        };
        for frame in frames {
            match frame {
                GuaranteedFrame::Stream(frame) => {
                    if let Some(stream) = self.streams.get_mut(&frame.stream_id()) {
                        let effects = streams::on_stream_acked(stream, &mut self.manager, frame);
                        self.queue_resets(effects);
                    }
                }
                GuaranteedFrame::Crypto(frame) => self.crypto[epoch.index()].on_acked(&frame),
                GuaranteedFrame::Reliable(ReliableFrame::Stream(StreamCtlFrame::ResetStream(
                    frame,
                ))) => {
                    if let Some(stream) = self.streams.get_mut(&frame.stream_id()) {
                        streams::on_reset_acked(stream, &mut self.manager);
                    }
                }
                GuaranteedFrame::Reliable(_) => {}
            }
        }
    }

    pub fn on_packet_lost(&mut self, epoch: Epoch, pn: u64) {
        let Some(frames) = self.journals[epoch.index()].on_packet_lost(pn) else {
            return;
        };
        for frame in frames {
            match frame {
                GuaranteedFrame::Stream(frame) => {
                    if let Some(stream) = self.streams.get_mut(&frame.stream_id()) {
                        stream.send.on_lost(frame.offset());
                    }
                }
                GuaranteedFrame::Crypto(frame) => self.crypto[epoch.index()].on_lost(&frame),
                GuaranteedFrame::Reliable(frame) => match self.refresh_reliable(&frame) {
                    Some(frame) => self.queue_control(frame),
                    None => tracing::trace!(?frame, "lost control frame is obsolete"),
                },
            }
        }
    }

    /// Remove the closed streams the application has nothing left to read from.
    pub fn remove_closed_streams(&mut self) -> Vec<StreamId> {
        let closed = self
            .streams
            .values()
            .filter(|stream| stream.is_terminal() && stream.recv.is_drained())
            .map(|stream| stream.id)
            .collect::<Vec<_>>();
        for sid in &closed {
            self.streams.remove(sid);
            self.manager.remove_stream(*sid);
            tracing::debug!(%sid, "stream removed");
        }
        closed
    }

    /// Fill a packet of `epoch` with what waits to be sent: control frames,
    /// then crypto data, then stream data, lost data before fresh data.
    ///
    /// Returns how many frames were written.
    pub fn fill_packet(&mut self, epoch: Epoch, builder: &mut impl PacketBuilder) -> usize {
        let mut written = 0;
        if epoch == Epoch::Data {
            written += self.fill_control(builder);
        }
        written += self.fill_crypto(epoch, builder);
        if epoch == Epoch::Data {
            written += self.fill_streams(builder);
            if let Some(blocked) = self.flow.sender.blocked() {
                self.pending_ctl.push_back(blocked.into());
            }
        }
        written
    }

    fn fill_control(&mut self, builder: &mut impl PacketBuilder) -> usize {
        let mut written = 0;
        while let Some(reset) = self.pending_resets.front() {
            if builder.append_frame(&Frame::StreamCtl((*reset).into())).is_err() {
                return written;
            }
            self.pending_resets.pop_front();
            written += 1;
        }
        while let Some(frame) = self.pending_ctl.front() {
            if builder.append_frame(&Frame::from(frame.clone())).is_err() {
                return written;
            }
            self.pending_ctl.pop_front();
            written += 1;
        }
        written
    }

    fn fill_crypto(&mut self, epoch: Epoch, builder: &mut impl PacketBuilder) -> usize {
        let crypto = &mut self.crypto[epoch.index()];
        let mut written = 0;
        while crypto.has_pending_data() {
            let Some(max_len) =
                CryptoFrame::estimate_max_capacity(builder.remaining(), crypto.max_offset())
            else {
                break;
            };
            let Some(chunk) = crypto.pick_up(max_len) else {
                break;
            };
            let frame = CryptoFrame::new(chunk.offset, chunk.len() as u64);
            if let Err(error) = builder.append_frame(&Frame::Crypto(frame, chunk.data)) {
                tracing::warn!(%epoch, %error, "crypto data picked up but not written");
                crypto.on_lost(&frame);
                break;
            }
            written += 1;
        }
        written
    }

    fn fill_streams(&mut self, builder: &mut impl PacketBuilder) -> usize {
        let mut written = 0;
        for stream in self.streams.values_mut() {
            while stream.send.has_pending_data() {
                let offset = stream.send.sndbuf().written();
                let Some(max_len) =
                    StreamFrame::estimate_max_capacity(builder.remaining(), stream.id, offset)
                else {
                    return written;
                };
                let Some((chunk, fresh)) = stream.send.pick_up(max_len, self.flow.sender.available())
                else {
                    break;
                };
                self.flow.sender.post_sent(fresh as u64);
                let mut frame = StreamFrame::new(stream.id, chunk.offset, chunk.len());
                frame.set_eos_flag(chunk.fin);
                if let Err(error) = builder.append_frame(&Frame::Stream(frame, chunk.data)) {
                    tracing::warn!(sid = %stream.id, %error, "stream data picked up but not written");
                    stream.send.on_lost(chunk.offset);
                    return written;
                }
                written += 1;
            }
        }
        written
    }
}
