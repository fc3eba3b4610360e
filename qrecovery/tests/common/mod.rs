#![allow(unused)]

use std::time::Instant;

use qbase::{
    config::TransportConfig,
    frame::Frame,
    packet::{Epoch, PacketBuilder, PacketWriter, WriteError, WrittenPacket},
    role::Role,
};
use qrecovery::conn::ConnectionState;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client and a server that already exchanged their transport parameters.
pub fn connected(config: &TransportConfig) -> (ConnectionState, ConnectionState) {
    init_tracing();
    let mut client = ConnectionState::new(Role::Client, config);
    let mut server = ConnectionState::new(Role::Server, config);
    client.set_peer_config(config);
    server.set_peer_config(config);
    (client, server)
}

/// Fill and record a packet, `None` if there was nothing to send.
pub fn transmit(
    from: &mut ConnectionState,
    epoch: Epoch,
    pn: u64,
    max_size: usize,
) -> Option<WrittenPacket> {
    let mut writer = PacketWriter::new(epoch, pn, &[0x40], max_size).ok()?;
    from.fill_packet(epoch, &mut writer);
    if writer.is_empty() {
        return None;
    }
    let packet = writer.finalize();
    from.record_sent_packet(epoch, pn, &packet.frames, Instant::now());
    Some(packet)
}

pub fn deliver(to: &mut ConnectionState, packet: &WrittenPacket) {
    for frame in &packet.frames {
        to.recv_frame(packet.epoch, frame.clone())
            .expect("frames of a well-behaved peer");
    }
}

/// A builder that only counts bytes, for packets that never hit the wire.
#[derive(Debug)]
pub struct BudgetBuilder {
    epoch: Epoch,
    header: usize,
    remaining: usize,
    frames: Vec<Frame>,
}

impl BudgetBuilder {
    pub fn new(epoch: Epoch, header: usize, budget: usize) -> Self {
        Self {
            epoch,
            header,
            remaining: budget,
            frames: Vec::new(),
        }
    }
}

impl PacketBuilder for BudgetBuilder {
    type Packet = Vec<Frame>;

    fn header_bytes(&self) -> usize {
        self.header
    }

    fn remaining(&self) -> usize {
        self.remaining
    }

    fn append_frame(&mut self, frame: &Frame) -> Result<(), WriteError> {
        if !frame.frame_type().belongs_to(self.epoch) {
            return Err(WriteError::WrongEpoch(frame.frame_type(), self.epoch));
        }
        let needed = frame.encoding_size();
        if needed > self.remaining {
            return Err(WriteError::Capacity {
                needed,
                remaining: self.remaining,
            });
        }
        self.remaining -= needed;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn finalize(self) -> Vec<Frame> {
        self.frames
    }
}
