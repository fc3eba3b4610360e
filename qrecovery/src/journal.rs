//! The records of sent packets awaiting acknowledgment or loss.
use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt,
    time::Instant,
};

use qbase::packet::Epoch;

use crate::reliable::GuaranteedFrame;

/// A clone group: a packet and all the packets rebuilt from it, carrying the
/// same retransmittable content.
///
/// The handle is the packet number of the original packet, a clone group only
/// exists within the journal of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketEvent(u64);

impl PacketEvent {
    /// The packet number of the packet the group was cloned from.
    pub fn original_pn(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PacketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clone group of packet {}", self.0)
    }
}

/// A packet handed to the network, not yet acknowledged nor declared lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingPacket {
    pub pn: u64,
    pub epoch: Epoch,
    pub frames: Vec<GuaranteedFrame>,
    pub sent_time: Instant,
    pub associated_event: Option<PacketEvent>,
}

impl OutstandingPacket {
    pub fn new(pn: u64, epoch: Epoch, frames: Vec<GuaranteedFrame>, sent_time: Instant) -> Self {
        Self {
            pn,
            epoch,
            frames,
            sent_time,
            associated_event: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Group {
    outstanding: usize,
    resolved: bool,
}

/// The outstanding packets of an epoch, and their clone groups.
///
/// A clone group is resolved by the first of its packets to be acknowledged or
/// lost: its frames are handed out once, the other members are then dropped
/// silently. A group is forgotten once none of its packets is outstanding.
#[derive(Debug)]
pub struct SentJournal {
    epoch: Epoch,
    packets: BTreeMap<u64, OutstandingPacket>,
    groups: BTreeMap<PacketEvent, Group>,
    cloned: u64,
}

impl SentJournal {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            packets: BTreeMap::new(),
            groups: BTreeMap::new(),
            cloned: 0,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// How many rebuilt packets have been recorded.
    pub fn cloned_count(&self) -> u64 {
        self.cloned
    }

    pub fn get(&self, pn: u64) -> Option<&OutstandingPacket> {
        self.packets.get(&pn)
    }

    /// The outstanding packets, by packet number.
    pub fn outstanding(&self) -> impl Iterator<Item = &OutstandingPacket> {
        self.packets.values()
    }

    /// Record a packet just sent.
    ///
    /// # Panics
    ///
    /// Panics if the packet number was already used in this epoch.
    pub fn record(&mut self, packet: OutstandingPacket) {
        assert_eq!(packet.epoch, self.epoch);
        match self.packets.entry(packet.pn) {
            Entry::Vacant(entry) => {
                entry.insert(packet);
            }
            Entry::Occupied(entry) => panic!("packet number {} sent twice", entry.key()),
        }
    }

    /// Whether the group was resolved by one of its packets.
    pub fn is_resolved(&self, event: PacketEvent) -> bool {
        self.groups.get(&event).is_some_and(|group| group.resolved)
    }

    /// Whether the group still has packets in flight.
    pub fn is_live(&self, event: PacketEvent) -> bool {
        self.groups.contains_key(&event)
    }

    /// Get the clone group of an outstanding packet, creating it on first cloning.
    ///
    /// Returns `None` if the packet is not outstanding.
    pub fn clone_outstanding_packet(&mut self, pn: u64) -> Option<PacketEvent> {
        let packet = self.packets.get_mut(&pn)?;
        if let Some(event) = packet.associated_event {
            return Some(event);
        }
        let event = PacketEvent(pn);
        packet.associated_event = Some(event);
        self.groups.insert(
            event,
            Group {
                outstanding: 1,
                resolved: false,
            },
        );
        tracing::trace!(epoch = %self.epoch, pn, "clone group created");
        Some(event)
    }

    /// Record a packet rebuilt for the clone group `event`.
    ///
    /// # Panics
    ///
    /// Panics if the group is not live.
    pub fn register_clone(
        &mut self,
        pn: u64,
        frames: Vec<GuaranteedFrame>,
        event: PacketEvent,
        sent_time: Instant,
    ) {
        let group = self
            .groups
            .get_mut(&event)
            .unwrap_or_else(|| panic!("{event} is not live"));
        group.outstanding += 1;
        self.cloned += 1;
        let mut packet = OutstandingPacket::new(pn, self.epoch, frames, sent_time);
        packet.associated_event = Some(event);
        self.record(packet);
    }

    fn resolve(&mut self, pn: u64) -> Option<Vec<GuaranteedFrame>> {
        let packet = self.packets.remove(&pn)?;
        let Some(event) = packet.associated_event else {
            return Some(packet.frames);
        };
        let Entry::Occupied(mut entry) = self.groups.entry(event) else {
            unreachable!("{event} of an outstanding packet must be live")
        };
        let group = entry.get_mut();
        let first = !group.resolved;
        group.resolved = true;
        group.outstanding -= 1;
        if group.outstanding == 0 {
            entry.remove();
        }
        if first {
            Some(packet.frames)
        } else {
            tracing::trace!(epoch = %self.epoch, pn, %event, "already resolved");
            None
        }
    }

    /// The packet was acknowledged, returns the frames delivered by it.
    ///
    /// `None` if the packet is not outstanding, or another packet of its clone
    /// group was resolved before.
    pub fn on_packet_acked(&mut self, pn: u64) -> Option<Vec<GuaranteedFrame>> {
        self.resolve(pn)
    }

    /// The packet was declared lost, returns the frames to recover.
    ///
    /// Like acknowledgments, only the first resolution of a clone group hands
    /// out its frames.
    pub fn on_packet_lost(&mut self, pn: u64) -> Option<Vec<GuaranteedFrame>> {
        self.resolve(pn)
    }

    /// Forget a packet without resolving its group, it won't be acknowledged.
    pub fn discard(&mut self, pn: u64) -> Option<OutstandingPacket> {
        let packet = self.packets.remove(&pn)?;
        if let Some(event) = packet.associated_event {
            if let Entry::Occupied(mut entry) = self.groups.entry(event) {
                entry.get_mut().outstanding -= 1;
                if entry.get().outstanding == 0 {
                    entry.remove();
                }
            }
        }
        Some(packet)
    }
}
