mod common;

use std::time::Instant;

use bytes::Bytes;
use common::*;
use qbase::{
    config::TransportConfig,
    frame::{Frame, ReliableFrame},
    packet::{Epoch, PacketBuilder},
    sid::Dir,
};
use qrecovery::{conn::ConnectionState, rebuild::PacketRebuilder, send::SendState};

fn config() -> TransportConfig {
    TransportConfig::builder()
        .initial_max_data(1000u64)
        .initial_max_stream_data_bidi_local(1000u64)
        .initial_max_stream_data_bidi_remote(1000u64)
        .build()
        .unwrap()
}

fn probe(conn: &mut ConnectionState, epoch: Epoch, from: u64, pn: u64) -> Option<Vec<Frame>> {
    let mut rebuilder = PacketRebuilder::new(conn, BudgetBuilder::new(epoch, 5, 1200));
    let event = rebuilder.rebuild_from_packet(epoch, from)?;
    let frames = rebuilder.finalize();
    conn.record_rebuilt_packet(epoch, pn, &frames, event, Instant::now());
    Some(frames)
}

#[test]
fn acked_probe_delivers_group_once() {
    let (mut client, _) = connected(&config());
    let sid = client.open_stream(Dir::Bi).unwrap();
    client.write_stream(sid, Bytes::from_static(b"important")).unwrap();
    client.finish_stream(sid).unwrap();
    let original = transmit(&mut client, Epoch::Data, 0, 1200).unwrap();

    let first = probe(&mut client, Epoch::Data, 0, 1).unwrap();
    let second = probe(&mut client, Epoch::Data, 1, 2).unwrap();
    assert_eq!(first, original.frames);
    assert_eq!(second, original.frames);
    assert_eq!(client.journal(Epoch::Data).cloned_count(), 2);

    client.on_packet_acked(Epoch::Data, 2);
    assert_eq!(client.stream(sid).unwrap().send.state(), SendState::Closed);
    assert_eq!(client.manager_mut().take_deliverable().len(), 1);

    // The other members of the group resolve silently.
    client.on_packet_lost(Epoch::Data, 0);
    client.on_packet_acked(Epoch::Data, 1);
    assert!(client.manager_mut().take_deliverable().is_empty());
    assert!(!client.stream(sid).unwrap().send.has_pending_data());
    assert!(client.journal(Epoch::Data).is_empty());
}

#[test]
fn lost_group_recovers_data_once() {
    let (mut client, mut server) = connected(&config());
    let sid = client.open_stream(Dir::Bi).unwrap();
    client.write_stream(sid, Bytes::from_static(b"twice lost")).unwrap();
    transmit(&mut client, Epoch::Data, 0, 1200).unwrap();
    probe(&mut client, Epoch::Data, 0, 1).unwrap();

    client.on_packet_lost(Epoch::Data, 1);
    client.on_packet_lost(Epoch::Data, 0);

    let resent = transmit(&mut client, Epoch::Data, 2, 1200).unwrap();
    assert_eq!(resent.frames.len(), 1);
    assert!(transmit(&mut client, Epoch::Data, 3, 1200).is_none());

    deliver(&mut server, &resent);
    assert_eq!(&server.read_stream(sid, 100).unwrap()[..], b"twice lost");
}

#[test]
fn first_resolution_wins_over_later_ack() {
    let (mut client, _) = connected(&config());
    let sid = client.open_stream(Dir::Bi).unwrap();
    client.write_stream(sid, Bytes::from_static(b"late ack")).unwrap();
    transmit(&mut client, Epoch::Data, 0, 1200).unwrap();
    probe(&mut client, Epoch::Data, 0, 1).unwrap();

    client.on_packet_lost(Epoch::Data, 0);
    client.on_packet_acked(Epoch::Data, 1);
    // The loss already moved the data back for retransmission.
    assert!(client.stream(sid).unwrap().send.has_pending_data());
    assert!(client.manager_mut().take_deliverable().is_empty());

    // Neither member is outstanding anymore.
    assert!(probe(&mut client, Epoch::Data, 0, 2).is_none());
    assert!(probe(&mut client, Epoch::Data, 1, 2).is_none());
}

#[test]
fn crypto_probe_in_handshake_epoch() {
    let (mut client, mut server) = connected(&config());
    client.write_crypto(Epoch::Handshake, Bytes::from(vec![0x16; 2000]));
    let first = transmit(&mut client, Epoch::Handshake, 0, 1200).unwrap();
    let second = transmit(&mut client, Epoch::Handshake, 1, 1200).unwrap();

    // The probe carries the same CRYPTO frame as the packet it clones.
    let rebuilt = probe(&mut client, Epoch::Handshake, 1, 2).unwrap();
    assert_eq!(rebuilt, second.frames);

    client.on_packet_acked(Epoch::Handshake, 0);
    client.on_packet_acked(Epoch::Handshake, 2);
    client.on_packet_acked(Epoch::Handshake, 1);
    assert!(!client.crypto(Epoch::Handshake).has_pending_data());
    assert!(client.journal(Epoch::Handshake).is_empty());

    deliver(&mut server, &second);
    deliver(&mut server, &first);
    assert_eq!(server.read_crypto(Epoch::Handshake, usize::MAX).len(), 2000);
}

#[test]
fn lost_max_data_is_refreshed() {
    let (mut client, mut server) = connected(&config());
    let sid = client.open_stream(Dir::Bi).unwrap();
    client.write_stream(sid, Bytes::from(vec![1; 600])).unwrap();
    deliver(&mut server, &transmit(&mut client, Epoch::Data, 0, 1200).unwrap());

    server.read_stream(sid, 500).unwrap();
    let window_update = transmit(&mut server, Epoch::Data, 0, 1200).unwrap();
    assert!(window_update.frames.iter().any(|frame| matches!(
        frame,
        Frame::MaxData(max_data) if max_data.max_data() == 1500
    )));

    // Another read raises the limit while the first update is in flight.
    client.write_stream(sid, Bytes::from(vec![2; 400])).unwrap();
    deliver(&mut server, &transmit(&mut client, Epoch::Data, 1, 1200).unwrap());
    server.read_stream(sid, usize::MAX).unwrap();
    let current = server.current_max_data();
    assert!(current > 1500);

    // Probes carry the up to date limit.
    let probed = probe(&mut server, Epoch::Data, 0, 1).unwrap();
    assert!(probed.iter().any(|frame| matches!(
        frame,
        Frame::MaxData(max_data) if max_data.max_data() == current
    )));

    // So do retransmissions.
    server.on_packet_lost(Epoch::Data, 0);
    assert!(server.pending_control().any(|frame| matches!(
        frame,
        ReliableFrame::MaxData(max_data) if max_data.max_data() == current
    )));
    server.on_packet_acked(Epoch::Data, 1);
    assert!(server.journal(Epoch::Data).is_empty());

    let mut rebuilder = PacketRebuilder::new(&mut server, BudgetBuilder::new(Epoch::Data, 5, 1200));
    assert_eq!(rebuilder.header_bytes(), 5);
    assert!(rebuilder.rebuild_from_packet(Epoch::Data, 0).is_none());
    assert!(rebuilder.builder().is_empty());
}
