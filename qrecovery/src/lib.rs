//! The reliability core of a QUIC connection.
//!
//! [`conn::ConnectionState`] owns the streams, crypto streams, sent packet
//! journals and flow control of a connection. Received frames, acknowledgments
//! and losses drive the per-stream state machines of [`send`] and [`recv`];
//! [`rebuild::PacketRebuilder`] clones outstanding packets for probes.
pub mod conn;
pub mod crypto;
pub mod journal;
pub mod rebuild;
pub mod recv;
pub mod reliable;
pub mod send;
pub mod stream;
pub mod streams;
