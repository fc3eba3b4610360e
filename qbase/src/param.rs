use std::fmt;

use bytes::Bytes;
use derive_more::{From, Into};

use crate::varint::{ReadVarInt, VarInt, WriteVarInt};

mod error;
pub use error::Error;

/// IO module for transport parameters and their extension container.
pub mod io;
pub use io::{WriteExtension, be_extension};

/// The protocol versions whose transport parameter layouts are understood.
///
/// The version is threaded through every codec call: the wire layout is
/// decided by it and by nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// The draft-24 era layout, with 16-bit ids and lengths behind a total length.
    Draft24,
    /// draft-27 and later drafts.
    Draft27,
    /// QUIC version 1, RFC 9000.
    V1,
}

/// The two wire layouts of transport parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `u16` total length, then `u16 id, u16 length, value` triples.
    Nested,
    /// `varint id, varint length, value` triples.
    Flat,
}

impl Version {
    pub fn layout(&self) -> Layout {
        match self {
            Version::Draft24 => Layout::Nested,
            Version::Draft27 | Version::V1 => Layout::Flat,
        }
    }

    /// The TLS extension type carrying the transport parameters.
    pub fn extension_type(&self) -> u16 {
        match self {
            Version::Draft24 | Version::Draft27 => 0xffa5,
            Version::V1 => 0x39,
        }
    }
}

/// Identifier of a transport parameter.
///
/// Unknown ids are legal and kept as they are.
///
/// See [transport parameter definitions](https://www.rfc-editor.org/rfc/rfc9000.html#name-transport-parameter-definit)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct ParameterId(pub u64);

impl ParameterId {
    pub const ORIGINAL_DESTINATION_CONNECTION_ID: Self = Self(0x00);
    pub const MAX_IDLE_TIMEOUT: Self = Self(0x01);
    pub const STATELESS_RESET_TOKEN: Self = Self(0x02);
    pub const MAX_UDP_PAYLOAD_SIZE: Self = Self(0x03);
    pub const INITIAL_MAX_DATA: Self = Self(0x04);
    pub const INITIAL_MAX_STREAM_DATA_BIDI_LOCAL: Self = Self(0x05);
    pub const INITIAL_MAX_STREAM_DATA_BIDI_REMOTE: Self = Self(0x06);
    pub const INITIAL_MAX_STREAM_DATA_UNI: Self = Self(0x07);
    pub const INITIAL_MAX_STREAMS_BIDI: Self = Self(0x08);
    pub const INITIAL_MAX_STREAMS_UNI: Self = Self(0x09);
    pub const ACK_DELAY_EXPONENT: Self = Self(0x0a);
    pub const MAX_ACK_DELAY: Self = Self(0x0b);
    pub const DISABLE_ACTIVE_MIGRATION: Self = Self(0x0c);
    pub const PREFERRED_ADDRESS: Self = Self(0x0d);
    pub const ACTIVE_CONNECTION_ID_LIMIT: Self = Self(0x0e);
    pub const INITIAL_SOURCE_CONNECTION_ID: Self = Self(0x0f);
    pub const RETRY_SOURCE_CONNECTION_ID: Self = Self(0x10);

    /// Whether only a server may send this parameter.
    pub fn is_server_only(&self) -> bool {
        matches!(
            *self,
            Self::ORIGINAL_DESTINATION_CONNECTION_ID
                | Self::STATELESS_RESET_TOKEN
                | Self::PREFERRED_ADDRESS
                | Self::RETRY_SOURCE_CONNECTION_ID
        )
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::ORIGINAL_DESTINATION_CONNECTION_ID => "original_destination_connection_id",
            Self::MAX_IDLE_TIMEOUT => "max_idle_timeout",
            Self::STATELESS_RESET_TOKEN => "stateless_reset_token",
            Self::MAX_UDP_PAYLOAD_SIZE => "max_udp_payload_size",
            Self::INITIAL_MAX_DATA => "initial_max_data",
            Self::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL => "initial_max_stream_data_bidi_local",
            Self::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE => "initial_max_stream_data_bidi_remote",
            Self::INITIAL_MAX_STREAM_DATA_UNI => "initial_max_stream_data_uni",
            Self::INITIAL_MAX_STREAMS_BIDI => "initial_max_streams_bidi",
            Self::INITIAL_MAX_STREAMS_UNI => "initial_max_streams_uni",
            Self::ACK_DELAY_EXPONENT => "ack_delay_exponent",
            Self::MAX_ACK_DELAY => "max_ack_delay",
            Self::DISABLE_ACTIVE_MIGRATION => "disable_active_migration",
            Self::PREFERRED_ADDRESS => "preferred_address",
            Self::ACTIVE_CONNECTION_ID_LIMIT => "active_connection_id_limit",
            Self::INITIAL_SOURCE_CONNECTION_ID => "initial_source_connection_id",
            Self::RETRY_SOURCE_CONNECTION_ID => "retry_source_connection_id",
            _ => return None,
        })
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown parameter {:#x}", self.0),
        }
    }
}

/// A transport parameter, its value is opaque until interpreted by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParameter {
    pub id: ParameterId,
    pub value: Bytes,
}

impl TransportParameter {
    pub fn new(id: ParameterId, value: Bytes) -> Self {
        Self { id, value }
    }

    /// An integer-valued parameter, the value encoded as a varint.
    pub fn integer(id: ParameterId, value: VarInt) -> Self {
        let mut buf = Vec::with_capacity(value.encoding_size());
        buf.put_varint(&value);
        Self::new(id, Bytes::from(buf))
    }

    /// A presence-only parameter, with an empty value.
    pub fn flag(id: ParameterId) -> Self {
        Self::new(id, Bytes::new())
    }
}

/// Look up the first parameter with `id` and decode its value as an integer.
///
/// Returns `Ok(None)` if the parameter is absent; the value must be exactly one
/// varint.
pub fn get_integer_parameter(
    id: ParameterId,
    parameters: &[TransportParameter],
) -> Result<Option<u64>, Error> {
    let Some(parameter) = parameters.iter().find(|p| p.id == id) else {
        return Ok(None);
    };
    let mut value = &parameter.value[..];
    let (integer, _) = value
        .try_get_varint()
        .map_err(|_| Error::InvalidInteger(id))?;
    if !value.is_empty() {
        return Err(Error::InvalidInteger(id));
    }
    Ok(Some(integer.into_inner()))
}

/// Whether a presence-only parameter is present.
pub fn has_parameter(id: ParameterId, parameters: &[TransportParameter]) -> bool {
    parameters.iter().any(|p| p.id == id)
}

/// A TLS extension as carried in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub ext_type: u16,
    pub data: Bytes,
}

/// Encode `parameters` into the transport parameters extension of `version`.
pub fn encode_extension(
    parameters: &[TransportParameter],
    version: Version,
) -> Result<Extension, Error> {
    Ok(Extension {
        ext_type: version.extension_type(),
        data: io::encode_parameters(parameters, version.layout())?,
    })
}

fn find_parameters(
    extensions: &[Extension],
    version: Version,
) -> Result<Option<Vec<TransportParameter>>, Error> {
    let Some(ext) = extensions
        .iter()
        .find(|ext| ext.ext_type == version.extension_type())
    else {
        return Ok(None);
    };
    io::decode_parameters(&ext.data, version.layout())
        .inspect_err(|e| tracing::warn!(?version, "failed to decode transport parameters: {e}"))
        .map(Some)
}

/// The transport parameters a client sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientTransportParameters {
    pub parameters: Vec<TransportParameter>,
}

/// The transport parameters a server sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerTransportParameters {
    pub parameters: Vec<TransportParameter>,
}

/// The server's transport parameters remembered with a session ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketTransportParameters {
    pub parameters: Vec<TransportParameter>,
}

/// Find and decode the client's transport parameters in `extensions`.
///
/// Parameters only a server may send are rejected.
pub fn get_client_extension(
    extensions: &[Extension],
    version: Version,
) -> Result<Option<ClientTransportParameters>, Error> {
    let Some(parameters) = find_parameters(extensions, version)? else {
        return Ok(None);
    };
    if let Some(parameter) = parameters.iter().find(|p| p.id.is_server_only()) {
        tracing::warn!(?version, "client sent {}", parameter.id);
        return Err(Error::ServerOnly(parameter.id));
    }
    Ok(Some(ClientTransportParameters { parameters }))
}

/// Find and decode the server's transport parameters in `extensions`.
pub fn get_server_extension(
    extensions: &[Extension],
    version: Version,
) -> Result<Option<ServerTransportParameters>, Error> {
    Ok(find_parameters(extensions, version)?.map(|parameters| ServerTransportParameters { parameters }))
}

/// Find and decode the transport parameters remembered in a session ticket.
pub fn get_ticket_extension(
    extensions: &[Extension],
    version: Version,
) -> Result<Option<TicketTransportParameters>, Error> {
    Ok(find_parameters(extensions, version)?.map(|parameters| TicketTransportParameters { parameters }))
}

impl ClientTransportParameters {
    pub fn encode(&self, version: Version) -> Result<Extension, Error> {
        encode_extension(&self.parameters, version)
    }
}

impl ServerTransportParameters {
    pub fn encode(&self, version: Version) -> Result<Extension, Error> {
        encode_extension(&self.parameters, version)
    }
}

impl TicketTransportParameters {
    pub fn encode(&self, version: Version) -> Result<Extension, Error> {
        encode_extension(&self.parameters, version)
    }
}
