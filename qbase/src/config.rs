use std::{ops::RangeInclusive, time::Duration};

use derive_builder::Builder;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};

use crate::{
    param::{Error, ParameterId, TransportParameter, get_integer_parameter, has_parameter},
    varint::{VARINT_MAX, VarInt},
};

/// The transport settings of one endpoint.
///
/// Locally it is what the endpoint advertises, built with [`TransportConfig::builder`]
/// or loaded from a file; for the peer it is reconstructed from the transport
/// parameters it sent with [`TransportConfig::from_parameters`].
///
/// ```
/// use std::time::Duration;
/// use qbase::config::TransportConfig;
///
/// let config = TransportConfig::builder()
///     .initial_max_data(1u64 << 20)
///     .max_idle_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.initial_max_data(), 1 << 20);
/// assert_eq!(config.ack_delay_exponent(), 3);
/// ```
#[derive(Builder, CopyGetters, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(default, setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct TransportConfig {
    /// Zero disables the idle timeout.
    #[getset(get_copy = "pub")]
    max_idle_timeout: Duration,
    #[getset(get_copy = "pub")]
    max_udp_payload_size: u64,
    #[getset(get_copy = "pub")]
    initial_max_data: u64,
    #[getset(get_copy = "pub")]
    initial_max_stream_data_bidi_local: u64,
    #[getset(get_copy = "pub")]
    initial_max_stream_data_bidi_remote: u64,
    #[getset(get_copy = "pub")]
    initial_max_stream_data_uni: u64,
    #[getset(get_copy = "pub")]
    initial_max_streams_bidi: u64,
    #[getset(get_copy = "pub")]
    initial_max_streams_uni: u64,
    #[getset(get_copy = "pub")]
    ack_delay_exponent: u8,
    #[getset(get_copy = "pub")]
    max_ack_delay: Duration,
    #[getset(get_copy = "pub")]
    active_connection_id_limit: u64,
    #[getset(get_copy = "pub")]
    disable_active_migration: bool,
}

const MAX_UDP_PAYLOAD_SIZE: RangeInclusive<u64> = 1200..=65527;
const ACK_DELAY_EXPONENT: RangeInclusive<u64> = 0..=20;
const MAX_ACK_DELAY_MS: RangeInclusive<u64> = 0..=(1 << 14) - 1;
const ACTIVE_CONNECTION_ID_LIMIT: RangeInclusive<u64> = 2..=VARINT_MAX;
const MAX_STREAMS: RangeInclusive<u64> = 0..=1 << 60;
const ANY: RangeInclusive<u64> = 0..=VARINT_MAX;

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_timeout: Duration::from_secs(30),
            max_udp_payload_size: 65527,
            initial_max_data: 1 << 20,
            initial_max_stream_data_bidi_local: 1 << 18,
            initial_max_stream_data_bidi_remote: 1 << 18,
            initial_max_stream_data_uni: 1 << 18,
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            ack_delay_exponent: 3,
            max_ack_delay: Duration::from_millis(25),
            active_connection_id_limit: 2,
            disable_active_migration: false,
        }
    }
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// The transport parameters advertising this configuration.
    pub fn to_parameters(&self) -> Vec<TransportParameter> {
        let integer = |id, value: u64| {
            TransportParameter::integer(id, VarInt::from_u64(value.min(VARINT_MAX)).unwrap_or_default())
        };
        let mut parameters = vec![
            integer(
                ParameterId::MAX_IDLE_TIMEOUT,
                self.max_idle_timeout.as_millis() as u64,
            ),
            integer(ParameterId::MAX_UDP_PAYLOAD_SIZE, self.max_udp_payload_size),
            integer(ParameterId::INITIAL_MAX_DATA, self.initial_max_data),
            integer(
                ParameterId::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL,
                self.initial_max_stream_data_bidi_local,
            ),
            integer(
                ParameterId::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE,
                self.initial_max_stream_data_bidi_remote,
            ),
            integer(
                ParameterId::INITIAL_MAX_STREAM_DATA_UNI,
                self.initial_max_stream_data_uni,
            ),
            integer(ParameterId::INITIAL_MAX_STREAMS_BIDI, self.initial_max_streams_bidi),
            integer(ParameterId::INITIAL_MAX_STREAMS_UNI, self.initial_max_streams_uni),
            integer(
                ParameterId::ACK_DELAY_EXPONENT,
                self.ack_delay_exponent as u64,
            ),
            integer(
                ParameterId::MAX_ACK_DELAY,
                self.max_ack_delay.as_millis() as u64,
            ),
            integer(
                ParameterId::ACTIVE_CONNECTION_ID_LIMIT,
                self.active_connection_id_limit,
            ),
        ];
        if self.disable_active_migration {
            parameters.push(TransportParameter::flag(
                ParameterId::DISABLE_ACTIVE_MIGRATION,
            ));
        }
        parameters
    }

    /// Reconstruct the settings a peer advertised.
    ///
    /// Absent parameters take their protocol defaults, which for the flow control
    /// limits is zero; values out of their allowed range are errors.
    pub fn from_parameters(parameters: &[TransportParameter]) -> Result<Self, Error> {
        let get = |id, default, bounds: RangeInclusive<u64>| -> Result<u64, Error> {
            let value = get_integer_parameter(id, parameters)?.unwrap_or(default);
            if !bounds.contains(&value) {
                return Err(Error::OutOfBounds(id, value, bounds));
            }
            Ok(value)
        };
        Ok(Self {
            max_idle_timeout: Duration::from_millis(get(ParameterId::MAX_IDLE_TIMEOUT, 0, ANY)?),
            max_udp_payload_size: get(
                ParameterId::MAX_UDP_PAYLOAD_SIZE,
                65527,
                MAX_UDP_PAYLOAD_SIZE,
            )?,
            initial_max_data: get(ParameterId::INITIAL_MAX_DATA, 0, ANY)?,
            initial_max_stream_data_bidi_local: get(
                ParameterId::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL,
                0,
                ANY,
            )?,
            initial_max_stream_data_bidi_remote: get(
                ParameterId::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE,
                0,
                ANY,
            )?,
            initial_max_stream_data_uni: get(ParameterId::INITIAL_MAX_STREAM_DATA_UNI, 0, ANY)?,
            initial_max_streams_bidi: get(ParameterId::INITIAL_MAX_STREAMS_BIDI, 0, MAX_STREAMS)?,
            initial_max_streams_uni: get(ParameterId::INITIAL_MAX_STREAMS_UNI, 0, MAX_STREAMS)?,
            ack_delay_exponent: get(ParameterId::ACK_DELAY_EXPONENT, 3, ACK_DELAY_EXPONENT)? as u8,
            max_ack_delay: Duration::from_millis(get(
                ParameterId::MAX_ACK_DELAY,
                25,
                MAX_ACK_DELAY_MS,
            )?),
            active_connection_id_limit: get(
                ParameterId::ACTIVE_CONNECTION_ID_LIMIT,
                2,
                ACTIVE_CONNECTION_ID_LIMIT,
            )?,
            disable_active_migration: has_parameter(
                ParameterId::DISABLE_ACTIVE_MIGRATION,
                parameters,
            ),
        })
    }
}

impl TransportConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let check = |id: ParameterId, value: Option<u64>, bounds: RangeInclusive<u64>| match value {
            Some(value) if !bounds.contains(&value) => Err(format!(
                "{id}'s value {value} is out of bounds {bounds:?}"
            )),
            _ => Ok(()),
        };
        check(
            ParameterId::MAX_UDP_PAYLOAD_SIZE,
            self.max_udp_payload_size,
            MAX_UDP_PAYLOAD_SIZE,
        )?;
        check(
            ParameterId::ACK_DELAY_EXPONENT,
            self.ack_delay_exponent.map(u64::from),
            ACK_DELAY_EXPONENT,
        )?;
        check(
            ParameterId::MAX_ACK_DELAY,
            self.max_ack_delay.map(|d| d.as_millis() as u64),
            MAX_ACK_DELAY_MS,
        )?;
        check(
            ParameterId::ACTIVE_CONNECTION_ID_LIMIT,
            self.active_connection_id_limit,
            ACTIVE_CONNECTION_ID_LIMIT,
        )?;
        check(
            ParameterId::INITIAL_MAX_STREAMS_BIDI,
            self.initial_max_streams_bidi,
            MAX_STREAMS,
        )?;
        check(
            ParameterId::INITIAL_MAX_STREAMS_UNI,
            self.initial_max_streams_uni,
            MAX_STREAMS,
        )?;
        for (id, value) in [
            (ParameterId::INITIAL_MAX_DATA, self.initial_max_data),
            (
                ParameterId::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL,
                self.initial_max_stream_data_bidi_local,
            ),
            (
                ParameterId::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE,
                self.initial_max_stream_data_bidi_remote,
            ),
            (
                ParameterId::INITIAL_MAX_STREAM_DATA_UNI,
                self.initial_max_stream_data_uni,
            ),
        ] {
            check(id, value, ANY)?;
        }
        Ok(())
    }
}
