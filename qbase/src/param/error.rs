use std::ops::RangeInclusive;

use thiserror::Error;

use super::{Layout, ParameterId};
use crate::{
    error::{ErrorKind, QuicError},
    frame::FrameType,
};

/// Error for QUIC transport parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("transport parameters are truncated")]
    Incomplete,
    #[error("{0} bytes remain after the transport parameters")]
    TrailingBytes(usize),
    #[error("{0} appears more than once")]
    Duplicate(ParameterId),
    #[error("{0} is only allowed in server transport parameters")]
    ServerOnly(ParameterId),
    #[error("{0} can't be encoded in the {1:?} layout")]
    TooLarge(ParameterId, Layout),
    #[error("{0}'s value is not a single variable-length integer")]
    InvalidInteger(ParameterId),
    #[error("{0}'s value {1} is out of bounds {2:?}")]
    OutOfBounds(ParameterId, u64, RangeInclusive<u64>),
}

impl From<Error> for QuicError {
    fn from(e: Error) -> Self {
        tracing::error!("   Cause by: {e}");
        QuicError::new(ErrorKind::TransportParameter, FrameType::Crypto, e.to_string())
    }
}
