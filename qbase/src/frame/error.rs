use thiserror::Error;

use super::FrameType;
use crate::{
    error::{ErrorKind as TransportErrorKind, QuicError as TransportError},
    packet::Epoch,
    varint::VarInt,
};

/// Parse errors when decoding QUIC frames.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum Error {
    #[error("A packet containing no frames")]
    NoFrames,
    #[error("Incomplete frame type: {0}")]
    IncompleteType(String),
    #[error("Invalid frame type from {0}")]
    InvalidType(VarInt),
    #[error("Wrong frame type {0:?} in {1} packet")]
    WrongType(FrameType, Epoch),
    #[error("Incomplete frame {0:?}: {1}")]
    IncompleteFrame(FrameType, String),
    #[error("Error occurred when parsing frame {0:?}: {1}")]
    ParseError(FrameType, String),
    /// ACK, NEW_TOKEN, connection id and path frames are read by other layers
    /// before the payload reaches this crate.
    #[error("Frame {0:?} is not handled here")]
    Unsupported(FrameType),
}

impl From<Error> for TransportError {
    fn from(e: Error) -> Self {
        tracing::error!("   Cause by: parse frame error {e}");
        match e {
            // An endpoint MUST treat receipt of a packet containing no frames as a connection error of type PROTOCOL_VIOLATION.
            Error::NoFrames => {
                Self::with_default_fty(TransportErrorKind::ProtocolViolation, e.to_string())
            }
            Error::IncompleteType(_) | Error::InvalidType(_) => {
                Self::with_default_fty(TransportErrorKind::FrameEncoding, e.to_string())
            }
            Error::WrongType(fty, _) => {
                Self::new(TransportErrorKind::ProtocolViolation, fty, e.to_string())
            }
            Error::IncompleteFrame(fty, _) | Error::ParseError(fty, _) => {
                Self::new(TransportErrorKind::FrameEncoding, fty, e.to_string())
            }
            Error::Unsupported(fty) => Self::new(TransportErrorKind::Internal, fty, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_to_transport_error() {
        let cases = vec![
            (Error::NoFrames, TransportErrorKind::ProtocolViolation),
            (
                Error::IncompleteType("test".to_string()),
                TransportErrorKind::FrameEncoding,
            ),
            (
                Error::InvalidType(VarInt::from_u32(0x1f)),
                TransportErrorKind::FrameEncoding,
            ),
            (
                Error::WrongType(FrameType::Stream(0), Epoch::Initial),
                TransportErrorKind::ProtocolViolation,
            ),
            (
                Error::IncompleteFrame(FrameType::Ping, "incomplete".to_string()),
                TransportErrorKind::FrameEncoding,
            ),
            (
                Error::ParseError(FrameType::Ping, "parse error".to_string()),
                TransportErrorKind::FrameEncoding,
            ),
            (
                Error::Unsupported(FrameType::Ack(0)),
                TransportErrorKind::Internal,
            ),
        ];

        for (error, expected_kind) in cases {
            let transport_error: TransportError = error.into();
            assert_eq!(transport_error.kind(), expected_kind);
        }
    }

    #[test]
    fn test_error_display() {
        let error = Error::NoFrames;
        assert_eq!(error.to_string(), "A packet containing no frames");

        let error = Error::InvalidType(VarInt::from_u32(0x1f));
        assert_eq!(error.to_string(), "Invalid frame type from 31");

        let error = Error::WrongType(FrameType::Crypto, Epoch::Data);
        assert_eq!(error.to_string(), "Wrong frame type Crypto in data packet");
    }
}
