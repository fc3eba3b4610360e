use std::{borrow::Cow, fmt};

use thiserror::Error;

use crate::{
    frame::{ConnectionCloseFrame, FrameType},
    varint::{self, VarInt},
};

/// QUIC transport error codes.
///
/// See [error codes](https://www.rfc-editor.org/rfc/rfc9000.html#name-transport-error-codes)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// An endpoint uses this with CONNECTION_CLOSE to signal that
    /// the connection is being closed abruptly in the absence of any error.
    None,
    /// The endpoint encountered an internal error and cannot continue with the connection.
    Internal,
    /// The server refused to accept a new connection.
    ConnectionRefused,
    /// An endpoint received more data than it permitted in its advertised data limits.
    FlowControl,
    /// An endpoint received a frame for a stream identifier that exceeded its advertised stream limit.
    StreamLimit,
    /// An endpoint received a frame for a stream that was not in a state that permitted that frame.
    StreamState,
    /// An endpoint received a STREAM frame or RESET_STREAM frame containing a different final size
    /// to the one already established, or exceeding it.
    FinalSize,
    /// An endpoint received a frame that was badly formatted.
    FrameEncoding,
    /// An endpoint received transport parameters that were badly formatted or otherwise in error.
    TransportParameter,
    /// The number of connection IDs provided by the peer exceeds the advertised limit.
    ConnectionIdLimit,
    /// An endpoint detected an error with protocol compliance that was not covered by more specific error codes.
    ProtocolViolation,
    /// A server received a client Initial that contained an invalid Token field.
    InvalidToken,
    /// The application or application protocol caused the connection to be closed.
    Application,
    /// An endpoint has received more data in CRYPTO frames than it can buffer.
    CryptoBufferExceeded,
    /// An endpoint detected errors in performing key updates.
    KeyUpdate,
    /// An endpoint has reached the confidentiality or integrity limit for the AEAD algorithm.
    AeadLimitReached,
    /// No viable network path exists.
    NoViablePath,
    /// The cryptographic handshake failed, carrying the TLS alert.
    Crypto(u8),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            ErrorKind::None => "No error",
            ErrorKind::Internal => "Implementation error",
            ErrorKind::ConnectionRefused => "Server refuses a connection",
            ErrorKind::FlowControl => "Flow control error",
            ErrorKind::StreamLimit => "Too many streams opened",
            ErrorKind::StreamState => "Frame received in invalid stream state",
            ErrorKind::FinalSize => "Change to final size",
            ErrorKind::FrameEncoding => "Frame encoding error",
            ErrorKind::TransportParameter => "Error in transport parameters",
            ErrorKind::ConnectionIdLimit => "Too many connection IDs received",
            ErrorKind::ProtocolViolation => "Generic protocol violation",
            ErrorKind::InvalidToken => "Invalid Token received",
            ErrorKind::Application => "Application error",
            ErrorKind::CryptoBufferExceeded => "CRYPTO data buffer overflowed",
            ErrorKind::KeyUpdate => "Invalid packet protection update",
            ErrorKind::AeadLimitReached => "Excessive use of packet protection keys",
            ErrorKind::NoViablePath => "No viable network path exists",
            ErrorKind::Crypto(x) => return write!(f, "TLS alert code: {x}"),
        };
        write!(f, "{description}")
    }
}

impl From<ErrorKind> for VarInt {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::None => VarInt(0x00),
            ErrorKind::Internal => VarInt(0x01),
            ErrorKind::ConnectionRefused => VarInt(0x02),
            ErrorKind::FlowControl => VarInt(0x03),
            ErrorKind::StreamLimit => VarInt(0x04),
            ErrorKind::StreamState => VarInt(0x05),
            ErrorKind::FinalSize => VarInt(0x06),
            ErrorKind::FrameEncoding => VarInt(0x07),
            ErrorKind::TransportParameter => VarInt(0x08),
            ErrorKind::ConnectionIdLimit => VarInt(0x09),
            ErrorKind::ProtocolViolation => VarInt(0x0a),
            ErrorKind::InvalidToken => VarInt(0x0b),
            ErrorKind::Application => VarInt(0x0c),
            ErrorKind::CryptoBufferExceeded => VarInt(0x0d),
            ErrorKind::KeyUpdate => VarInt(0x0e),
            ErrorKind::AeadLimitReached => VarInt(0x0f),
            ErrorKind::NoViablePath => VarInt(0x10),
            ErrorKind::Crypto(x) => VarInt(0x0100 + x as u64),
        }
    }
}

/// The error code is not one of the QUIC transport error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transport error code {0}")]
pub struct InvalidErrorKind(u64);

impl TryFrom<VarInt> for ErrorKind {
    type Error = InvalidErrorKind;

    fn try_from(value: VarInt) -> Result<Self, Self::Error> {
        Ok(match value.into_inner() {
            0x00 => ErrorKind::None,
            0x01 => ErrorKind::Internal,
            0x02 => ErrorKind::ConnectionRefused,
            0x03 => ErrorKind::FlowControl,
            0x04 => ErrorKind::StreamLimit,
            0x05 => ErrorKind::StreamState,
            0x06 => ErrorKind::FinalSize,
            0x07 => ErrorKind::FrameEncoding,
            0x08 => ErrorKind::TransportParameter,
            0x09 => ErrorKind::ConnectionIdLimit,
            0x0a => ErrorKind::ProtocolViolation,
            0x0b => ErrorKind::InvalidToken,
            0x0c => ErrorKind::Application,
            0x0d => ErrorKind::CryptoBufferExceeded,
            0x0e => ErrorKind::KeyUpdate,
            0x0f => ErrorKind::AeadLimitReached,
            0x10 => ErrorKind::NoViablePath,
            x @ 0x0100..=0x01ff => ErrorKind::Crypto((x & 0xff) as u8),
            x => return Err(InvalidErrorKind(x)),
        })
    }
}

/// A connection-level error: the connection must be closed with it.
///
/// Protocol violations found while dispatching frames to streams surface as this
/// error, carrying the type of the frame that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("QUIC transport error occured in {frame_type:?}, kind: {kind}, reason: {reason}")]
pub struct QuicError {
    kind: ErrorKind,
    frame_type: FrameType,
    reason: Cow<'static, str>,
}

impl QuicError {
    pub fn new<T: Into<Cow<'static, str>>>(
        kind: ErrorKind,
        frame_type: FrameType,
        reason: T,
    ) -> Self {
        Self {
            kind,
            frame_type,
            reason: reason.into(),
        }
    }

    /// Create an error which is not caused by a specific frame.
    pub fn with_default_fty<T: Into<Cow<'static, str>>>(kind: ErrorKind, reason: T) -> Self {
        Self::new(kind, FrameType::Padding, reason)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<varint::err::Overflow> for QuicError {
    fn from(e: varint::err::Overflow) -> Self {
        tracing::error!("   Cause by: {e}");
        Self::with_default_fty(ErrorKind::Internal, e.to_string())
    }
}

impl From<QuicError> for ConnectionCloseFrame {
    fn from(e: QuicError) -> Self {
        ConnectionCloseFrame::new_transport(e.kind.into(), e.frame_type, e.reason.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let kinds = [
            (ErrorKind::None, 0x00),
            (ErrorKind::FlowControl, 0x03),
            (ErrorKind::StreamState, 0x05),
            (ErrorKind::FinalSize, 0x06),
            (ErrorKind::TransportParameter, 0x08),
            (ErrorKind::ProtocolViolation, 0x0a),
            (ErrorKind::NoViablePath, 0x10),
            (ErrorKind::Crypto(0x28), 0x128),
        ];
        for (kind, code) in kinds {
            let varint: VarInt = kind.into();
            assert_eq!(varint.into_inner(), code);
            assert_eq!(ErrorKind::try_from(varint), Ok(kind));
        }
        assert_eq!(
            ErrorKind::try_from(VarInt::from_u32(0x11)),
            Err(InvalidErrorKind(0x11))
        );
    }

    #[test]
    fn test_quic_error_into_close_frame() {
        let error = QuicError::new(
            ErrorKind::StreamState,
            FrameType::StopSending,
            "stop sending on a receive-only stream",
        );
        assert_eq!(error.kind(), ErrorKind::StreamState);
        assert_eq!(error.reason(), "stop sending on a receive-only stream");

        let frame: ConnectionCloseFrame = error.into();
        assert_eq!(frame.error_kind(), Some(ErrorKind::StreamState));
        assert_eq!(frame.caused_by(), Some(FrameType::StopSending));
        assert_eq!(frame.reason(), "stop sending on a receive-only stream");
    }

    #[test]
    fn test_overflow_is_internal() {
        let overflow = VarInt::from_u64(u64::MAX).unwrap_err();
        let error: QuicError = overflow.into();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }
}
