// CONNECTION_CLOSE Frame {
//   Type (i) = 0x1c..0x1d,
//   Error Code (i),
//   [Frame Type (i)],
//   Reason Phrase Length (i),
//   Reason Phrase (..),
// }

use super::FrameType;
use crate::{
    error::ErrorKind,
    varint::{VarInt, WriteVarInt, be_varint},
};

/// CONNECTION_CLOSE frame, notifying the peer that the connection is being closed.
///
/// The transport variant (0x1c) carries the type of the frame that triggered the
/// error, the application variant (0x1d) does not.
///
/// See [CONNECTION_CLOSE Frames](https://www.rfc-editor.org/rfc/rfc9000.html#name-connection_close-frames)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCloseFrame {
    error_code: VarInt,
    frame_type: Option<FrameType>,
    reason: String,
}

const CONNECTION_CLOSE_FRAME_TYPE: u8 = 0x1c;

const QUIC_LAYER: u8 = 0;
const APP_LAYER: u8 = 1;

impl super::BeFrame for ConnectionCloseFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::ConnectionClose(self.layer())
    }

    fn max_encoding_size(&self) -> usize {
        1 + 8 + if self.frame_type.is_some() { 8 } else { 0 } + 8 + self.reason.len()
    }

    fn encoding_size(&self) -> usize {
        1 + self.error_code.encoding_size()
            + self
                .frame_type
                .map_or(0, |fty| VarInt::from(fty).encoding_size())
            + VarInt(self.reason.len() as u64).encoding_size()
            + self.reason.len()
    }
}

impl ConnectionCloseFrame {
    /// Create a transport-layer CONNECTION_CLOSE frame.
    pub fn new_transport(error_code: VarInt, frame_type: FrameType, reason: String) -> Self {
        Self {
            error_code,
            frame_type: Some(frame_type),
            reason,
        }
    }

    /// Create an application-layer CONNECTION_CLOSE frame.
    pub fn new_app(error_code: VarInt, reason: String) -> Self {
        Self {
            error_code,
            frame_type: None,
            reason,
        }
    }

    pub fn error_code(&self) -> u64 {
        self.error_code.into_inner()
    }

    /// The transport error kind, for the transport variant with a known code.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.frame_type?;
        ErrorKind::try_from(self.error_code).ok()
    }

    /// The type of the frame that caused the error, absent in the application variant.
    pub fn caused_by(&self) -> Option<FrameType> {
        self.frame_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn layer(&self) -> u8 {
        if self.frame_type.is_some() {
            QUIC_LAYER
        } else {
            APP_LAYER
        }
    }
}

/// Return a parser for a CONNECTION_CLOSE frame of the given layer,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn connection_close_frame_at_layer(
    layer: u8,
) -> impl Fn(&[u8]) -> nom::IResult<&[u8], ConnectionCloseFrame> {
    use nom::bytes::streaming::take;

    move |input: &[u8]| {
        let (remain, error_code) = be_varint(input)?;
        // The application-specific variant of CONNECTION_CLOSE (type 0x1d) does not include frame_type field.
        let (remain, frame_type) = if layer == QUIC_LAYER {
            let (remain, frame_type) = be_varint(remain)?;
            let frame_type = FrameType::try_from(frame_type).map_err(|_| {
                nom::Err::Error(nom::error::make_error(input, nom::error::ErrorKind::Verify))
            })?;
            (remain, Some(frame_type))
        } else {
            (remain, None)
        };
        let (remain, reason_length) = be_varint(remain)?;
        let (remain, reason) = take(reason_length.into_inner() as usize)(remain)?;
        Ok((
            remain,
            ConnectionCloseFrame {
                error_code,
                frame_type,
                reason: String::from_utf8_lossy(reason).into_owned(),
            },
        ))
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<ConnectionCloseFrame> for T {
    fn put_frame(&mut self, frame: &ConnectionCloseFrame) {
        self.put_u8(CONNECTION_CLOSE_FRAME_TYPE | frame.layer());
        self.put_varint(&frame.error_code);
        if let Some(frame_type) = frame.frame_type {
            self.put_varint(&frame_type.into());
        }
        self.put_varint(&VarInt(frame.reason.len() as u64));
        self.put_slice(frame.reason.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BeFrame, io::WriteFrame};

    #[test]
    fn test_transport_connection_close_frame() {
        let frame = ConnectionCloseFrame::new_transport(
            ErrorKind::FlowControl.into(),
            FrameType::Stream(0b010),
            "wrong".to_string(),
        );
        assert_eq!(frame.encoding_size(), 1 + 1 + 1 + 1 + 5);
        assert_eq!(frame.error_kind(), Some(ErrorKind::FlowControl));

        let mut buf = Vec::new();
        buf.put_frame(&frame);
        assert_eq!(
            buf,
            vec![0x1c, 0x03, 0x0a, 0x05, b'w', b'r', b'o', b'n', b'g']
        );

        let (remain, parsed) = connection_close_frame_at_layer(QUIC_LAYER)(&buf[1..]).unwrap();
        assert!(remain.is_empty());
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_app_connection_close_frame() {
        let frame = ConnectionCloseFrame::new_app(VarInt::from_u32(0x42), String::new());
        assert_eq!(frame.caused_by(), None);
        assert_eq!(frame.error_kind(), None);
        assert_eq!(frame.frame_type(), FrameType::ConnectionClose(1));

        let mut buf = Vec::new();
        buf.put_frame(&frame);
        assert_eq!(buf, vec![0x1d, 0x40, 0x42, 0x00]);
        let (_, parsed) = connection_close_frame_at_layer(APP_LAYER)(&buf[1..]).unwrap();
        assert_eq!(parsed, frame);
    }
}
