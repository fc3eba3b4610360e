// PADDING Frame {
//   Type (i) = 0x00,
// }

/// PADDING frame, which has no semantic value.
///
/// See [PADDING Frames](https://www.rfc-editor.org/rfc/rfc9000.html#name-padding-frames)
/// of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaddingFrame;

const PADDING_FRAME_TYPE: u8 = 0x00;

impl super::BeFrame for PaddingFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::Padding
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<PaddingFrame> for T {
    fn put_frame(&mut self, _: &PaddingFrame) {
        self.put_u8(PADDING_FRAME_TYPE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BeFrame, FrameType, io::WriteFrame};

    #[test]
    fn test_write_padding_frame() {
        let mut buf = Vec::new();
        buf.put_frame(&PaddingFrame);
        assert_eq!(buf, vec![PADDING_FRAME_TYPE]);
        assert_eq!(PaddingFrame.frame_type(), FrameType::Padding);
        assert_eq!(PaddingFrame.encoding_size(), 1);
    }
}
