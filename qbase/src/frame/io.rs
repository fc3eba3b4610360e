use bytes::Bytes;

use super::{
    connection_close::connection_close_frame_at_layer, crypto::be_crypto_frame,
    data_blocked::be_data_blocked_frame, max_data::be_max_data_frame,
    max_stream_data::be_max_stream_data_frame, reset_stream::be_reset_stream_frame,
    stop_sending::be_stop_sending_frame, stream::stream_frame_with_flag, *,
};
use crate::{packet::Epoch, varint::be_varint};

/// A [`bytes::BufMut`] extension trait, writes a frame without a body.
pub trait WriteFrame<F> {
    fn put_frame(&mut self, frame: &F);
}

/// A [`bytes::BufMut`] extension trait, writes a frame followed by its body.
///
/// The body length must be exactly the length the frame declares.
pub trait WriteDataFrame<F> {
    fn put_data_frame(&mut self, frame: &F, data: &[u8]);
}

/// Some frames like `STREAM` and `CRYPTO` have a data body, which is sliced out of `raw`
/// without copying.
fn complete_frame<'a>(
    frame_type: FrameType,
    raw: &Bytes,
    input: &'a [u8],
) -> nom::IResult<&'a [u8], Frame> {
    use nom::{Parser, combinator::map};
    match frame_type {
        FrameType::Padding => Ok((input, Frame::Padding(PaddingFrame))),
        FrameType::Ping => Ok((input, Frame::Ping(PingFrame))),
        FrameType::HandshakeDone => Ok((input, Frame::HandshakeDone(HandshakeDoneFrame))),
        FrameType::ConnectionClose(layer) => {
            map(connection_close_frame_at_layer(layer), Frame::Close).parse(input)
        }
        FrameType::MaxData => map(be_max_data_frame, Frame::MaxData).parse(input),
        FrameType::DataBlocked => map(be_data_blocked_frame, Frame::DataBlocked).parse(input),
        FrameType::ResetStream => {
            map(be_reset_stream_frame, |f| Frame::StreamCtl(f.into())).parse(input)
        }
        FrameType::StopSending => {
            map(be_stop_sending_frame, |f| Frame::StreamCtl(f.into())).parse(input)
        }
        FrameType::MaxStreamData => {
            map(be_max_stream_data_frame, |f| Frame::StreamCtl(f.into())).parse(input)
        }
        FrameType::Crypto => {
            let (input, frame) = be_crypto_frame(input)?;
            let start = raw.len() - input.len();
            let len = frame.len() as usize;
            if input.len() < len {
                Err(nom::Err::Incomplete(nom::Needed::new(len - input.len())))
            } else {
                let data = raw.slice(start..start + len);
                Ok((&input[len..], Frame::Crypto(frame, data)))
            }
        }
        FrameType::Stream(flag) => {
            let (input, frame) = stream_frame_with_flag(flag)(input)?;
            let start = raw.len() - input.len();
            let len = frame.len();
            if input.len() < len {
                Err(nom::Err::Incomplete(nom::Needed::new(len - input.len())))
            } else {
                let data = raw.slice(start..start + len);
                Ok((&input[len..], Frame::Stream(frame, data)))
            }
        }
        // Validated by the caller.
        _ => unreachable!("unsupported frame type {frame_type:?}"),
    }
}

/// Read one frame from the head of `raw`, a packet payload of `epoch`.
///
/// Returns the number of bytes consumed along with the frame. STREAM and CRYPTO
/// frames share their body with `raw`.
pub fn be_frame(raw: &Bytes, epoch: Epoch) -> Result<(usize, Frame), Error> {
    let input = raw.as_ref();
    let (remain, frame_type) =
        be_varint(input).map_err(|e| Error::IncompleteType(e.to_string()))?;
    let frame_type = FrameType::try_from(frame_type)?;
    if !frame_type.belongs_to(epoch) {
        return Err(Error::WrongType(frame_type, epoch));
    }
    if matches!(
        frame_type,
        FrameType::Ack(_)
            | FrameType::NewToken
            | FrameType::MaxStreams(_)
            | FrameType::StreamDataBlocked
            | FrameType::StreamsBlocked(_)
            | FrameType::NewConnectionId
            | FrameType::RetireConnectionId
            | FrameType::PathChallenge
            | FrameType::PathResponse
    ) {
        return Err(Error::Unsupported(frame_type));
    }

    let (remain, frame) = complete_frame(frame_type, raw, remain).map_err(|e| match e {
        ne @ nom::Err::Incomplete(_) => Error::IncompleteFrame(frame_type, ne.to_string()),
        nom::Err::Error(ne) | nom::Err::Failure(ne) => {
            // may be TooLarge in StreamFrame, or Verify in ConnectionCloseFrame
            Error::ParseError(frame_type, format!("{:?}", ne.code))
        }
    })?;
    Ok((input.len() - remain.len(), frame))
}
