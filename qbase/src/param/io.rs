use bytes::{BufMut, Bytes, BytesMut};
use nom::{Parser, multi::length_data, number::streaming::be_u16};

use super::{Error, Extension, Layout, ParameterId, TransportParameter};
use crate::varint::{VarInt, WriteVarInt, be_varint};

/// Parse a TLS extension `{u16 type, u16 length, data}`,
/// [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_extension(input: &[u8]) -> nom::IResult<&[u8], Extension> {
    let (remain, ext_type) = be_u16(input)?;
    let (remain, data) = length_data(be_u16).parse(remain)?;
    Ok((
        remain,
        Extension {
            ext_type,
            data: Bytes::copy_from_slice(data),
        },
    ))
}

/// A [`bytes::BufMut`] extension trait, makes buffer more friendly to write
/// TLS extensions.
pub trait WriteExtension: BufMut {
    /// Write the extension, the data must not exceed 65535 bytes.
    fn put_extension(&mut self, ext: &Extension);
}

impl<T: BufMut> WriteExtension for T {
    fn put_extension(&mut self, ext: &Extension) {
        assert!(ext.data.len() <= u16::MAX as usize);
        self.put_u16(ext.ext_type);
        self.put_u16(ext.data.len() as u16);
        self.put_slice(&ext.data);
    }
}

// Flat: varint id, varint length, value.
fn be_flat_parameter(input: &[u8]) -> nom::IResult<&[u8], TransportParameter> {
    let (remain, id) = be_varint(input)?;
    let (remain, value) = length_data(be_varint).parse(remain)?;
    Ok((
        remain,
        TransportParameter::new(ParameterId::from(id.into_inner()), Bytes::copy_from_slice(value)),
    ))
}

// Nested: u16 id, u16 length, value.
fn be_nested_parameter(input: &[u8]) -> nom::IResult<&[u8], TransportParameter> {
    let (remain, id) = be_u16(input)?;
    let (remain, value) = length_data(be_u16).parse(remain)?;
    Ok((
        remain,
        TransportParameter::new(ParameterId::from(id as u64), Bytes::copy_from_slice(value)),
    ))
}

/// Decode the data of a transport parameters extension in the given layout.
///
/// The parameters must consume the data exactly, and no id may repeat.
pub(super) fn decode_parameters(
    mut input: &[u8],
    layout: Layout,
) -> Result<Vec<TransportParameter>, Error> {
    if layout == Layout::Nested {
        let (remain, total) =
            be_u16::<_, nom::error::Error<_>>(input).map_err(|_| Error::Incomplete)?;
        let total = total as usize;
        if remain.len() < total {
            return Err(Error::Incomplete);
        }
        if remain.len() > total {
            return Err(Error::TrailingBytes(remain.len() - total));
        }
        input = remain;
    }

    let mut parameters: Vec<TransportParameter> = Vec::new();
    while !input.is_empty() {
        let (remain, parameter) = match layout {
            Layout::Flat => be_flat_parameter(input),
            Layout::Nested => be_nested_parameter(input),
        }
        .map_err(|_| Error::Incomplete)?;
        if parameters.iter().any(|p| p.id == parameter.id) {
            return Err(Error::Duplicate(parameter.id));
        }
        parameters.push(parameter);
        input = remain;
    }
    Ok(parameters)
}

/// Encode the parameters as the data of a transport parameters extension.
pub(super) fn encode_parameters(
    parameters: &[TransportParameter],
    layout: Layout,
) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    match layout {
        Layout::Flat => {
            for parameter in parameters {
                let id = VarInt::from_u64(parameter.id.into())
                    .map_err(|_| Error::TooLarge(parameter.id, layout))?;
                let len = VarInt::try_from(parameter.value.len())
                    .map_err(|_| Error::TooLarge(parameter.id, layout))?;
                buf.put_varint(&id);
                buf.put_varint(&len);
                buf.put_slice(&parameter.value);
            }
        }
        Layout::Nested => {
            let mut body = BytesMut::new();
            for parameter in parameters {
                let too_large = |_| Error::TooLarge(parameter.id, layout);
                let id = u16::try_from(u64::from(parameter.id)).map_err(too_large)?;
                let len = u16::try_from(parameter.value.len()).map_err(too_large)?;
                body.put_u16(id);
                body.put_u16(len);
                body.put_slice(&parameter.value);
            }
            let total = u16::try_from(body.len()).map_err(|_| Error::Incomplete)?;
            buf.put_u16(total);
            buf.put_slice(&body);
        }
    }
    Ok(buf.freeze())
}
