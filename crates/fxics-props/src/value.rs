//! Typed property values and their per-type wire encoding.

use std::fmt;
use std::io::{Read, Seek, Write};

use binrw::{Endian, prelude::*};
use fxics_dtyp::{FileTime, Guid};

use crate::tag::PropertyType;

/// Error detail carried inside `binrw::Error::Custom` for codec
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    UnsupportedType(u16),
    ValueTypeMismatch { expected: u16 },
    InvalidString,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnsupportedType(t) => write!(f, "unsupported property type {t:#06x}"),
            CodecError::ValueTypeMismatch { expected } => {
                write!(f, "value does not match property type {expected:#06x}")
            }
            CodecError::InvalidString => write!(f, "malformed string payload"),
        }
    }
}

impl std::error::Error for CodecError {}

/// A decoded property value.
///
/// `Long` also carries the wire form of `Error` and `Object` typed
/// properties; the tag's type code decides the interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    I2(u16),
    Long(u32),
    Double(f64),
    I8(u64),
    Bool(bool),
    String8(String),
    Unicode(String),
    Binary(Vec<u8>),
    ServerId(Vec<u8>),
    Clsid(Guid),
    SysTime(FileTime),
    Null,
    MvI2(Vec<u16>),
    MvLong(Vec<u32>),
    MvI8(Vec<u64>),
    MvBinary(Vec<Vec<u8>>),
    MvUnicode(Vec<String>),
}

/// Number of UTF-16 bytes a string occupies on the wire, terminator
/// included.
pub fn utf16_wire_len(s: &str) -> u32 {
    (s.encode_utf16().count() as u32) * 2 + 2
}

fn write_utf16<W: Write + Seek>(s: &str, writer: &mut W) -> BinResult<()> {
    for unit in s.encode_utf16() {
        unit.write_options(writer, Endian::Little, ())?;
    }
    0u16.write_options(writer, Endian::Little, ())
}

fn read_utf16<R: Read + Seek>(reader: &mut R, byte_count: u32) -> BinResult<String> {
    if byte_count < 2 || byte_count % 2 != 0 {
        return Err(codec_err(reader, CodecError::InvalidString));
    }
    let mut units = Vec::with_capacity((byte_count / 2 - 1) as usize);
    for _ in 0..byte_count / 2 {
        units.push(u16::read_options(reader, Endian::Little, ())?);
    }
    if units.pop() != Some(0) {
        return Err(codec_err(reader, CodecError::InvalidString));
    }
    String::from_utf16(&units).map_err(|_| codec_err(reader, CodecError::InvalidString))
}

pub(crate) fn codec_err<S: Seek>(stream: &mut S, err: CodecError) -> binrw::Error {
    binrw::Error::Custom {
        pos: stream.stream_position().unwrap_or(0),
        err: Box::new(err),
    }
}

impl PropertyValue {
    /// Encodes the value as dictated by the tag's type code. A value
    /// whose variant does not match the type code is a caller bug and
    /// fails with `ValueTypeMismatch`.
    pub fn write<W: Write + Seek>(&self, prop_type: PropertyType, writer: &mut W) -> BinResult<()> {
        let endian = Endian::Little;
        if prop_type.is_multi_valued() {
            return self.write_multi(prop_type.base(), writer);
        }
        match (prop_type, self) {
            (PropertyType::BOOLEAN, PropertyValue::Bool(v)) => {
                u16::from(*v).write_options(writer, endian, ())
            }
            (PropertyType::I2, PropertyValue::I2(v)) => v.write_options(writer, endian, ()),
            (PropertyType::LONG | PropertyType::ERROR | PropertyType::OBJECT, PropertyValue::Long(v)) => {
                v.write_options(writer, endian, ())
            }
            (PropertyType::DOUBLE, PropertyValue::Double(v)) => v.write_options(writer, endian, ()),
            (PropertyType::I8, PropertyValue::I8(v)) => v.write_options(writer, endian, ()),
            (PropertyType::SYSTIME, PropertyValue::SysTime(v)) => v.write_options(writer, endian, ()),
            (PropertyType::STRING8, PropertyValue::String8(s)) => {
                let len = s.len() as u32 + 1;
                len.write_options(writer, endian, ())?;
                s.as_bytes().write_options(writer, endian, ())?;
                0u8.write_options(writer, endian, ())
            }
            (PropertyType::UNICODE, PropertyValue::Unicode(s)) => {
                utf16_wire_len(s).write_options(writer, endian, ())?;
                write_utf16(s, writer)
            }
            (PropertyType::BINARY, PropertyValue::Binary(data))
            | (PropertyType::SVREID, PropertyValue::ServerId(data))
            | (PropertyType::SVREID, PropertyValue::Binary(data)) => {
                (data.len() as u32).write_options(writer, endian, ())?;
                data.write_options(writer, endian, ())
            }
            (PropertyType::CLSID, PropertyValue::Clsid(guid)) => {
                guid.write_options(writer, endian, ())
            }
            (PropertyType::NULL, _) => Ok(()),
            (
                PropertyType::I2
                | PropertyType::LONG
                | PropertyType::ERROR
                | PropertyType::OBJECT
                | PropertyType::DOUBLE
                | PropertyType::I8
                | PropertyType::BOOLEAN
                | PropertyType::STRING8
                | PropertyType::UNICODE
                | PropertyType::BINARY
                | PropertyType::SVREID
                | PropertyType::CLSID
                | PropertyType::SYSTIME,
                _,
            ) => Err(codec_err(
                writer,
                CodecError::ValueTypeMismatch {
                    expected: prop_type.0,
                },
            )),
            _ => Err(codec_err(writer, CodecError::UnsupportedType(prop_type.0))),
        }
    }

    fn write_multi<W: Write + Seek>(&self, base: PropertyType, writer: &mut W) -> BinResult<()> {
        let endian = Endian::Little;
        match (base, self) {
            (PropertyType::I2, PropertyValue::MvI2(values)) => {
                (values.len() as u32).write_options(writer, endian, ())?;
                for v in values {
                    v.write_options(writer, endian, ())?;
                }
                Ok(())
            }
            (PropertyType::LONG, PropertyValue::MvLong(values)) => {
                (values.len() as u32).write_options(writer, endian, ())?;
                for v in values {
                    v.write_options(writer, endian, ())?;
                }
                Ok(())
            }
            (PropertyType::I8, PropertyValue::MvI8(values)) => {
                (values.len() as u32).write_options(writer, endian, ())?;
                for v in values {
                    v.write_options(writer, endian, ())?;
                }
                Ok(())
            }
            (PropertyType::BINARY, PropertyValue::MvBinary(values)) => {
                (values.len() as u32).write_options(writer, endian, ())?;
                for data in values {
                    (data.len() as u32).write_options(writer, endian, ())?;
                    data.write_options(writer, endian, ())?;
                }
                Ok(())
            }
            (PropertyType::UNICODE, PropertyValue::MvUnicode(values)) => {
                (values.len() as u32).write_options(writer, endian, ())?;
                for s in values {
                    utf16_wire_len(s).write_options(writer, endian, ())?;
                    write_utf16(s, writer)?;
                }
                Ok(())
            }
            (
                PropertyType::I2
                | PropertyType::LONG
                | PropertyType::I8
                | PropertyType::BINARY
                | PropertyType::UNICODE,
                _,
            ) => Err(codec_err(
                writer,
                CodecError::ValueTypeMismatch {
                    expected: base.0 | PropertyType::MV_FLAG,
                },
            )),
            _ => Err(codec_err(
                writer,
                CodecError::UnsupportedType(base.0 | PropertyType::MV_FLAG),
            )),
        }
    }

    /// Decodes a value as dictated by the tag's type code.
    pub fn read<R: Read + Seek>(prop_type: PropertyType, reader: &mut R) -> BinResult<Self> {
        let endian = Endian::Little;
        if prop_type.is_multi_valued() {
            return Self::read_multi(prop_type.base(), reader);
        }
        Ok(match prop_type {
            PropertyType::BOOLEAN => {
                PropertyValue::Bool(u16::read_options(reader, endian, ())? != 0)
            }
            PropertyType::I2 => PropertyValue::I2(u16::read_options(reader, endian, ())?),
            PropertyType::LONG | PropertyType::ERROR | PropertyType::OBJECT => {
                PropertyValue::Long(u32::read_options(reader, endian, ())?)
            }
            PropertyType::DOUBLE => PropertyValue::Double(f64::read_options(reader, endian, ())?),
            PropertyType::I8 => PropertyValue::I8(u64::read_options(reader, endian, ())?),
            PropertyType::SYSTIME => {
                PropertyValue::SysTime(FileTime::read_options(reader, endian, ())?)
            }
            PropertyType::STRING8 => {
                let len = u32::read_options(reader, endian, ())?;
                if len == 0 {
                    return Err(codec_err(reader, CodecError::InvalidString));
                }
                let mut bytes = vec![0u8; len as usize];
                reader.read_exact(&mut bytes)?;
                if bytes.pop() != Some(0) {
                    return Err(codec_err(reader, CodecError::InvalidString));
                }
                PropertyValue::String8(
                    String::from_utf8(bytes)
                        .map_err(|_| codec_err(reader, CodecError::InvalidString))?,
                )
            }
            PropertyType::UNICODE => {
                let byte_count = u32::read_options(reader, endian, ())?;
                PropertyValue::Unicode(read_utf16(reader, byte_count)?)
            }
            PropertyType::BINARY | PropertyType::SVREID => {
                let len = u32::read_options(reader, endian, ())?;
                let mut data = vec![0u8; len as usize];
                reader.read_exact(&mut data)?;
                if prop_type == PropertyType::SVREID {
                    PropertyValue::ServerId(data)
                } else {
                    PropertyValue::Binary(data)
                }
            }
            PropertyType::CLSID => PropertyValue::Clsid(Guid::read_options(reader, endian, ())?),
            PropertyType::NULL => PropertyValue::Null,
            other => return Err(codec_err(reader, CodecError::UnsupportedType(other.0))),
        })
    }

    fn read_multi<R: Read + Seek>(base: PropertyType, reader: &mut R) -> BinResult<Self> {
        let endian = Endian::Little;
        let count = u32::read_options(reader, endian, ())? as usize;
        Ok(match base {
            PropertyType::I2 => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(u16::read_options(reader, endian, ())?);
                }
                PropertyValue::MvI2(values)
            }
            PropertyType::LONG => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(u32::read_options(reader, endian, ())?);
                }
                PropertyValue::MvLong(values)
            }
            PropertyType::I8 => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(u64::read_options(reader, endian, ())?);
                }
                PropertyValue::MvI8(values)
            }
            PropertyType::BINARY => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let len = u32::read_options(reader, endian, ())? as usize;
                    let mut data = vec![0u8; len];
                    reader.read_exact(&mut data)?;
                    values.push(data);
                }
                PropertyValue::MvBinary(values)
            }
            PropertyType::UNICODE => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let byte_count = u32::read_options(reader, endian, ())?;
                    values.push(read_utf16(reader, byte_count)?);
                }
                PropertyValue::MvUnicode(values)
            }
            other => {
                return Err(codec_err(
                    reader,
                    CodecError::UnsupportedType(other.0 | PropertyType::MV_FLAG),
                ));
            }
        })
    }
}
