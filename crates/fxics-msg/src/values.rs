//! Dynamic value containers shared by the ROP structures.

use std::io::{Read, Seek, Write};
use std::ops::Deref;

use binrw::{Endian, prelude::*};
use fxics_props::{PropertyTag, PropertyValue};

/// A `(tag, value)` pair whose value layout follows the tag's type
/// code.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPropertyValue {
    pub tag: PropertyTag,
    pub value: PropertyValue,
}

impl TaggedPropertyValue {
    pub fn new(tag: PropertyTag, value: PropertyValue) -> Self {
        TaggedPropertyValue { tag, value }
    }
}

impl BinRead for TaggedPropertyValue {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let tag = PropertyTag::read_options(reader, endian, ())?;
        let value = PropertyValue::read(tag.prop_type(), reader)?;
        Ok(TaggedPropertyValue { tag, value })
    }
}

impl BinWrite for TaggedPropertyValue {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.tag.write_options(writer, endian, ())?;
        self.value.write(self.tag.prop_type(), writer)
    }
}

/// A `u16`-counted array of tagged property values.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Default)]
#[brw(little)]
pub struct PropertyValueArray {
    #[bw(try_calc = values.len().try_into())]
    #[br(temp)]
    count: u16,
    #[br(count = count)]
    pub values: Vec<TaggedPropertyValue>,
}

impl PropertyValueArray {
    pub fn new(values: Vec<TaggedPropertyValue>) -> Self {
        PropertyValueArray { values }
    }
}

impl Deref for PropertyValueArray {
    type Target = [TaggedPropertyValue];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl From<Vec<TaggedPropertyValue>> for PropertyValueArray {
    fn from(values: Vec<TaggedPropertyValue>) -> Self {
        PropertyValueArray { values }
    }
}

/// A `u32`-sized opaque blob, used for the replica-GUID-prefixed id
/// blobs of the move ROP.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[brw(little)]
pub struct SizedBlob {
    #[bw(try_calc = data.len().try_into())]
    #[br(temp)]
    size: u32,
    #[br(count = size)]
    pub data: Vec<u8>,
}

impl From<Vec<u8>> for SizedBlob {
    fn from(data: Vec<u8>) -> Self {
        SizedBlob { data }
    }
}

impl Deref for SizedBlob {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// One entry of a read-state-changes upload:
/// `(mid_blob_size, mid_blob, mark_as_read)`.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct MessageReadState {
    #[bw(try_calc = message_id.len().try_into())]
    #[br(temp)]
    message_id_size: u16,
    /// Replica GUID followed by the globcnt bytes.
    #[br(count = message_id_size)]
    pub message_id: Vec<u8>,
    #[br(map = |v: u8| v != 0)]
    #[bw(map = |v: &bool| u8::from(*v))]
    pub mark_as_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_props::{PropertyType, pidtag};
    use fxics_tests::*;

    test_binrw! {
        TaggedPropertyValue: TaggedPropertyValue::new(
            pidtag::MESSAGE_SIZE,
            PropertyValue::Long(0x1000),
        ) => "0300080e00100000"
    }

    test_binrw! {
        SizedBlob: SizedBlob::from(vec![0xaa, 0xbb]) => "02000000aabb"
    }

    test_binrw! {
        MessageReadState: MessageReadState {
            message_id: vec![0x11, 0x22, 0x33],
            mark_as_read: true,
        } => "030011223301"
    }

    #[test]
    fn property_value_array_roundtrip() {
        let array = PropertyValueArray::new(vec![
            TaggedPropertyValue::new(
                pidtag::DISPLAY_NAME,
                PropertyValue::Unicode("Inbox".into()),
            ),
            TaggedPropertyValue::new(
                PropertyTag::new(0x0E08, PropertyType::LONG),
                PropertyValue::Long(42),
            ),
        ]);
        let mut cursor = std::io::Cursor::new(Vec::new());
        array.write_le(&mut cursor).unwrap();
        let bytes = cursor.into_inner();
        let parsed =
            PropertyValueArray::read_le(&mut std::io::Cursor::new(&bytes)).unwrap();
        assert_eq!(parsed, array);
    }
}
