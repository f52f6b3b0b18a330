//! Tag-and-value push/pull over an unaligned byte stream.
//!
//! [`PropertyWriter`] appends tag-prefixed values and markers to a flat
//! buffer while maintaining the parallel *cutmark* index: strictly
//! increasing byte offsets, one after every complete logical unit, at
//! which the stream may be split across transport chunks.
//!
//! [`PropertyReader`] is the symmetric pull side, used by tests and by
//! anything that needs to decode a produced stream.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use binrw::{Endian, prelude::*};
use fxics_dtyp::idset::IdSetGroup;
use fxics_dtyp::{Guid, IdSet};

use crate::pidtag::metatag;
use crate::tag::PropertyTag;
use crate::value::{CodecError, PropertyValue, codec_err};

/// The key half of a named-property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamedPropKey {
    /// Numeric dispid within the property set (`MNID_ID`).
    Id(u32),
    /// String name within the property set (`MNID_STRING`).
    Name(String),
}

/// A named-property name: property-set GUID plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedPropName {
    pub guid: Guid,
    pub key: NamedPropKey,
}

impl NamedPropName {
    pub fn by_id(guid: Guid, id: u32) -> Self {
        NamedPropName {
            guid,
            key: NamedPropKey::Id(id),
        }
    }

    pub fn by_name(guid: Guid, name: impl Into<String>) -> Self {
        NamedPropName {
            guid,
            key: NamedPropKey::Name(name.into()),
        }
    }

    /// The wire discriminant: 0 for numeric keys, 1 for string keys.
    pub fn kind_byte(&self) -> u8 {
        match self.key {
            NamedPropKey::Id(_) => 0,
            NamedPropKey::Name(_) => 1,
        }
    }
}

/// Resolves mapped ids (≥ 0x8000) back to names while encoding.
pub trait NamedPropResolver {
    fn name_of(&self, mapped_id: u16) -> Option<NamedPropName>;
}

/// Resolver for streams that carry no named properties.
pub struct NoNamedProps;

impl NamedPropResolver for NoNamedProps {
    fn name_of(&self, _: u16) -> Option<NamedPropName> {
        None
    }
}

/// The push half of the codec: stream buffer plus cutmark index,
/// appended in lockstep.
#[derive(Default)]
pub struct PropertyWriter {
    stream: Cursor<Vec<u8>>,
    cutmarks: Vec<u32>,
}

impl PropertyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stream.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.get_ref().is_empty()
    }

    fn cutmark(&mut self) {
        let pos = self.stream.get_ref().len() as u32;
        if self.cutmarks.last() != Some(&pos) {
            self.cutmarks.push(pos);
        }
    }

    /// Appends a bare marker.
    pub fn write_marker(&mut self, tag: PropertyTag) -> BinResult<()> {
        tag.write_options(&mut self.stream, Endian::Little, ())?;
        self.cutmark();
        Ok(())
    }

    /// Appends a meta property carrying a `u32` payload, such as the
    /// collection-replacement announcement.
    pub fn write_meta_long(&mut self, tag: PropertyTag, value: u32) -> BinResult<()> {
        tag.write_options(&mut self.stream, Endian::Little, ())?;
        value.write_options(&mut self.stream, Endian::Little, ())?;
        self.cutmark();
        Ok(())
    }

    /// Appends a `(tag[, named-prefix], value)` block.
    ///
    /// Returns `false` without writing anything when the tag is named
    /// and the resolver does not know it; the caller decides whether
    /// that is worth a log line.
    pub fn write_property(
        &mut self,
        resolver: &dyn NamedPropResolver,
        tag: PropertyTag,
        value: &PropertyValue,
    ) -> BinResult<bool> {
        let name = if tag.is_named() {
            match resolver.name_of(tag.id()) {
                Some(name) => Some(name),
                None => return Ok(false),
            }
        } else {
            None
        };
        tag.write_options(&mut self.stream, Endian::Little, ())?;
        if let Some(name) = name {
            name.guid.write_options(&mut self.stream, Endian::Little, ())?;
            name.kind_byte()
                .write_options(&mut self.stream, Endian::Little, ())?;
            match &name.key {
                NamedPropKey::Id(id) => {
                    id.write_options(&mut self.stream, Endian::Little, ())?;
                }
                NamedPropKey::Name(s) => {
                    for unit in s.encode_utf16() {
                        unit.write_options(&mut self.stream, Endian::Little, ())?;
                    }
                    0u16.write_options(&mut self.stream, Endian::Little, ())?;
                }
            }
        }
        value.write(tag.prop_type(), &mut self.stream)?;
        self.cutmark();
        Ok(true)
    }

    /// Appends an idset pseudo-property. The payload is the bare
    /// serialized set, not length-framed.
    pub fn write_idset_property(&mut self, tag: PropertyTag, set: &IdSet) -> BinResult<()> {
        tag.write_options(&mut self.stream, Endian::Little, ())?;
        set.write_options(&mut self.stream, Endian::Little, ())?;
        self.cutmark();
        Ok(())
    }

    /// Finalizes the stream, returning the buffer and the cutmark
    /// index with its `0xFFFF_FFFF` terminator appended.
    pub fn finish(mut self) -> (Vec<u8>, Vec<u32>) {
        self.cutmarks.push(u32::MAX);
        (self.stream.into_inner(), self.cutmarks)
    }
}

/// One decoded unit of a FastTransfer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A bare structural marker.
    Marker(PropertyTag),
    /// A regular `(tag, value)` block, with the inline name when the
    /// tag is named.
    Property {
        tag: PropertyTag,
        name: Option<NamedPropName>,
        value: PropertyValue,
    },
    /// An idset pseudo-property.
    IdSetProperty { tag: PropertyTag, set: IdSet },
}

/// The pull half of the codec.
///
/// Idset payloads are not length-framed, so the reader ends one at the
/// next word that matches a metatag. Streams produced by
/// [`PropertyWriter`] always follow an idset with a metatag, and the
/// replica GUIDs of real mailboxes do not collide with the metatag
/// space.
pub struct PropertyReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PropertyReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PropertyReader {
            cursor: Cursor::new(data),
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.position() as usize >= self.cursor.get_ref().len()
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len() - self.cursor.position() as usize
    }

    fn peek_u32(&mut self) -> BinResult<Option<u32>> {
        if self.remaining() < 4 {
            return Ok(None);
        }
        let value = u32::read_options(&mut self.cursor, Endian::Little, ())?;
        self.cursor.seek(SeekFrom::Current(-4))?;
        Ok(Some(value))
    }

    /// Decodes the next unit, or `None` at end of stream.
    pub fn next_item(&mut self) -> BinResult<Option<StreamItem>> {
        if self.is_at_end() {
            return Ok(None);
        }
        let tag = PropertyTag::read_options(&mut self.cursor, Endian::Little, ())?;
        if metatag::is_marker(tag) {
            return Ok(Some(StreamItem::Marker(tag)));
        }
        if metatag::is_idset_property(tag) {
            let set = self.read_unframed_idset(tag == metatag::IDSET_DELETED)?;
            return Ok(Some(StreamItem::IdSetProperty { tag, set }));
        }
        let name = if tag.is_named() {
            Some(self.read_name()?)
        } else {
            None
        };
        let value = PropertyValue::read(tag.prop_type(), &mut self.cursor)?;
        Ok(Some(StreamItem::Property { tag, name, value }))
    }

    /// Decodes the remainder of the stream.
    pub fn read_all(&mut self) -> BinResult<Vec<StreamItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item()? {
            items.push(item);
        }
        Ok(items)
    }

    fn read_name(&mut self) -> BinResult<NamedPropName> {
        let guid = Guid::read_options(&mut self.cursor, Endian::Little, ())?;
        let kind = u8::read_options(&mut self.cursor, Endian::Little, ())?;
        let key = match kind {
            0 => NamedPropKey::Id(u32::read_options(&mut self.cursor, Endian::Little, ())?),
            1 => {
                let mut units = Vec::new();
                loop {
                    let unit = u16::read_options(&mut self.cursor, Endian::Little, ())?;
                    if unit == 0 {
                        break;
                    }
                    units.push(unit);
                }
                NamedPropKey::Name(
                    String::from_utf16(&units)
                        .map_err(|_| codec_err(&mut self.cursor, CodecError::InvalidString))?,
                )
            }
            _ => {
                return Err(codec_err(
                    &mut self.cursor,
                    CodecError::UnsupportedType(kind as u16),
                ));
            }
        };
        Ok(NamedPropName { guid, key })
    }

    fn read_unframed_idset(&mut self, id_based: bool) -> BinResult<IdSet> {
        let mut groups = Vec::new();
        loop {
            match self.peek_u32()? {
                None => break,
                Some(word) if metatag::is_marker(PropertyTag(word)) => break,
                Some(word) if metatag::is_idset_property(PropertyTag(word)) => break,
                Some(_) => {}
            }
            let group = IdSetGroup::read_one(&mut self.cursor, id_based)?;
            if !group.ranges.is_empty() {
                groups.push(group);
            }
        }
        Ok(IdSet::from_groups(false, groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pidtag;
    use crate::tag::PropertyType;
    use fxics_dtyp::{GlobCnt, RawIdSet};

    struct OneName(Guid);

    impl NamedPropResolver for OneName {
        fn name_of(&self, mapped_id: u16) -> Option<NamedPropName> {
            (mapped_id == 0x8004).then(|| NamedPropName::by_name(self.0, "X-Custom"))
        }
    }

    fn guid() -> Guid {
        "11111111-2222-3333-4444-555555555555".parse().unwrap()
    }

    #[test]
    fn stream_roundtrip_with_markers_and_named_props() {
        let resolver = OneName(guid());
        let mut writer = PropertyWriter::new();
        writer.write_marker(metatag::INCR_SYNC_CHG).unwrap();
        writer
            .write_property(
                &resolver,
                pidtag::DISPLAY_NAME,
                &PropertyValue::Unicode("Inbox".into()),
            )
            .unwrap();
        let named = PropertyTag::new(0x8004, PropertyType::LONG);
        assert!(
            writer
                .write_property(&resolver, named, &PropertyValue::Long(7))
                .unwrap()
        );
        writer
            .write_meta_long(metatag::FX_DEL_PROP, pidtag::MESSAGE_RECIPIENTS.0)
            .unwrap();
        writer.write_marker(metatag::INCR_SYNC_END).unwrap();

        let (stream, cutmarks) = writer.finish();
        assert_eq!(*cutmarks.last().unwrap(), u32::MAX);
        for pair in cutmarks[..cutmarks.len() - 1].windows(2) {
            assert!(pair[0] < pair[1], "cutmarks not strictly increasing");
        }
        assert_eq!(cutmarks[cutmarks.len() - 2] as usize, stream.len());

        let items = PropertyReader::new(&stream).read_all().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], StreamItem::Marker(metatag::INCR_SYNC_CHG));
        assert_eq!(
            items[1],
            StreamItem::Property {
                tag: pidtag::DISPLAY_NAME,
                name: None,
                value: PropertyValue::Unicode("Inbox".into()),
            }
        );
        assert_eq!(
            items[2],
            StreamItem::Property {
                tag: named,
                name: Some(NamedPropName::by_name(guid(), "X-Custom")),
                value: PropertyValue::Long(7),
            }
        );
        assert_eq!(
            items[3],
            StreamItem::Property {
                tag: metatag::FX_DEL_PROP,
                name: None,
                value: PropertyValue::Long(pidtag::MESSAGE_RECIPIENTS.0),
            }
        );
        assert_eq!(items[4], StreamItem::Marker(metatag::INCR_SYNC_END));
    }

    #[test]
    fn unresolved_named_property_is_skipped() {
        let mut writer = PropertyWriter::new();
        let unknown = PropertyTag::new(0x9999, PropertyType::LONG);
        let written = writer
            .write_property(&NoNamedProps, unknown, &PropertyValue::Long(1))
            .unwrap();
        assert!(!written);
        assert!(writer.is_empty());
    }

    #[test]
    fn numeric_named_prefix_roundtrip() {
        struct ById(Guid);
        impl NamedPropResolver for ById {
            fn name_of(&self, _: u16) -> Option<NamedPropName> {
                Some(NamedPropName::by_id(self.0, 0x8501))
            }
        }
        let mut writer = PropertyWriter::new();
        let tag = PropertyTag::new(0x8000, PropertyType::BOOLEAN);
        writer
            .write_property(&ById(guid()), tag, &PropertyValue::Bool(true))
            .unwrap();
        let (stream, _) = writer.finish();
        let items = PropertyReader::new(&stream).read_all().unwrap();
        assert_eq!(
            items[0],
            StreamItem::Property {
                tag,
                name: Some(NamedPropName::by_id(guid(), 0x8501)),
                value: PropertyValue::Bool(true),
            }
        );
    }

    #[test]
    fn idset_property_roundtrip() {
        let mut raw = RawIdSet::new(false);
        raw.push(guid(), GlobCnt::new(1));
        raw.push(guid(), GlobCnt::new(2));
        let set = raw.to_idset();

        let mut writer = PropertyWriter::new();
        writer.write_marker(metatag::INCR_SYNC_STATE_BEGIN).unwrap();
        writer
            .write_idset_property(metatag::IDSET_GIVEN, &set)
            .unwrap();
        writer.write_marker(metatag::INCR_SYNC_STATE_END).unwrap();
        let (stream, _) = writer.finish();

        let items = PropertyReader::new(&stream).read_all().unwrap();
        assert_eq!(
            items,
            vec![
                StreamItem::Marker(metatag::INCR_SYNC_STATE_BEGIN),
                StreamItem::IdSetProperty {
                    tag: metatag::IDSET_GIVEN,
                    set,
                },
                StreamItem::Marker(metatag::INCR_SYNC_STATE_END),
            ]
        );
    }
}
