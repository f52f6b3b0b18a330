//! Property tag and type primitives.

use std::fmt;
use std::io::{Read, Seek, Write};

use binrw::{Endian, prelude::*};

/// The low 16 bits of a property tag: the value's wire type.
///
/// The multi-valued bit (0x1000) composes with the base types; the
/// base accessor masks it (and the reserved instance bits) away.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyType(pub u16);

impl PropertyType {
    pub const UNSPECIFIED: PropertyType = PropertyType(0x0000);
    pub const NULL: PropertyType = PropertyType(0x0001);
    pub const I2: PropertyType = PropertyType(0x0002);
    pub const LONG: PropertyType = PropertyType(0x0003);
    pub const DOUBLE: PropertyType = PropertyType(0x0005);
    pub const ERROR: PropertyType = PropertyType(0x000A);
    pub const BOOLEAN: PropertyType = PropertyType(0x000B);
    pub const OBJECT: PropertyType = PropertyType(0x000D);
    pub const I8: PropertyType = PropertyType(0x0014);
    pub const STRING8: PropertyType = PropertyType(0x001E);
    pub const UNICODE: PropertyType = PropertyType(0x001F);
    pub const SYSTIME: PropertyType = PropertyType(0x0040);
    pub const CLSID: PropertyType = PropertyType(0x0048);
    pub const SVREID: PropertyType = PropertyType(0x00FB);
    pub const BINARY: PropertyType = PropertyType(0x0102);

    pub const MV_FLAG: u16 = 0x1000;

    pub const fn is_multi_valued(self) -> bool {
        self.0 & Self::MV_FLAG != 0
    }

    /// The element type with the multi-value and instance bits masked
    /// off.
    pub const fn base(self) -> PropertyType {
        PropertyType(self.0 & 0x0fff)
    }
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyType({:#06x})", self.0)
    }
}

/// A 32-bit property tag: `(id << 16) | type`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyTag(pub u32);

impl PropertyTag {
    pub const fn new(id: u16, prop_type: PropertyType) -> Self {
        PropertyTag(((id as u32) << 16) | prop_type.0 as u32)
    }

    pub const fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn prop_type(self) -> PropertyType {
        PropertyType((self.0 & 0xffff) as u16)
    }

    /// Named properties have ids in `[0x8000, 0xFFFF]` and resolve
    /// through the registry.
    pub const fn is_named(self) -> bool {
        self.id() >= 0x8000
    }

    /// The same property id under a different type.
    pub const fn with_type(self, prop_type: PropertyType) -> Self {
        PropertyTag::new(self.id(), prop_type)
    }
}

impl fmt::Debug for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyTag({:#010x})", self.0)
    }
}

impl fmt::Display for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl BinRead for PropertyTag {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        Ok(PropertyTag(u32::read_options(reader, Endian::Little, ())?))
    }
}

impl BinWrite for PropertyTag {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.0.write_options(writer, Endian::Little, ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_tests::*;

    test_binrw! {
        PropertyTag: PropertyTag::new(0x67A4, PropertyType::I8) => "1400a467"
    }

    #[test]
    fn packing() {
        let tag = PropertyTag::new(0x3001, PropertyType::UNICODE);
        assert_eq!(tag.0, 0x3001_001f);
        assert_eq!(tag.id(), 0x3001);
        assert_eq!(tag.prop_type(), PropertyType::UNICODE);
        assert!(!tag.is_named());
        assert!(PropertyTag::new(0x8001, PropertyType::UNICODE).is_named());
    }

    #[test]
    fn multi_value_masking() {
        let mv = PropertyType(PropertyType::I8.0 | PropertyType::MV_FLAG);
        assert!(mv.is_multi_valued());
        assert_eq!(mv.base(), PropertyType::I8);
        assert!(!PropertyType::I8.is_multi_valued());
    }
}
