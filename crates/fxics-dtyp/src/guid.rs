//! [`Guid`] implementation for binrw.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::str::FromStr;

use binrw::{Endian, prelude::*};
use rand::RngCore;

/// A 128-bit GUID with the Windows mixed-endian wire layout:
/// `Data1`/`Data2`/`Data3` little-endian, `Data4` as raw bytes.
///
/// Replica GUIDs, named-property set GUIDs and CLSID property values
/// all use this layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const SIZE: usize = 16;

    /// Generates a fresh random (version 4) GUID.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        // RFC 4122 version/variant bits.
        bytes[7] = (bytes[7] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self::from_bytes(bytes)
    }

    /// Reconstructs a GUID from its 16-byte wire form.
    pub fn from_bytes(b: [u8; 16]) -> Self {
        Guid {
            data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_le_bytes([b[4], b[5]]),
            data3: u16::from_le_bytes([b[6], b[7]]),
            data4: [b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]],
        }
    }

    /// Returns the 16-byte wire form.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0..4].copy_from_slice(&self.data1.to_le_bytes());
        b[4..6].copy_from_slice(&self.data2.to_le_bytes());
        b[6..8].copy_from_slice(&self.data3.to_le_bytes());
        b[8..16].copy_from_slice(&self.data4);
        b
    }
}

impl BinRead for Guid {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let bytes = <[u8; 16]>::read_options(reader, Endian::Little, ())?;
        Ok(Guid::from_bytes(bytes))
    }
}

impl BinWrite for Guid {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.to_bytes().write_options(writer, Endian::Little, ())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

/// Error returned when parsing a GUID from its textual form fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuidParseError;

impl fmt::Display for GuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed GUID string")
    }
}

impl std::error::Error for GuidParseError {}

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Parses the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    /// form, with or without surrounding braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('{').unwrap_or(s);
        let s = s.strip_suffix('}').unwrap_or(s);
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 5
            || parts[0].len() != 8
            || parts[1].len() != 4
            || parts[2].len() != 4
            || parts[3].len() != 4
            || parts[4].len() != 12
        {
            return Err(GuidParseError);
        }
        let data1 = u32::from_str_radix(parts[0], 16).map_err(|_| GuidParseError)?;
        let data2 = u16::from_str_radix(parts[1], 16).map_err(|_| GuidParseError)?;
        let data3 = u16::from_str_radix(parts[2], 16).map_err(|_| GuidParseError)?;
        let mut data4 = [0u8; 8];
        let tail = format!("{}{}", parts[3], parts[4]);
        for (i, chunk) in tail.as_bytes().chunks(2).enumerate() {
            let chunk = std::str::from_utf8(chunk).map_err(|_| GuidParseError)?;
            data4[i] = u8::from_str_radix(chunk, 16).map_err(|_| GuidParseError)?;
        }
        Ok(Guid {
            data1,
            data2,
            data3,
            data4,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_tests::*;

    test_binrw! {
        Guid: "6ba7b810-9dad-11d1-80b4-00c04fd430c8".parse::<Guid>().unwrap()
            => "10b8a76bad9dd11180b400c04fd430c8"
    }

    #[test]
    fn display_roundtrip() {
        let text = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        let guid: Guid = text.parse().unwrap();
        assert_eq!(guid.to_string(), text);
        assert_eq!(Guid::from_bytes(guid.to_bytes()), guid);
    }

    #[test]
    fn braced_form_accepted() {
        let guid: Guid = "{6ba7b810-9dad-11d1-80b4-00c04fd430c8}".parse().unwrap();
        assert_eq!(guid.data1, 0x6ba7b810);
        assert_eq!(guid.data4[7], 0xc8);
    }

    #[test]
    fn generate_is_version_4() {
        let guid = Guid::generate();
        assert_eq!(guid.data3 >> 12, 4);
        assert_ne!(guid, Guid::generate());
    }

    #[test]
    fn malformed_strings_rejected() {
        assert!("not-a-guid".parse::<Guid>().is_err());
        assert!("6ba7b810-9dad-11d1-80b4".parse::<Guid>().is_err());
        assert!("6ba7b810-9dad-11d1-80b4-00c04fd430zz".parse::<Guid>().is_err());
    }
}
