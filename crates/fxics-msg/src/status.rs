//! MAPI status codes.

use std::io::Cursor;

use binrw::prelude::*;

macro_rules! make_status {
    (
        $($name:ident = $value:literal: $description:literal, )+
    ) => {

/// MAPI status codes carried in the reply `error_code` field.
///
/// For each status code, a u32 constant is also provided for easier
/// access, for example [`MapiStatus::U32_NOT_FOUND`].
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
#[brw(little, repr(u32))]
pub enum MapiStatus {
    $(
        #[doc = concat!($description, " (", stringify!($value), ")")]
        $name = $value,
    )+
}

impl std::fmt::Display for MapiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message_as_string = match self {
            $(
                MapiStatus::$name => $description,
            )+
        };
        write!(f, "{} ({:#010x})", message_as_string, *self as u32)
    }
}

impl MapiStatus {
    // Consts for easier status code as u32 access.
    pastey::paste! {
        $(
            #[doc = concat!("[`", stringify!($name), "`][Self::", stringify!($name), "] as u32")]
            pub const [<U32_ $name:snake:upper>]: u32 = $value;
        )+
    }

    /// Tries converting a u32 to a [`MapiStatus`] and returns its
    /// string representation, falling back to hex for codes without a
    /// definition.
    pub fn try_display_as_status(value: u32) -> String {
        match Self::try_from(value) {
            Ok(status) => format!("{}", status),
            Err(_) => format!("{:#010x}", value),
        }
    }
}

impl TryFrom<u32> for MapiStatus {
    type Error = crate::MsgError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        MapiStatus::read_le(&mut Cursor::new(value.to_le_bytes()))
            .map_err(|_| Self::Error::MissingStatusDefinition(value))
    }
}
    };
}

make_status! {
    Success = 0x00000000: "Success",
    GeneralFailure = 0x80004005: "General Failure",
    NoAccess = 0x80070005: "No Access",
    NotEnoughMemory = 0x8007000E: "Not Enough Memory",
    InvalidParameter = 0x80070057: "Invalid Parameter",
    NoSupport = 0x80040102: "No Support",
    InvalidObject = 0x80040108: "Invalid Object",
    NotFound = 0x8004010F: "Not Found",
    CorruptData = 0x8004011B: "Corrupt Data",
    Collision = 0x80040604: "Collision",
    NotInitialized = 0x80040605: "Not Initialized",
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_tests::*;

    test_binrw! {
        MapiStatus => not_found: MapiStatus::NotFound => "0f010480"
    }

    #[test]
    fn u32_conversion() {
        assert_eq!(
            MapiStatus::try_from(0x80040605).unwrap(),
            MapiStatus::NotInitialized
        );
        assert!(MapiStatus::try_from(0xdeadbeef).is_err());
        assert_eq!(MapiStatus::U32_SUCCESS, 0);
        assert_eq!(MapiStatus::U32_CORRUPT_DATA, 0x8004011B);
    }

    #[test]
    fn display_falls_back_to_hex() {
        assert_eq!(
            MapiStatus::try_display_as_status(0x8004010F),
            "Not Found (0x8004010f)"
        );
        assert_eq!(MapiStatus::try_display_as_status(0x12345678), "0x12345678");
    }
}
