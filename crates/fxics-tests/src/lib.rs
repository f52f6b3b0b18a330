//! Shared test utilities for the `fxics-rs` workspace.
//!
//! The [`test_binrw!`] family of macros generates hex-roundtrip tests
//! for types implementing `BinRead`/`BinWrite`. The using crate must
//! depend on `binrw` itself.

#![forbid(unsafe_code)]

pub use pastey;

/// Decodes a lowercase/uppercase hex string into bytes.
///
/// Panics on malformed input; this is a test-only helper.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "hex string has odd length: {hex:?}");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("invalid hex digit"))
        .collect()
}

/// Generates a write test and a read test asserting that a value
/// serializes to exactly the given hex bytes and parses back equal.
///
/// ```ignore
/// test_binrw! { Guid: some_guid() => "10b8a76b..." }
/// test_binrw! { Guid => nil: Guid::default() => "0000..." }
/// ```
#[macro_export]
macro_rules! test_binrw {
    ($ty:ident => $name:ident: $value:expr => $hex:literal) => {
        $crate::test_binrw_write! { $ty => $name: $value => $hex }
        $crate::test_binrw_read! { $ty => $name: $value => $hex }
    };
    ($ty:ident: $value:expr => $hex:literal) => {
        $crate::test_binrw_write! { $ty => value: $value => $hex }
        $crate::test_binrw_read! { $ty => value: $value => $hex }
    };
}

/// Write-only variant of [`test_binrw!`].
#[macro_export]
macro_rules! test_binrw_write {
    ($ty:ident => $name:ident: $value:expr => $hex:literal) => {
        $crate::pastey::paste! {
            #[test]
            fn [<test_ $ty:snake _ $name _write>]() {
                let value: $ty = $value;
                let mut cursor = ::std::io::Cursor::new(Vec::new());
                ::binrw::BinWrite::write_le(&value, &mut cursor).expect("write failed");
                let written = cursor.into_inner();
                assert_eq!(
                    written,
                    $crate::decode_hex($hex),
                    "serialized bytes mismatch",
                );
            }
        }
    };
}

/// Read-only variant of [`test_binrw!`].
#[macro_export]
macro_rules! test_binrw_read {
    ($ty:ident => $name:ident: $value:expr => $hex:literal) => {
        $crate::pastey::paste! {
            #[test]
            fn [<test_ $ty:snake _ $name _read>]() {
                let expected: $ty = $value;
                let data = $crate::decode_hex($hex);
                let mut cursor = ::std::io::Cursor::new(&data);
                let parsed: $ty = ::binrw::BinRead::read_le(&mut cursor).expect("read failed");
                assert_eq!(parsed, expected);
            }
        }
    };
}
