//! binrw glue for `modular-bitfield` flag words.

/// Implements `BinRead`/`BinWrite` for a `#[bitfield]` struct by going
/// through its `from_bytes`/`into_bytes` byte array of the given width.
///
/// ```ignore
/// #[bitfield]
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub struct SendOptions { ... }
/// bitfield_binrw!(SendOptions, 1);
/// ```
#[macro_export]
macro_rules! bitfield_binrw {
    ($ty:ty, $n:literal) => {
        impl ::binrw::BinRead for $ty {
            type Args<'a> = ();

            fn read_options<R: ::std::io::Read + ::std::io::Seek>(
                reader: &mut R,
                _: ::binrw::Endian,
                _: Self::Args<'_>,
            ) -> ::binrw::BinResult<Self> {
                let bytes =
                    <[u8; $n]>::read_options(reader, ::binrw::Endian::Little, ())?;
                Ok(<$ty>::from_bytes(bytes))
            }
        }

        impl ::binrw::BinWrite for $ty {
            type Args<'a> = ();

            fn write_options<W: ::std::io::Write + ::std::io::Seek>(
                &self,
                writer: &mut W,
                _: ::binrw::Endian,
                _: Self::Args<'_>,
            ) -> ::binrw::BinResult<()> {
                (*self)
                    .into_bytes()
                    .write_options(writer, ::binrw::Endian::Little, ())
            }
        }
    };
}
