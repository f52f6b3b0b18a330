//! [`FileTime`] implementation for binrw.

use std::fmt;
use std::io::{Read, Seek, Write};

use binrw::{Endian, prelude::*};
use time::OffsetDateTime;

/// Number of seconds between 1601-01-01 and the Unix epoch.
const EPOCH_DELTA_SECS: i64 = 11_644_473_600;

/// Ticks (100 ns units) per second.
const TICKS_PER_SEC: i64 = 10_000_000;

/// A Windows FILETIME: 100-nanosecond intervals since 1601-01-01 UTC,
/// serialized as a little-endian `u64`.
///
/// `PidTagLastModificationTime`, `PidTagCreationTime` and every other
/// `SysTime`-typed property carry this on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileTime {
    pub ticks: u64,
}

impl FileTime {
    pub const fn from_ticks(ticks: u64) -> Self {
        FileTime { ticks }
    }

    /// Converts whole seconds since the Unix epoch.
    pub fn from_unix_seconds(secs: i64) -> Self {
        let ticks = (secs + EPOCH_DELTA_SECS).max(0) * TICKS_PER_SEC;
        FileTime { ticks: ticks as u64 }
    }

    /// Whole seconds since the Unix epoch, saturating below at the
    /// 1601 epoch.
    pub fn unix_seconds(self) -> i64 {
        (self.ticks as i64) / TICKS_PER_SEC - EPOCH_DELTA_SECS
    }

    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        Self::from_unix_seconds(dt.unix_timestamp())
    }

    /// Converts to an [`OffsetDateTime`], or `None` when the tick count
    /// exceeds the representable range.
    pub fn to_datetime(self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.unix_seconds()).ok()
    }
}

impl BinRead for FileTime {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let ticks = u64::read_options(reader, Endian::Little, ())?;
        Ok(FileTime { ticks })
    }
}

impl BinWrite for FileTime {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.ticks.write_options(writer, Endian::Little, ())
    }
}

impl fmt::Display for FileTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{dt}"),
            None => write!(f, "FILETIME({})", self.ticks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_tests::*;
    use time::macros::datetime;

    test_binrw! {
        FileTime: FileTime::from_ticks(0x01d7_0000_0000_0000) => "000000000000d701"
    }

    #[test]
    fn unix_epoch_roundtrip() {
        let ft = FileTime::from_unix_seconds(0);
        assert_eq!(ft.ticks, 116_444_736_000_000_000);
        assert_eq!(ft.unix_seconds(), 0);
    }

    #[test]
    fn datetime_conversion() {
        let dt = datetime!(2011-04-29 21:29:34 UTC);
        let ft = FileTime::from_datetime(dt);
        assert_eq!(ft.to_datetime(), Some(dt));
        assert_eq!(ft.unix_seconds(), 0x4dbb_2dbe);
    }
}
