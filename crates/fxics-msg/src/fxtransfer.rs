//! FastTransfer source ROPs: CopyTo and GetBuffer.

use binrw::prelude::*;
use fxics_props::PropertyTag;
use modular_bitfield::prelude::*;

use fxics_dtyp::bitfield_binrw;

/// Buffer-size escape value: the effective size travels in the
/// separate maximum-buffer-size field instead.
pub const BUFFER_SIZE_USE_MAXIMUM: u16 = 0xBABE;

/// Send-option flags shared by the download configure ROPs.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub unicode: bool,
    pub use_cpid: bool,
    pub recover_mode: bool,
    pub force_unicode: bool,
    pub partial_item: bool,
    #[skip]
    __: B3,
}
bitfield_binrw!(SendOptions, 1);

/// Initializes a FastTransfer download of one object's properties.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct FastTransferSourceCopyToRequest {
    /// Handle slot the created download context is placed in.
    pub output_handle_idx: u8,
    /// Descendant levels to include; only level 0 is served.
    pub level: u8,
    pub copy_flags: u32,
    pub send_options: SendOptions,
    #[bw(try_calc = excluded_tags.len().try_into())]
    #[br(temp)]
    excluded_count: u16,
    /// Properties the client does not want in the dump.
    #[br(count = excluded_count)]
    pub excluded_tags: Vec<PropertyTag>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct FastTransferSourceCopyToResponse {}

/// Transfer status reported by each GetBuffer reply.
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[brw(little, repr(u16))]
pub enum TransferStatus {
    Error = 0x0000,
    Partial = 0x0001,
    NoRoom = 0x0002,
    Done = 0x0003,
}

/// Downloads the next chunk of a previously configured stream.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct FastTransferSourceGetBufferRequest {
    pub buffer_size: u16,
    /// Present exactly when `buffer_size` is the
    /// [`BUFFER_SIZE_USE_MAXIMUM`] escape.
    #[br(if(buffer_size == BUFFER_SIZE_USE_MAXIMUM))]
    #[bw(if(*buffer_size == BUFFER_SIZE_USE_MAXIMUM))]
    pub maximum_buffer_size: Option<u16>,
}

impl FastTransferSourceGetBufferRequest {
    pub fn new(buffer_size: u16) -> Self {
        FastTransferSourceGetBufferRequest {
            buffer_size,
            maximum_buffer_size: None,
        }
    }

    /// The effective requested size after the escape is applied.
    pub fn effective_size(&self) -> u16 {
        if self.buffer_size == BUFFER_SIZE_USE_MAXIMUM {
            self.maximum_buffer_size.unwrap_or(BUFFER_SIZE_USE_MAXIMUM)
        } else {
            self.buffer_size
        }
    }
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct FastTransferSourceGetBufferResponse {
    pub transfer_status: TransferStatus,
    pub in_progress_count: u16,
    pub total_step_count: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _reserved: u8,
    #[bw(try_calc = transfer_buffer.len().try_into())]
    #[br(temp)]
    transfer_buffer_size: u16,
    #[br(count = transfer_buffer_size)]
    pub transfer_buffer: Vec<u8>,
}

impl Default for FastTransferSourceGetBufferResponse {
    fn default() -> Self {
        FastTransferSourceGetBufferResponse {
            transfer_status: TransferStatus::Error,
            in_progress_count: 0,
            total_step_count: 0,
            transfer_buffer: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_tests::*;

    test_binrw! {
        FastTransferSourceGetBufferRequest => plain:
            FastTransferSourceGetBufferRequest::new(0x2000) => "0020"
    }

    test_binrw! {
        FastTransferSourceGetBufferRequest => escaped:
            FastTransferSourceGetBufferRequest {
                buffer_size: BUFFER_SIZE_USE_MAXIMUM,
                maximum_buffer_size: Some(0x8000),
            } => "beba0080"
    }

    test_binrw! {
        FastTransferSourceGetBufferResponse => done:
            FastTransferSourceGetBufferResponse {
                transfer_status: TransferStatus::Done,
                in_progress_count: 1,
                total_step_count: 1,
                transfer_buffer: vec![0xab, 0xcd],
            } => "030001000100000200abcd"
    }

    #[test]
    fn effective_size_applies_escape() {
        assert_eq!(
            FastTransferSourceGetBufferRequest::new(0x2000).effective_size(),
            0x2000
        );
        let escaped = FastTransferSourceGetBufferRequest {
            buffer_size: BUFFER_SIZE_USE_MAXIMUM,
            maximum_buffer_size: Some(0x9000),
        };
        assert_eq!(escaped.effective_size(), 0x9000);
    }
}
