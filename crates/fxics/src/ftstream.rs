//! FastTransfer download contexts: a finalized stream buffer plus its
//! cutmark index, consumed in bounded chunks.

use fxics_msg::fxtransfer::TransferStatus;

/// One chunk returned by [`FtContext::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtChunk {
    pub data: Vec<u8>,
    pub status: TransferStatus,
    pub steps: u16,
    pub total_steps: u16,
}

/// A finalized download stream.
///
/// The buffer and cutmark index never change after construction; the
/// context only tracks the read position and progress counters.
#[derive(Debug)]
pub struct FtContext {
    buffer: Vec<u8>,
    /// Strictly increasing offsets, terminated by `0xFFFF_FFFF`.
    cutmarks: Vec<u32>,
    position: usize,
    steps: u16,
    total_steps: u16,
    next_cutmark: usize,
}

impl FtContext {
    /// Wraps a finalized stream. The cutmark array must carry its
    /// terminator; a bare `[0xFFFF_FFFF]` means the stream is one
    /// logical unit.
    pub fn new(buffer: Vec<u8>, cutmarks: Vec<u32>) -> Self {
        debug_assert_eq!(cutmarks.last(), Some(&u32::MAX));
        FtContext {
            buffer,
            cutmarks,
            position: 0,
            steps: 0,
            total_steps: 0,
            next_cutmark: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_done(&self) -> bool {
        self.position == self.buffer.len()
    }

    /// Returns the next chunk of at most `max` bytes.
    ///
    /// When more data remains past this chunk, the returned slice ends
    /// on the last cutmark below the `max` boundary so no logical
    /// record is fractured. A single oversized record falls back to a
    /// plain `max`-byte cut.
    pub fn read(&mut self, max: usize) -> FtChunk {
        let max = max.max(1);
        if self.position == 0 {
            self.steps = 0;
            self.total_steps = self.buffer.len().div_ceil(max).max(1) as u16;
        }
        self.steps = self.steps.saturating_add(1);

        let mut size = max;
        if self.position + max < self.buffer.len() {
            let limit = (self.position + max) as u32;
            // Skip cutmarks at or before the current position.
            while self.cutmarks[self.next_cutmark] != u32::MAX
                && self.cutmarks[self.next_cutmark] as usize <= self.position
            {
                self.next_cutmark += 1;
            }
            let mut mark = self.next_cutmark;
            while self.cutmarks[mark] != u32::MAX && self.cutmarks[mark] < limit {
                size = self.cutmarks[mark] as usize - self.position;
                mark += 1;
            }
            self.next_cutmark = mark;
        }

        let end = (self.position + size).min(self.buffer.len());
        let data = self.buffer[self.position..end].to_vec();
        self.position = end;

        let status = if self.is_done() {
            TransferStatus::Done
        } else {
            TransferStatus::Partial
        };
        FtChunk {
            data,
            status,
            steps: if status == TransferStatus::Done {
                self.total_steps
            } else {
                self.steps
            },
            total_steps: self.total_steps,
        }
    }
}
