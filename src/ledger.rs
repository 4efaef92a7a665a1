pub const BLOCKSIZE: u64 = 512;
pub const RECORDSIZE: u64 = 20 * BLOCKSIZE;

// Padding needed to bring a member's data region up to a block boundary
pub fn pad512(size: u64) -> u64 {
    (BLOCKSIZE - size % BLOCKSIZE) % BLOCKSIZE
}

// One per output stream. Append-only, the position only ever moves forward.
pub struct OffsetLedger {
    pos: u64,
}

impl OffsetLedger {
    pub fn new() -> Self {
        OffsetLedger { pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    // Claims a region of `len` bytes, returns the offset it begins at
    pub fn claim(&mut self, len: u64) -> u64 {
        let at = self.pos;
        self.pos += len;
        at
    }

    // End-of-stream padding to a RECORDSIZE multiple. An empty stream is
    // padded to one full record so it reads as a minimal valid empty tar.
    pub fn end_padding(&self) -> u64 {
        if self.pos == 0 {
            RECORDSIZE
        } else {
            (RECORDSIZE - self.pos % RECORDSIZE) % RECORDSIZE
        }
    }
}
