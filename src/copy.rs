use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

const CHUNK_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum CopyError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("short read in {path}: wanted {wanted} bytes at offset {offset}, got {got}")]
    ShortRead {
        path: String,
        offset: u64,
        wanted: u64,
        got: u64,
    },
}

// Streams exactly `size` bytes from `source` at `offset` into `dest`.
// A source shorter than the requested range is a hard error, it means
// the megawarc set and its metadata disagree.
pub fn copy_range<W: Write>(
    source: &Path,
    offset: u64,
    size: u64,
    dest: &mut W,
) -> Result<(), CopyError> {
    let mut file = File::open(source)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = size;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let got = file.read(&mut buf[..want])?;
        if got == 0 {
            return Err(CopyError::ShortRead {
                path: source.display().to_string(),
                offset,
                wanted: size,
                got: size - remaining,
            });
        }
        dest.write_all(&buf[..got])?;
        remaining -= got as u64;
    }

    dest.flush()?;
    Ok(())
}

// Zero fill for member alignment and end-of-archive padding
pub fn write_padding<W: Write>(dest: &mut W, len: u64) -> Result<(), std::io::Error> {
    let zeroes = [0u8; CHUNK_SIZE];
    let mut remaining = len;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        dest.write_all(&zeroes[..want])?;
        remaining -= want as u64;
    }
    Ok(())
}
