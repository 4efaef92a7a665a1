use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;

// Compressed-byte accounting, so a decoder that stops early (trailing
// bytes it never consumed) is detectable
struct CountedRead<R> {
    inner: R,
    bytes: u64,
}

impl<R> CountedRead<R> {
    fn new(inner: R) -> Self {
        CountedRead { inner, bytes: 0 }
    }
}

impl<R: Read> Read for CountedRead<R> {
    fn read(&mut self, dst: &mut [u8]) -> Result<usize, std::io::Error> {
        let n = self.inner.read(dst)?;
        self.bytes += n as u64;
        Ok(n)
    }
}

// Whether the byte range is one or more complete, back-to-back gzip
// streams with nothing left over. warc.gz files are a gzip stream per
// record, so the decoder has to accept concatenated members.
//
// Malformed compression is a `false`, not an error; only I/O failures
// unrelated to validity propagate. The decompressed output is discarded
// as it streams, never collected.
pub fn is_valid_gzip(source: &Path, offset: u64, size: u64) -> Result<bool, std::io::Error> {
    let mut file = File::open(source)?;

    // A range past EOF is truncation, and an empty range can't hold a
    // gzip header
    let len = file.metadata()?.len();
    match offset.checked_add(size) {
        Some(end) if end <= len => (),
        _ => return Ok(false),
    }
    if size == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut decoder = MultiGzDecoder::new(CountedRead::new(file.take(size)));

    let mut scratch = [0u8; 4096];
    loop {
        match decoder.read(&mut scratch) {
            Ok(0) => break,
            Ok(_) => (),
            Err(e) => {
                return match e.kind() {
                    ErrorKind::InvalidInput
                    | ErrorKind::InvalidData
                    | ErrorKind::UnexpectedEof => Ok(false),
                    _ => Err(e),
                }
            }
        }
    }

    // Clean end of stream, but anything unconsumed is trailing garbage
    Ok(decoder.get_ref().bytes == size)
}
