use std::io::{Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{pad512, BLOCKSIZE};

#[derive(Error, Debug)]
pub enum TarError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("truncated tar header block at offset {0}")]
    TruncatedHeader(u64),
    #[error("malformed numeric field in tar header at offset {0}")]
    BadNumeric(u64),
}

// Decoded view of a header block, carried in the metadata log for
// introspection. Reconstruction never reads these, it re-emits the raw
// block, so there is no checksum or formatting drift to worry about.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeaderFields {
    pub name: String,
    pub mode: u64,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    pub mtime: u64,
    pub chksum: u64,
    #[serde(rename = "type")]
    pub typeflag: String,
    pub linkname: String,
    pub uname: String,
    pub gname: String,
    pub devmajor: u64,
    pub devminor: u64,
    pub prefix: String,
}

// Both views of one 512-byte header block. The raw bytes are the source
// of truth for re-emission.
#[derive(Debug, Clone)]
pub struct TarHeader {
    pub raw: [u8; 512],
    pub fields: HeaderFields,
}

#[derive(Debug)]
pub struct TarMember {
    pub header: TarHeader,
    // Offset of the header block in the source tar
    pub offset: u64,
}

// NUL-terminated string field
fn field_str(block: &[u8]) -> String {
    let end = block.iter().position(|b| *b == 0).unwrap_or(block.len());
    String::from_utf8_lossy(&block[..end]).into_owned()
}

// Octal field, NUL or space terminated, possibly space padded
fn field_octal(block: &[u8], offset: u64) -> Result<u64, TarError> {
    let trimmed: Vec<u8> = block
        .iter()
        .copied()
        .filter(|b| !(*b == 0 || *b == b' '))
        .collect();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let text = std::str::from_utf8(&trimmed).map_err(|_| TarError::BadNumeric(offset))?;
    u64::from_str_radix(text, 8).map_err(|_| TarError::BadNumeric(offset))
}

// Octal, or GNU base-256 when the first byte has the high bit set
// (size/uid/gid/mtime can exceed what 11 octal digits hold)
fn field_numeric(block: &[u8], offset: u64) -> Result<u64, TarError> {
    if block[0] & 0x80 != 0 {
        let mut value: u64 = (block[0] & 0x7f) as u64;
        for b in &block[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(*b as u64))
                .ok_or(TarError::BadNumeric(offset))?;
        }
        Ok(value)
    } else {
        field_octal(block, offset)
    }
}

impl TarHeader {
    pub fn decode(raw: [u8; 512], offset: u64) -> Result<TarHeader, TarError> {
        let mut name = field_str(&raw[0..100]);
        let prefix = field_str(&raw[345..500]);

        // ustar long names split across prefix + name
        if !prefix.is_empty() && &raw[257..262] == b"ustar" {
            name = format!("{}/{}", prefix, name);
        }

        let fields = HeaderFields {
            name,
            mode: field_octal(&raw[100..108], offset)?,
            uid: field_numeric(&raw[108..116], offset)?,
            gid: field_numeric(&raw[116..124], offset)?,
            size: field_numeric(&raw[124..136], offset)?,
            mtime: field_numeric(&raw[136..148], offset)?,
            chksum: field_octal(&raw[148..156], offset)?,
            typeflag: (raw[156] as char).to_string(),
            linkname: field_str(&raw[157..257]),
            uname: field_str(&raw[265..297]),
            gname: field_str(&raw[297..329]),
            devmajor: field_octal(&raw[329..337], offset)?,
            devminor: field_octal(&raw[337..345], offset)?,
            prefix,
        };

        Ok(TarHeader { raw, fields })
    }

    pub fn is_regular(&self) -> bool {
        matches!(self.raw[156], b'0' | 0)
    }
}

// Sequential scan over a source tar. Stops at the first all-zero block
// or a clean EOF on a block boundary; a partial block is an error.
pub struct TarScanner<R: Read + Seek> {
    inner: R,
    offset: u64,
    done: bool,
}

impl<R: Read + Seek> TarScanner<R> {
    pub fn new(reader: R) -> Self {
        TarScanner {
            inner: reader,
            offset: 0,
            done: false,
        }
    }

    fn read_block(&mut self, block: &mut [u8; 512]) -> Result<usize, TarError> {
        let mut filled = 0;
        while filled < 512 {
            let got = self.inner.read(&mut block[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        Ok(filled)
    }

    fn next_member(&mut self) -> Result<Option<TarMember>, TarError> {
        if self.done {
            return Ok(None);
        }

        let mut raw = [0u8; 512];
        match self.read_block(&mut raw)? {
            0 => {
                self.done = true;
                return Ok(None);
            }
            512 => (),
            _ => return Err(TarError::TruncatedHeader(self.offset)),
        }

        if raw.iter().all(|b| *b == 0) {
            self.done = true;
            return Ok(None);
        }

        let offset = self.offset;
        let header = TarHeader::decode(raw, offset)?;

        // Skip the data region, any truncation there surfaces when the
        // payload is actually copied
        let skip = header.fields.size + pad512(header.fields.size);
        self.inner.seek(SeekFrom::Current(skip as i64))?;
        self.offset += BLOCKSIZE + skip;

        Ok(Some(TarMember { header, offset }))
    }
}

impl<R: Read + Seek> Iterator for TarScanner<R> {
    type Item = Result<TarMember, TarError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_member() {
            Ok(None) => None,
            Ok(Some(x)) => Some(Ok(x)),
            Err(e) => Some(Err(e)),
        }
    }
}
