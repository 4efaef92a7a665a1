use std::io::{BufRead, BufReader, Lines, Read, Write};

use base64::prelude::*;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tar::{HeaderFields, TarHeader};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    // Covers unknown container tags too, serde rejects them at parse time
    #[error("malformed metadata record: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("malformed header_base64: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("raw tar header must be 512 bytes, got {0}")]
    BadHeaderLength(usize),
    #[error("header_string holds a codepoint above 0xff")]
    BadHeaderString,
    #[error("record carries neither header_base64 nor header_string")]
    MissingHeader,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Warc,
    Tar,
}

// Where a member's bytes live in the output set. For tar the size spans
// header + payload + padding; for warc it is the bare payload, gzip
// streams concatenate without framing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub container: Container,
    pub offset: u64,
    pub size: u64,
}

// Positions in the original tar, preserved verbatim through every
// transform
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SourceOffsets {
    pub entry: u64,
    pub data: u64,
    pub next_entry: u64,
}

// One json line per original tar member. `header_base64` is what gets
// emitted; `header_string` is the legacy form with the raw bytes
// embedded as codepoints, still accepted on input.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Record {
    pub target: Target,
    pub src_offsets: SourceOffsets,
    pub header_fields: HeaderFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_string: Option<String>,
}

impl Record {
    pub fn new(target: Target, src_offsets: SourceOffsets, header: &TarHeader) -> Self {
        Record {
            target,
            src_offsets,
            header_fields: header.fields.clone(),
            header_base64: Some(BASE64_STANDARD.encode(header.raw)),
            header_string: None,
        }
    }

    pub fn raw_header(&self) -> Result<[u8; 512], RecordError> {
        let bytes = if let Some(b64) = &self.header_base64 {
            BASE64_STANDARD.decode(b64)?
        } else if let Some(text) = &self.header_string {
            text.chars()
                .map(|c| u8::try_from(c as u32).map_err(|_| RecordError::BadHeaderString))
                .collect::<Result<Vec<u8>, _>>()?
        } else {
            return Err(RecordError::MissingHeader);
        };

        <[u8; 512]>::try_from(bytes.as_slice())
            .map_err(|_| RecordError::BadHeaderLength(bytes.len()))
    }
}

// Appends records as gzip-compressed json lines
pub struct RecordWriter<W: Write> {
    inner: GzEncoder<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        RecordWriter {
            inner: GzEncoder::new(writer, Compression::default()),
        }
    }

    pub fn write(&mut self, record: &Record) -> Result<(), RecordError> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(self) -> Result<W, RecordError> {
        Ok(self.inner.finish()?)
    }
}

pub struct RecordReader<R: Read> {
    inner: Lines<BufReader<GzDecoder<R>>>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        RecordReader {
            inner: BufReader::new(GzDecoder::new(reader)).lines(),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(line) => Some(serde_json::from_str(&line).map_err(RecordError::from)),
            Err(e) => Some(Err(RecordError::from(e))),
        }
    }
}

#[cfg(test)]
mod test_record {
    use std::io::Cursor;
    use crate::tar::testing::make_header;
    use super::*;

    fn test_record(container: Container, offset: u64, size: u64) -> Record {
        let header = TarHeader::decode(make_header("x.warc.gz", size, b'0'), 0).unwrap();
        Record::new(
            Target { container, offset, size },
            SourceOffsets { entry: 0, data: 512, next_entry: 512 + size + 512 },
            &header,
        )
    }

    #[test]
    fn round_trip_log() {
        let a = test_record(Container::Warc, 0, 100);
        let b = test_record(Container::Tar, 0, 1024);

        let mut writer = RecordWriter::new(Vec::new());
        writer.write(&a).unwrap();
        writer.write(&b).unwrap();
        let log = writer.finish().unwrap();

        let records: Vec<Record> = RecordReader::new(Cursor::new(log))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target, a.target);
        assert_eq!(records[0].src_offsets, a.src_offsets);
        assert_eq!(records[0].header_fields, a.header_fields);
        assert_eq!(records[1].target, b.target);
    }

    #[test]
    fn emits_base64_not_string() {
        let record = test_record(Container::Warc, 0, 7);
        let line = serde_json::to_string(&record).unwrap();

        assert!(line.contains("header_base64"));
        assert!(!line.contains("header_string"));
    }

    #[test]
    fn raw_header_from_base64() {
        let raw = make_header("y.txt", 42, b'0');
        let header = TarHeader::decode(raw, 0).unwrap();
        let record = Record::new(
            Target { container: Container::Tar, offset: 0, size: 1024 },
            SourceOffsets { entry: 0, data: 512, next_entry: 1024 },
            &header,
        );

        assert_eq!(record.raw_header().unwrap(), raw);
    }

    #[test]
    fn raw_header_from_legacy_string() {
        let raw = make_header("z.txt", 0, b'0');
        let mut record = test_record(Container::Tar, 0, 512);
        record.header_base64 = None;
        record.header_string = Some(raw.iter().map(|b| *b as char).collect());

        assert_eq!(record.raw_header().unwrap(), raw);
    }

    #[test]
    fn raw_header_missing() {
        let mut record = test_record(Container::Tar, 0, 512);
        record.header_base64 = None;
        record.header_string = None;

        assert!(matches!(record.raw_header(), Err(RecordError::MissingHeader)));
    }

    #[test]
    fn raw_header_bad_length() {
        let mut record = test_record(Container::Tar, 0, 512);
        record.header_base64 = Some(BASE64_STANDARD.encode(b"too short"));

        assert!(matches!(
            record.raw_header(),
            Err(RecordError::BadHeaderLength(9))
        ));
    }

    #[test]
    fn unknown_container_tag() {
        let mut line = serde_json::to_string(&test_record(Container::Warc, 0, 10)).unwrap();
        line = line.replace("\"warc\"", "\"zip\"");

        assert!(serde_json::from_str::<Record>(&line).is_err());
    }
}
