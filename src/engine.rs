use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use base64::prelude::*;
use log::{debug, info};
use thiserror::Error;

use crate::copy::{copy_range, write_padding, CopyError};
use crate::gzip::is_valid_gzip;
use crate::ledger::{pad512, OffsetLedger, BLOCKSIZE};
use crate::record::{Container, Record, RecordError, RecordReader, RecordWriter, SourceOffsets, Target};
use crate::tar::{TarError, TarScanner};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    Tar(#[from] TarError),
    #[error(transparent)]
    Copy(#[from] CopyError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("input file missing: {}", .0.display())]
    InputMissing(PathBuf),
    #[error("output file already exists: {}", .0.display())]
    OutputExists(PathBuf),
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_os_string();
    path.push(suffix);
    PathBuf::from(path)
}

// Basename for fix output, FIXED- prepended to the file name
pub fn fixed_basename(base: &Path) -> PathBuf {
    let mut name = OsString::from("FIXED-");
    name.push(base.file_name().unwrap_or(base.as_os_str()));
    match base.parent() {
        Some(parent) => parent.join(&name),
        None => PathBuf::from(name),
    }
}

// The three-file set derived from one basename
pub struct MegawarcSet {
    pub warc: PathBuf,
    pub tar: PathBuf,
    pub json: PathBuf,
}

impl MegawarcSet {
    pub fn for_basename(base: &Path) -> Self {
        MegawarcSet {
            warc: with_suffix(base, ".megawarc.warc.gz"),
            tar: with_suffix(base, ".megawarc.tar"),
            json: with_suffix(base, ".megawarc.json.gz"),
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.warc, &self.tar, &self.json]
    }

    fn require_exists(&self) -> Result<(), EngineError> {
        for path in self.paths() {
            if !path.exists() {
                return Err(EngineError::InputMissing(path.to_path_buf()));
            }
        }
        Ok(())
    }

    fn require_absent(&self) -> Result<(), EngineError> {
        for path in self.paths() {
            if path.exists() {
                return Err(EngineError::OutputExists(path.to_path_buf()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub struct BuildStats {
    pub members: u64,
    // Members routed to the residual tar instead of the warc stream
    pub non_warc: u64,
    pub warc_size: u64,
    pub tar_size: u64,
}

#[derive(Debug, PartialEq)]
pub struct FixStats {
    pub members: u64,
    // Previously-warc members that failed re-validation and moved to tar
    pub moved: u64,
}

// Splits a tar of warc.gz files into BASENAME.megawarc.{warc.gz,tar,json.gz}.
// Valid gzip payloads are appended bare to the warc stream, everything
// else keeps its header and block padding in the residual tar.
pub fn build(source: &Path) -> Result<BuildStats, EngineError> {
    if !source.exists() {
        return Err(EngineError::InputMissing(source.to_path_buf()));
    }
    let set = MegawarcSet::for_basename(source);
    set.require_absent()?;

    let mut warc_out = BufWriter::new(File::create(&set.warc)?);
    let mut tar_out = BufWriter::new(File::create(&set.tar)?);
    let mut json_out = RecordWriter::new(BufWriter::new(File::create(&set.json)?));

    let mut warc_ledger = OffsetLedger::new();
    let mut tar_ledger = OffsetLedger::new();
    let mut members = 0;
    let mut non_warc = 0;

    let scanner = TarScanner::new(BufReader::new(File::open(source)?));
    for member in scanner {
        let member = member?;
        let size = member.header.fields.size;
        let name = &member.header.fields.name;

        let src_offsets = SourceOffsets {
            entry: member.offset,
            data: member.offset + BLOCKSIZE,
            next_entry: member.offset + BLOCKSIZE + size + pad512(size),
        };

        let candidate = member.header.is_regular() && name.ends_with(".warc.gz");
        let target = if candidate && is_valid_gzip(source, src_offsets.data, size)? {
            debug!("warc: {} ({} bytes)", name, size);
            let offset = warc_ledger.claim(size);
            copy_range(source, src_offsets.data, size, &mut warc_out)?;
            Target {
                container: Container::Warc,
                offset,
                size,
            }
        } else {
            debug!("tar: {} ({} bytes)", name, size);
            non_warc += 1;
            let stored = BLOCKSIZE + size + pad512(size);
            let offset = tar_ledger.claim(stored);
            tar_out.write_all(&member.header.raw)?;
            copy_range(source, src_offsets.data, size, &mut tar_out)?;
            write_padding(&mut tar_out, pad512(size))?;
            Target {
                container: Container::Tar,
                offset,
                size: stored,
            }
        };

        json_out.write(&Record::new(target, src_offsets, &member.header))?;
        members += 1;
    }

    let end_pad = tar_ledger.end_padding();
    write_padding(&mut tar_out, end_pad)?;

    warc_out.flush()?;
    tar_out.flush()?;
    json_out.finish()?.flush()?;

    let stats = BuildStats {
        members,
        non_warc,
        warc_size: warc_ledger.position(),
        tar_size: tar_ledger.position() + end_pad,
    };
    info!(
        "built {}: {} members, {} kept out of the warc stream",
        set.warc.display(),
        stats.members,
        stats.non_warc
    );
    Ok(stats)
}

// Reassembles the original tar, byte for byte, at the basename path
pub fn restore(base: &Path) -> Result<u64, EngineError> {
    let set = MegawarcSet::for_basename(base);
    set.require_exists()?;
    if base.exists() {
        return Err(EngineError::OutputExists(base.to_path_buf()));
    }

    let mut out = BufWriter::new(File::create(base)?);
    let mut ledger = OffsetLedger::new();
    let mut members = 0;

    for record in RecordReader::new(File::open(&set.json)?) {
        let record = record?;
        let target = record.target;

        match target.container {
            Container::Warc => {
                // Header and padding were stripped on the way in,
                // resynthesize them around the bare gzip payload
                debug!("restore warc: {}", record.header_fields.name);
                out.write_all(&record.raw_header()?)?;
                copy_range(&set.warc, target.offset, target.size, &mut out)?;
                write_padding(&mut out, pad512(target.size))?;
                ledger.claim(BLOCKSIZE + target.size + pad512(target.size));
            }
            Container::Tar => {
                // Stored region already spans header + payload + padding
                debug!("restore tar: {}", record.header_fields.name);
                copy_range(&set.tar, target.offset, target.size, &mut out)?;
                ledger.claim(target.size);
            }
        }
        members += 1;
    }

    write_padding(&mut out, ledger.end_padding())?;
    out.flush()?;

    info!("restored {}: {} members", base.display(), members);
    Ok(members)
}

// Rewrites a megawarc set, re-validating every warc-routed member
// against the warc stream it actually sits in. Members that no longer
// decompress cleanly move into the new residual tar; everything else is
// re-copied at renumbered offsets. The input set is left untouched.
pub fn fix(base: &Path) -> Result<FixStats, EngineError> {
    let old = MegawarcSet::for_basename(base);
    old.require_exists()?;
    let new = MegawarcSet::for_basename(&fixed_basename(base));
    new.require_absent()?;

    let mut warc_out = BufWriter::new(File::create(&new.warc)?);
    let mut tar_out = BufWriter::new(File::create(&new.tar)?);
    let mut json_out = RecordWriter::new(BufWriter::new(File::create(&new.json)?));

    let mut warc_ledger = OffsetLedger::new();
    let mut tar_ledger = OffsetLedger::new();
    let mut members = 0;
    let mut moved = 0;

    for record in RecordReader::new(File::open(&old.json)?) {
        let mut record = record?;
        let target = record.target;
        let raw_header = record.raw_header()?;

        record.target = match target.container {
            Container::Warc => {
                if is_valid_gzip(&old.warc, target.offset, target.size)? {
                    debug!("keep warc: {}", record.header_fields.name);
                    let offset = warc_ledger.claim(target.size);
                    copy_range(&old.warc, target.offset, target.size, &mut warc_out)?;
                    Target {
                        container: Container::Warc,
                        offset,
                        size: target.size,
                    }
                } else {
                    info!("quarantine: {}", record.header_fields.name);
                    moved += 1;
                    let stored = BLOCKSIZE + target.size + pad512(target.size);
                    let offset = tar_ledger.claim(stored);
                    tar_out.write_all(&raw_header)?;
                    copy_range(&old.warc, target.offset, target.size, &mut tar_out)?;
                    write_padding(&mut tar_out, pad512(target.size))?;
                    Target {
                        container: Container::Tar,
                        offset,
                        size: stored,
                    }
                }
            }
            Container::Tar => {
                debug!("copy tar: {}", record.header_fields.name);
                let offset = tar_ledger.claim(target.size);
                copy_range(&old.tar, target.offset, target.size, &mut tar_out)?;
                Target {
                    container: Container::Tar,
                    offset,
                    size: target.size,
                }
            }
        };

        // Records are rewritten, never mutated in place; normalize the
        // legacy header encoding while we are at it
        record.header_base64 = Some(BASE64_STANDARD.encode(raw_header));
        record.header_string = None;
        json_out.write(&record)?;
        members += 1;
    }

    write_padding(&mut tar_out, tar_ledger.end_padding())?;

    warc_out.flush()?;
    tar_out.flush()?;
    json_out.finish()?.flush()?;

    info!(
        "fixed {}: {} members, {} moved to the residual tar",
        new.warc.display(),
        members,
        moved
    );
    Ok(FixStats { members, moved })
}
