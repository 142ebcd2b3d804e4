//! Read-only ZIP archive reader.
//!
//! Supports what APK/JAR tooling emits in practice: a single-disk archive
//! with stored or deflated entries. ZIP64 and encrypted entries are
//! rejected.

use std::{collections::HashMap, fmt, io::Read};

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::DeflateDecoder;

use super::Source;
use crate::{dex_err, error::DexError, Result};

pub const LOCAL_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_DIR_SIGNATURE: u32 = 0x02014b50;
pub const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054b50;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x07064b50;

const LOCAL_HEADER_SIZE: usize = 30;
const CENTRAL_DIR_HEADER_SIZE: usize = 46;
const END_OF_CENTRAL_DIR_SIZE: usize = 22;
const ZIP64_LOCATOR_SIZE: usize = 20;
const MAX_COMMENT_SIZE: usize = u16::MAX as usize;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATED: u16 = 8;

const FLAG_ENCRYPTED: u16 = 0x0001;

/// One central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub flags: u16,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

impl ZipEntry {
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Last path component of the entry name.
    pub fn file_name(&self) -> &str {
        file_name(&self.name)
    }
}

pub(crate) fn file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// A parsed ZIP archive over an owned or memory-mapped buffer.
///
/// Only the central directory is read on construction; entry data is located,
/// decompressed and checked when requested.
pub struct ZipArchive {
    source: Source,
    entries: Vec<ZipEntry>,
    by_name: HashMap<String, usize>,
}

impl fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("source", &self.source)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl ZipArchive {
    pub fn new(source: Source) -> Result<ZipArchive> {
        let data: &[u8] = &source;
        let eocd_off = find_end_of_central_dir(data)?;
        let eocd = &data[eocd_off..];

        let disk = LittleEndian::read_u16(&eocd[4..]);
        let cd_disk = LittleEndian::read_u16(&eocd[6..]);
        let disk_entries = LittleEndian::read_u16(&eocd[8..]);
        let total_entries = LittleEndian::read_u16(&eocd[10..]);
        let cd_size = LittleEndian::read_u32(&eocd[12..]);
        let cd_offset = LittleEndian::read_u32(&eocd[16..]);

        if total_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX {
            return dex_err!(UnsupportedZip64);
        }
        if eocd_off >= ZIP64_LOCATOR_SIZE
            && LittleEndian::read_u32(&data[eocd_off - ZIP64_LOCATOR_SIZE..])
                == ZIP64_LOCATOR_SIGNATURE
        {
            return dex_err!(UnsupportedZip64);
        }
        if disk != 0 || cd_disk != 0 || disk_entries != total_entries {
            return dex_err!(BadZipArchive, "multi-disk archives are not supported");
        }

        let cd_end = cd_offset as usize + cd_size as usize;
        if cd_end > eocd_off {
            return dex_err!(
                BadZipDirectory,
                "central directory ({cd_offset}+{cd_size}) overlaps the end record at {eocd_off}"
            );
        }

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut by_name = HashMap::with_capacity(total_entries as usize);
        let mut pos = cd_offset as usize;
        for _ in 0..total_entries {
            let (entry, record_len) = read_central_dir_entry(&data[..cd_end], pos)?;
            pos += record_len;

            if by_name.contains_key(&entry.name) {
                log::warn!("duplicate zip entry {:?}, keeping the first one", entry.name);
                continue;
            }
            by_name.insert(entry.name.clone(), entries.len());
            entries.push(entry);
        }

        log::debug!("zip archive with {} entries", entries.len());
        Ok(ZipArchive {
            source,
            entries,
            by_name,
        })
    }

    /// Entries in central directory order, duplicates removed.
    #[inline(always)]
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.by_name.get(name).map(|idx| &self.entries[*idx])
    }

    /// Raw bytes of the whole archive.
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.source
    }

    /// Decompresses the entry `name` and checks its length and CRC32.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        match self.entry(name) {
            Some(entry) => self.read_entry(entry),
            None => dex_err!(EntryNotFound, name.to_string()),
        }
    }

    pub fn read_entry(&self, entry: &ZipEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            return dex_err!(EncryptedEntry {
                name: entry.name.clone()
            });
        }

        let raw = self.raw_entry_data(entry)?;
        let data = match entry.method {
            METHOD_STORED => raw.to_vec(),
            METHOD_DEFLATED => {
                // the declared size is untrusted, deflate cannot expand past ~1032:1
                let capacity =
                    (entry.uncompressed_size as usize).min(raw.len().saturating_mul(1032));
                let mut out = Vec::with_capacity(capacity);
                // one extra byte so an oversized stream shows up as a length mismatch
                let limit = entry.uncompressed_size as u64 + 1;
                DeflateDecoder::new(raw)
                    .take(limit)
                    .read_to_end(&mut out)
                    .map_err(|e| corrupt(entry, format!("inflate failed: {e}")))?;
                out
            }
            method => {
                return dex_err!(UnsupportedCompression {
                    name: entry.name.clone(),
                    method
                })
            }
        };

        if data.len() != entry.uncompressed_size as usize {
            return Err(corrupt(
                entry,
                format!(
                    "expected {} bytes, got {}",
                    entry.uncompressed_size,
                    data.len()
                ),
            ));
        }

        let crc = crc32fast::hash(&data);
        if crc != entry.crc32 {
            return dex_err!(CrcMismatch {
                name: entry.name.clone(),
                actual: crc,
                expected: entry.crc32
            });
        }
        Ok(data)
    }

    fn raw_entry_data(&self, entry: &ZipEntry) -> Result<&[u8]> {
        let data = self.data();
        let off = entry.local_header_offset as usize;
        let header = match data.get(off..off + LOCAL_HEADER_SIZE) {
            Some(header) => header,
            None => return Err(corrupt(entry, "local header out of bounds".to_string())),
        };
        if LittleEndian::read_u32(header) != LOCAL_HEADER_SIGNATURE {
            return Err(corrupt(entry, "bad local header signature".to_string()));
        }

        let name_len = LittleEndian::read_u16(&header[26..]) as usize;
        let extra_len = LittleEndian::read_u16(&header[28..]) as usize;
        let start = off + LOCAL_HEADER_SIZE + name_len + extra_len;
        // sizes in the local header may be zero when a data descriptor follows,
        // the central directory is authoritative
        let end = start + entry.compressed_size as usize;
        match data.get(start..end) {
            Some(raw) => Ok(raw),
            None => Err(corrupt(entry, "entry data out of bounds".to_string())),
        }
    }
}

fn corrupt(entry: &ZipEntry, reason: String) -> DexError {
    DexError::CorruptEntry {
        name: entry.name.clone(),
        reason,
    }
}

/// Scans backwards for the end of central directory record, which may be
/// followed by a comment of up to 64k. The last record whose comment fits in
/// the buffer wins, so bytes appended after the archive are ignored.
fn find_end_of_central_dir(data: &[u8]) -> Result<usize> {
    if data.len() < END_OF_CENTRAL_DIR_SIZE {
        return dex_err!(BadZipArchive, "file too small ({} bytes)", data.len());
    }

    let last = data.len() - END_OF_CENTRAL_DIR_SIZE;
    let first = last.saturating_sub(MAX_COMMENT_SIZE);
    for off in (first..=last).rev() {
        if LittleEndian::read_u32(&data[off..]) != END_OF_CENTRAL_DIR_SIGNATURE {
            continue;
        }
        let comment_len = LittleEndian::read_u16(&data[off + 20..]) as usize;
        if off + END_OF_CENTRAL_DIR_SIZE + comment_len <= data.len() {
            return Ok(off);
        }
    }
    dex_err!(BadZipArchive, "end of central directory record not found")
}

fn read_central_dir_entry(data: &[u8], pos: usize) -> Result<(ZipEntry, usize)> {
    let header = match data.get(pos..pos + CENTRAL_DIR_HEADER_SIZE) {
        Some(header) => header,
        None => return dex_err!(BadZipDirectory, "truncated record at {pos}"),
    };
    if LittleEndian::read_u32(header) != CENTRAL_DIR_SIGNATURE {
        return dex_err!(BadZipDirectory, "bad record signature at {pos}");
    }

    let name_len = LittleEndian::read_u16(&header[28..]) as usize;
    let extra_len = LittleEndian::read_u16(&header[30..]) as usize;
    let comment_len = LittleEndian::read_u16(&header[32..]) as usize;
    let name_start = pos + CENTRAL_DIR_HEADER_SIZE;
    let name = match data.get(name_start..name_start + name_len) {
        Some(raw) => String::from_utf8_lossy(raw).into_owned(),
        None => return dex_err!(BadZipDirectory, "truncated entry name at {pos}"),
    };

    let entry = ZipEntry {
        name,
        flags: LittleEndian::read_u16(&header[8..]),
        method: LittleEndian::read_u16(&header[10..]),
        crc32: LittleEndian::read_u32(&header[16..]),
        compressed_size: LittleEndian::read_u32(&header[20..]),
        uncompressed_size: LittleEndian::read_u32(&header[24..]),
        local_header_offset: LittleEndian::read_u32(&header[42..]),
    };
    if entry.compressed_size == u32::MAX
        || entry.uncompressed_size == u32::MAX
        || entry.local_header_offset == u32::MAX
    {
        return dex_err!(UnsupportedZip64);
    }

    Ok((
        entry,
        CENTRAL_DIR_HEADER_SIZE + name_len + extra_len + comment_len,
    ))
}
