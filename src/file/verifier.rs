use adler32::RollingAdler32;
use sha1::{Digest, Sha1};

use super::header::{
    hex, Header, DEX_ENDIAN_CONSTANT, SIGNATURE_END, SIGNATURE_OFFSET,
};
use crate::{dex_err, Result};

/// How much of the header integrity data is recomputed when opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum VerifyPreset {
    /// Structure only. Fast path for trusted input.
    None,
    /// Structure plus the adler32 checksum.
    #[default]
    ChecksumOnly,
    /// Structure, checksum and SHA-1 signature.
    All,
}

impl VerifyPreset {
    #[inline]
    pub fn checks_checksum(&self) -> bool {
        matches!(self, VerifyPreset::ChecksumOnly | VerifyPreset::All)
    }

    #[inline]
    pub fn checks_signature(&self) -> bool {
        matches!(self, VerifyPreset::All)
    }
}

/// Adler32 over everything after the checksum field.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    RollingAdler32::from_buffer(&data[SIGNATURE_OFFSET.min(data.len())..]).hash()
}

/// SHA-1 over everything after the signature field.
pub fn calculate_signature(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(&data[SIGNATURE_END.min(data.len())..]);
    let digest = hasher.finalize();
    let mut signature = [0u8; 20];
    signature.copy_from_slice(&digest[..20]);
    signature
}

pub(crate) fn check_header(header: &Header, data: &[u8], preset: VerifyPreset) -> Result<()> {
    let size = data.len();
    if !header.is_magic_valid() {
        return dex_err!(BadFileMagic);
    }

    if !header.is_version_valid() {
        let mut version = [0u8; 4];
        version.copy_from_slice(&header.get_magic()[4..]);
        return dex_err!(UnknownDexVersion { version });
    }

    // check file size from header
    let header_size = header.expected_header_size();
    let file_size = header.file_size as usize;
    if file_size < header_size {
        return dex_err!(FileSizeAtLeast {
            actual: file_size,
            expected: header_size
        });
    }
    if file_size != size {
        return dex_err!(FileSizeMismatch {
            declared: file_size,
            actual: size
        });
    }

    if header.header_size as usize != header_size {
        return dex_err!(BadHeaderSize {
            size: header.header_size,
            expected: header_size as u32
        });
    }

    if header.endian_tag != DEX_ENDIAN_CONSTANT {
        return dex_err!(UnexpectedEndianess, header.endian_tag);
    }

    if header.type_ids_size > u16::MAX as u32 {
        return dex_err!(SectionTooLarge {
            size: header.type_ids_size,
            max: u16::MAX as u32,
            section: "type-ids"
        });
    }
    if header.proto_ids_size > u16::MAX as u32 {
        return dex_err!(SectionTooLarge {
            size: header.proto_ids_size,
            max: u16::MAX as u32,
            section: "proto-ids"
        });
    }
    if header.data_size % 4 != 0 {
        return dex_err!(BadDataSize, header.data_size);
    }

    if preset.checks_checksum() {
        let checksum = calculate_checksum(data);
        if checksum != header.checksum {
            return dex_err!(BadChecksum {
                actual: checksum,
                expected: header.checksum
            });
        }
    }

    if preset.checks_signature() {
        let signature = calculate_signature(data);
        if &signature != header.get_signature() {
            return dex_err!(BadSignature {
                actual: hex(&signature),
                expected: header.signature_hex()
            });
        }
    }

    check_valid_offset_and_size(size, header_size, header.link_off, header.link_size as u64, "link")?;
    if header.map_off != 0 {
        check_valid_offset_and_size(size, header_size, header.map_off, 4, "map")?;
    }
    check_valid_offset_and_size(
        size,
        header_size,
        header.string_ids_off,
        header.string_ids_size as u64 * 4,
        "string-ids",
    )?;
    check_valid_offset_and_size(
        size,
        header_size,
        header.type_ids_off,
        header.type_ids_size as u64 * 4,
        "type-ids",
    )?;
    check_valid_offset_and_size(
        size,
        header_size,
        header.proto_ids_off,
        header.proto_ids_size as u64 * 12,
        "proto-ids",
    )?;
    check_valid_offset_and_size(
        size,
        header_size,
        header.field_ids_off,
        header.field_ids_size as u64 * 8,
        "field-ids",
    )?;
    check_valid_offset_and_size(
        size,
        header_size,
        header.method_ids_off,
        header.method_ids_size as u64 * 8,
        "method-ids",
    )?;
    check_valid_offset_and_size(
        size,
        header_size,
        header.class_defs_off,
        header.class_defs_size as u64 * 32,
        "class-defs",
    )?;
    check_valid_offset_and_size(size, header_size, header.data_off, header.data_size as u64, "data")?;
    Ok(())
}

fn check_valid_offset_and_size(
    file_size: usize,
    header_size: usize,
    offset: u32,
    byte_len: u64,
    label: &'static str,
) -> Result<()> {
    if byte_len == 0 {
        if offset != 0 {
            return dex_err!(BadOffsetNoSize {
                offset,
                section: label
            });
        }

        return Ok(());
    }

    if (offset as usize) < header_size {
        return dex_err!(BadOffsetInHeader {
            offset,
            header_size,
            section: label
        });
    }
    if offset as usize >= file_size {
        return dex_err!(BadOffsetTooLarge {
            offset,
            size: file_size,
            section: label
        });
    }

    let end = offset as u64 + byte_len;
    if end > file_size as u64 {
        return dex_err!(BadSection {
            end,
            size: file_size,
            section: label
        });
    }

    // TODO: alignment checks for the id sections (4-byte aligned per format)
    Ok(())
}
