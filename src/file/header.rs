use serde::Serialize;

use super::{
    reader::{DexReader, Endianness},
    verifier::{self, VerifyPreset},
};
use crate::{dex_err, Result};

pub const DEX_MAGIC: &[u8] = b"dex\n";
pub const DEX_MAGIC_VERSIONS: &[&[u8]] = &[
    b"035\0", b"037\0", // Dex version 038: Android "O" and beyond.
    b"038\0", // Dex version 039: Android "P" and beyond.
    b"039\0", // Dex version 040: Android "Q" and beyond (aka Android 10).
    b"040\0", // Dex version 041: Android "V" and beyond (aka Android 15).
    b"041\0",
];

pub const DEX_ENDIAN_CONSTANT: u32 = 0x12345678;
/// `DEX_ENDIAN_CONSTANT` as it reads from a byte-swapped file.
pub const DEX_REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

pub const HEADER_SIZE: usize = 0x70;
pub const HEADER_V41_SIZE: usize = 0x78;

/// Marks an absent index (e.g. a class without superclass).
pub const NO_INDEX: u32 = 0xFFFFFFFF;

pub(crate) const CHECKSUM_OFFSET: usize = 0x08;
pub(crate) const SIGNATURE_OFFSET: usize = 0x0C;
pub(crate) const SIGNATURE_END: usize = 0x20;
const ENDIAN_TAG_OFFSET: usize = 0x28;

#[derive(Debug, Clone, Serialize)]
pub struct Header {
    /// magic value
    magic: [u8; 8],

    /// Taken from Android docs:
    ///
    /// Adler32 checksum of the rest of the file (everything but `magic` and this
    /// field); used to detect file corruption.
    pub checksum: u32,

    /// Android docs:
    ///
    /// SHA-1 signature (hash) of the rest of the file (everything but `magic`,
    /// `checksum`, and this field); used to uniquely identify files.
    signature: [u8; 20],

    /// Size of the entire file including the header.
    pub file_size: u32,

    /// Size of the header in bytes: 0x70, or 0x78 for version 041.
    pub header_size: u32,

    /// Endian constant, as decoded with [`Header::byte_order`].
    pub endian_tag: u32,

    /// size of the link section, or 0 if this file isn't statically linked
    pub link_size: u32,

    /// offset from the start of the file to the link section, or `0` if
    /// `link_size == 0`.
    pub link_off: u32,

    /// offset from the start of the file to the map item. The offset, which
    /// must be non-zero, should be to an offset into the `data` section.
    pub map_off: u32,

    /// count of strings in the string identifiers list
    pub string_ids_size: u32,

    /// offset from the start of the file to the string identifiers list, or
    /// `0` if `string_ids_size == 0`.
    pub string_ids_off: u32,

    /// count of elements in the type identifiers list, at most `65535`
    pub type_ids_size: u32,
    pub type_ids_off: u32,

    /// count of elements in the proto identifiers list, at most `65535`
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,

    pub field_ids_size: u32,
    pub field_ids_off: u32,

    pub method_ids_size: u32,
    pub method_ids_off: u32,

    pub class_defs_size: u32,
    pub class_defs_off: u32,

    /// size of the data section (in bytes)
    pub data_size: u32,

    /// offset from the start of the file to the data section
    pub data_off: u32,

    /// Version 041 only: total size of all dex files in the container.
    pub container_size: Option<u32>,

    /// Version 041 only: offset of this dex's header in the container.
    pub header_off: Option<u32>,

    byte_order: Endianness,
}

impl Header {
    /// Decodes and validates the header of `data` according to `preset`.
    pub fn parse(data: &[u8], preset: VerifyPreset) -> Result<Header> {
        let header = Header::read(data)?;
        verifier::check_header(&header, data, preset)?;
        Ok(header)
    }

    /// Decodes the raw header fields without validating them.
    pub fn read(data: &[u8]) -> Result<Header> {
        if data.len() < HEADER_SIZE {
            return dex_err!(TruncatedFile);
        }

        let tag = DexReader::new(data, Endianness::Little).u32_at(ENDIAN_TAG_OFFSET)?;
        let byte_order = if tag == DEX_REVERSE_ENDIAN_CONSTANT {
            Endianness::Big
        } else {
            Endianness::Little
        };
        let r = DexReader::new(data, byte_order);

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[..8]);
        let mut signature = [0u8; 20];
        signature.copy_from_slice(&data[SIGNATURE_OFFSET..SIGNATURE_END]);

        let header_size = r.u32_at(0x24)?;
        let (container_size, header_off) =
            if header_size as usize >= HEADER_V41_SIZE && data.len() >= HEADER_V41_SIZE {
                (Some(r.u32_at(0x70)?), Some(r.u32_at(0x74)?))
            } else {
                (None, None)
            };

        Ok(Header {
            magic,
            checksum: r.u32_at(CHECKSUM_OFFSET)?,
            signature,
            file_size: r.u32_at(0x20)?,
            header_size,
            endian_tag: r.u32_at(ENDIAN_TAG_OFFSET)?,
            link_size: r.u32_at(0x2C)?,
            link_off: r.u32_at(0x30)?,
            map_off: r.u32_at(0x34)?,
            string_ids_size: r.u32_at(0x38)?,
            string_ids_off: r.u32_at(0x3C)?,
            type_ids_size: r.u32_at(0x40)?,
            type_ids_off: r.u32_at(0x44)?,
            proto_ids_size: r.u32_at(0x48)?,
            proto_ids_off: r.u32_at(0x4C)?,
            field_ids_size: r.u32_at(0x50)?,
            field_ids_off: r.u32_at(0x54)?,
            method_ids_size: r.u32_at(0x58)?,
            method_ids_off: r.u32_at(0x5C)?,
            class_defs_size: r.u32_at(0x60)?,
            class_defs_off: r.u32_at(0x64)?,
            data_size: r.u32_at(0x68)?,
            data_off: r.u32_at(0x6C)?,
            container_size,
            header_off,
            byte_order,
        })
    }

    pub fn get_magic(&self) -> &[u8; 8] {
        &self.magic
    }

    pub fn get_signature(&self) -> &[u8; 20] {
        &self.signature
    }

    pub fn byte_order(&self) -> Endianness {
        self.byte_order
    }

    /// Numeric dex version, `0` if the magic carries no parseable version.
    pub fn get_version(&self) -> u32 {
        let version_raw = &self.magic[4..7];
        String::from_utf8_lossy(version_raw)
            .parse()
            .unwrap_or_default() // rejected by the verifier
    }

    pub fn is_magic_valid(&self) -> bool {
        &self.magic[..4] == DEX_MAGIC
    }

    pub fn is_version_valid(&self) -> bool {
        DEX_MAGIC_VERSIONS.contains(&&self.magic[4..])
    }

    pub fn expected_header_size(&self) -> usize {
        if self.get_version() >= 41 {
            HEADER_V41_SIZE
        } else {
            HEADER_SIZE
        }
    }

    pub fn signature_hex(&self) -> String {
        hex(&self.signature)
    }
}

pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
