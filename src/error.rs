use std::fmt::Debug;

use thiserror::Error;

/// Coarse classification of a [`DexError`].
///
/// Batch tools use this to decide whether to abort (structural problems with
/// the file being loaded) or to skip one item and continue (bad references,
/// undecodable strings, single corrupt archive entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    Structural,
    Reference,
    Encoding,
    Archive,
    Io,
}

#[derive(Error)]
pub enum DexError {
    // -- structural
    #[error("Empty or truncated file")]
    TruncatedFile,

    #[error("Bad file magic")]
    BadFileMagic,

    #[error("Unknown dex version: {version:?}")]
    UnknownDexVersion { version: [u8; 4] },

    #[error("Bad file size ({actual}, expected at least {expected})")]
    FileSizeAtLeast { actual: usize, expected: usize },

    #[error("Bad file size ({declared}) does not match the buffer length ({actual})")]
    FileSizeMismatch { declared: usize, actual: usize },

    #[error("Bad header size: {size}, expected {expected}")]
    BadHeaderSize { size: u32, expected: u32 },

    #[error("Unexpected endian tag: {0:#x}")]
    UnexpectedEndianess(u32),

    #[error("Bad checksum: {actual:#010x}, expected {expected:#010x}")]
    BadChecksum { actual: u32, expected: u32 },

    #[error("Bad signature: computed {actual}, header has {expected}")]
    BadSignature { actual: String, expected: String },

    #[error("Too many {section} ({size}), the limit is {max}")]
    SectionTooLarge {
        size: u32,
        max: u32,
        section: &'static str,
    },

    #[error("Data size ({0}) must be a multiple of 4")]
    BadDataSize(u32),

    #[error("Offset({offset}) should be within file size {size} for {section}")]
    BadOffsetTooLarge {
        offset: u32,
        size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be after header({header_size}) for {section}")]
    BadOffsetInHeader {
        offset: u32,
        header_size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be zero when size is zero for {section}")]
    BadOffsetNoSize { offset: u32, section: &'static str },

    #[error("Section end({end}) should be within file size {size} for {section}")]
    BadSection {
        end: u64,
        size: usize,
        section: &'static str,
    },

    // -- reference
    #[error("Index({index}) to {item_ty} should be less than {max}")]
    DexIndexError {
        index: u32,
        max: usize,
        item_ty: &'static str,
    },

    #[error("Failed to read {item_ty} at offset {offset} (len={len}): overflows file size({file_size})")]
    DexLayoutError {
        offset: usize,
        len: usize,
        item_ty: &'static str,
        file_size: usize,
    },

    // -- encoding
    #[error("Bad string data({0}) does not end with a null byte!")]
    BadStringDataMissingNullByte(usize),

    #[error("Bad string data({offset}): {source}")]
    BadStringData {
        offset: usize,
        #[source]
        source: Box<DexError>,
    },

    #[error("Bad string data({offset}): declared {declared} UTF-16 units, decoded {actual}")]
    StringLengthMismatch {
        offset: usize,
        declared: u32,
        actual: usize,
    },

    #[error("{0}")]
    Mutf8DecodeError(#[from] std::string::FromUtf16Error),

    #[error("Got invalid mUTF8 sequence at byte {idx} of {len}")]
    MalformedMUTF8Sequence { idx: usize, len: usize },

    #[error("LEB128 value at byte {offset} does not fit into 32 bits")]
    Leb128Overflow { offset: usize },

    #[error("LEB128 value starting at byte {offset} is not terminated")]
    Leb128Truncated { offset: usize },

    #[error("Encountered invalid encoded index that would overflow: index({index}) + next index({next_index}) > u32::MAX for {item_ty}")]
    BadEncodedIndex {
        index: u32,
        next_index: u32,
        item_ty: &'static str,
    },

    // -- archive
    #[error("Not a zip archive: {0}")]
    BadZipArchive(String),

    #[error("Corrupt zip directory: {0}")]
    BadZipDirectory(String),

    #[error("Zip64 archives are not supported")]
    UnsupportedZip64,

    #[error("Entry {name} uses unsupported compression method {method}")]
    UnsupportedCompression { name: String, method: u16 },

    #[error("Entry {name} is encrypted")]
    EncryptedEntry { name: String },

    #[error("Entry {name} is corrupt: {reason}")]
    CorruptEntry { name: String, reason: String },

    #[error("CRC mismatch for {name}: computed {actual:#010x}, directory has {expected:#010x}")]
    CrcMismatch {
        name: String,
        actual: u32,
        expected: u32,
    },

    #[error("No such entry: {0}")]
    EntryNotFound(String),

    #[error("Missing {0} in container")]
    MissingContainerFile(&'static str),

    #[error("Bad bundle manifest: {0}")]
    BadManifest(String),

    // -- io
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl DexError {
    pub fn kind(&self) -> ErrorKind {
        use DexError::*;
        match self {
            TruncatedFile
            | BadFileMagic
            | UnknownDexVersion { .. }
            | FileSizeAtLeast { .. }
            | FileSizeMismatch { .. }
            | BadHeaderSize { .. }
            | UnexpectedEndianess(_)
            | BadChecksum { .. }
            | BadSignature { .. }
            | SectionTooLarge { .. }
            | BadDataSize(_)
            | BadOffsetTooLarge { .. }
            | BadOffsetInHeader { .. }
            | BadOffsetNoSize { .. }
            | BadSection { .. } => ErrorKind::Structural,

            DexIndexError { .. } | DexLayoutError { .. } => ErrorKind::Reference,

            BadStringDataMissingNullByte(_)
            | BadStringData { .. }
            | StringLengthMismatch { .. }
            | Mutf8DecodeError(_)
            | MalformedMUTF8Sequence { .. }
            | Leb128Overflow { .. }
            | Leb128Truncated { .. }
            | BadEncodedIndex { .. } => ErrorKind::Encoding,

            BadZipArchive(_)
            | BadZipDirectory(_)
            | UnsupportedZip64
            | UnsupportedCompression { .. }
            | EncryptedEntry { .. }
            | CorruptEntry { .. }
            | CrcMismatch { .. }
            | EntryNotFound(_)
            | MissingContainerFile(_)
            | BadManifest(_) => ErrorKind::Archive,

            Io(_) => ErrorKind::Io,
        }
    }

    #[inline]
    pub fn is_structural(&self) -> bool {
        self.kind() == ErrorKind::Structural
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.kind() == ErrorKind::Reference
    }

    #[inline]
    pub fn is_encoding(&self) -> bool {
        self.kind() == ErrorKind::Encoding
    }

    #[inline]
    pub fn is_archive(&self) -> bool {
        self.kind() == ErrorKind::Archive
    }
}

#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err($crate::error::DexError::$name)
    };
    ($name:ident { $($arg:tt)* }) => {
        Err($crate::error::DexError::$name { $($arg)* })
    };
    ($name:ident, $arg1:literal, $($arg:tt)*) => {
        Err($crate::error::DexError::$name(format!($arg1, $($arg)*)))
    };
    ($name:ident, $arg1:literal) => {
        Err($crate::error::DexError::$name(format!($arg1)))
    };
    ($name:ident, $($arg:tt)*) => {
        Err($crate::error::DexError::$name($($arg)*))
    };
}

impl Debug for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
