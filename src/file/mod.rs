use std::{fmt, path::Path, sync::Arc};

pub mod structs;
pub use structs::*;
pub mod header;
pub use header::*;
pub mod class_accessor;
pub use class_accessor::*;
pub mod lazy;
pub use lazy::{LazyString, LazyType, Resolution};
pub mod modifiers;
pub mod pool;
pub use pool::*;
pub mod reader;
pub use reader::Endianness;
pub mod verifier;
pub use verifier::VerifyPreset;

use crate::Result;

/// Where a [`DexFile`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexLocation {
    InMemory,
    Path(String),
    /// An entry inside a container, as named by the container.
    Entry(String),
}

impl From<&str> for DexLocation {
    fn from(s: &str) -> Self {
        DexLocation::Path(s.to_string())
    }
}

impl fmt::Display for DexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexLocation::InMemory => write!(f, "[in-memory]"),
            DexLocation::Path(path) => write!(f, "{path}"),
            DexLocation::Entry(name) => write!(f, "{name}"),
        }
    }
}

/// A parsed dex file: its header, the index pools and the raw bytes.
///
/// Construction validates the header according to a [`VerifyPreset`];
/// everything past the id tables is read on demand through [`DexFile::pool`].
#[derive(Debug)]
pub struct DexFile {
    header: Header,
    pool: DexPool,
    data: Arc<[u8]>,
    location: DexLocation,
}

impl DexFile {
    /// Reads and parses the file at `path`, verifying the checksum.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<DexFile> {
        DexFile::from_path_with(path, VerifyPreset::default())
    }

    pub fn from_path_with<P: AsRef<Path>>(path: P, preset: VerifyPreset) -> Result<DexFile> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let location = DexLocation::Path(path.display().to_string());
        DexFile::open(data.into(), location, preset)
    }

    /// Parses an in-memory dex image, verifying the checksum.
    pub fn from_bytes<B: Into<Arc<[u8]>>>(data: B) -> Result<DexFile> {
        DexFile::from_bytes_with(data, VerifyPreset::default())
    }

    pub fn from_bytes_with<B: Into<Arc<[u8]>>>(data: B, preset: VerifyPreset) -> Result<DexFile> {
        DexFile::open(data.into(), DexLocation::InMemory, preset)
    }

    /// Parses an in-memory dex image and decodes every string up front, so a
    /// malformed string fails here instead of on first lookup.
    pub fn from_bytes_eager<B: Into<Arc<[u8]>>>(data: B, preset: VerifyPreset) -> Result<DexFile> {
        DexFile::from_bytes_with(data, preset)?.load_strings()
    }

    pub fn from_path_eager<P: AsRef<Path>>(path: P, preset: VerifyPreset) -> Result<DexFile> {
        DexFile::from_path_with(path, preset)?.load_strings()
    }

    fn load_strings(self) -> Result<DexFile> {
        let strings = self.pool.load_all_strings()?;
        log::debug!("{}: loaded {} strings eagerly", self.location, strings.len());
        Ok(self)
    }

    pub(crate) fn open(
        data: Arc<[u8]>,
        location: DexLocation,
        preset: VerifyPreset,
    ) -> Result<DexFile> {
        let header = Header::parse(&data, preset)?;
        let pool = DexPool::new(data.clone(), &header)?;
        log::debug!(
            "opened dex {} (version {:03}, {} bytes, {} classes, {:?} endian)",
            location,
            header.get_version(),
            data.len(),
            header.class_defs_size,
            header.byte_order()
        );
        Ok(DexFile {
            header,
            pool,
            data,
            location,
        })
    }

    pub fn with_location(mut self, location: DexLocation) -> DexFile {
        self.location = location;
        self
    }

    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline(always)]
    pub fn pool(&self) -> &DexPool {
        &self.pool
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn location(&self) -> &DexLocation {
        &self.location
    }

    #[inline(always)]
    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    /// Adler32 of this file as it would be stored in the header.
    pub fn calculate_checksum(&self) -> u32 {
        verifier::calculate_checksum(&self.data)
    }

    /// SHA-1 of this file as it would be stored in the header.
    pub fn calculate_signature(&self) -> [u8; 20] {
        verifier::calculate_signature(&self.data)
    }
}
