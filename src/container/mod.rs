//! Containers that carry dex files: plain `.dex` files, ZIP based archives
//! (JAR, APK) and bundles of APKs (XAPK, APKS).
//!
//! Every container lists the dex entries it holds and opens them by name
//! through the [`Container`] trait. Entries of a bundle are named
//! `<member>!/<entry>`.

use std::{
    cmp::Ordering,
    fmt,
    fs::File,
    io::{Read, Seek, SeekFrom},
    ops::Deref,
    path::Path,
};

use memmap2::Mmap;
use serde::Serialize;

use crate::{
    error::DexError,
    file::{DexFile, DexLocation, VerifyPreset, DEX_MAGIC},
    Result,
};

/// Generates the path, buffer and reader constructors for a container with
/// a `from_source(Source, String)` constructor.
macro_rules! impl_constructors {
    ($ty:ident) => {
        impl $ty {
            /// Memory-maps the file at `path`.
            pub fn open<P: AsRef<std::path::Path>>(path: P) -> $crate::Result<$ty> {
                let path = path.as_ref();
                $ty::from_source(
                    $crate::container::Source::map(path)?,
                    path.display().to_string(),
                )
            }

            pub fn from_bytes(data: Vec<u8>) -> $crate::Result<$ty> {
                $ty::from_source(
                    $crate::container::Source::Owned(data),
                    "[in-memory]".to_string(),
                )
            }

            pub fn from_reader<R: std::io::Read + std::io::Seek>(reader: R) -> $crate::Result<$ty> {
                $ty::from_source(
                    $crate::container::Source::read_from(reader)?,
                    "[reader]".to_string(),
                )
            }
        }
    };
}

#[cfg(test)]
#[path = "../../tests/common/zip.rs"]
pub(crate) mod test_zip;

pub mod archive;
pub use archive::{ApkContainer, JarContainer, ZipContainer};
pub mod bundle;
pub use bundle::{ApksContainer, MultiApkContainer, XapkContainer};
pub mod dex;
pub use dex::DexContainer;
pub mod zip;

/// Separator between a bundle member and the entry inside it.
pub const MEMBER_SEPARATOR: &str = "!/";

pub(crate) const ANDROID_MANIFEST: &str = "AndroidManifest.xml";
pub(crate) const BASE_APK: &str = "base.apk";
pub(crate) const XAPK_MANIFEST: &str = "manifest.json";

pub trait Container {
    /// Names of the dex entries, in load order.
    fn list_entries(&self) -> Vec<String>;

    /// Reads the entry `name` into an owned buffer.
    fn open_entry(&self, name: &str) -> Result<Vec<u8>>;

    /// Reads and parses the dex entry `name`.
    fn open_dex(&self, name: &str, preset: VerifyPreset) -> Result<DexFile> {
        let data = self.open_entry(name)?;
        let dex = DexFile::from_bytes_with(data, preset)?;
        Ok(dex.with_location(DexLocation::Entry(name.to_string())))
    }

    /// Parses every listed dex entry. A failing entry is reported in place
    /// and does not affect the others.
    fn fetch_dex_files(&self, preset: VerifyPreset) -> Vec<(String, Result<DexFile>)> {
        self.list_entries()
            .into_iter()
            .map(|name| {
                let dex = self.open_dex(&name, preset);
                if let Err(err) = &dex {
                    log::warn!("skipping dex entry {name}: {err}");
                }
                (name, dex)
            })
            .collect()
    }
}

/// Backing storage of a container: a read-only file mapping or an owned
/// buffer.
pub enum Source {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Source {
    pub fn map<P: AsRef<Path>>(path: P) -> Result<Source> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only; the file must not be truncated
        // while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Source::Mapped(mmap))
    }

    pub fn read_from<R: Read + Seek>(mut reader: R) -> Result<Source> {
        reader.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Source::Owned(data))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Source::Mapped(_) => "Mapped",
            Source::Owned(_) => "Owned",
        };
        write!(f, "Source::{kind}({} bytes)", self.len())
    }
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Source::Mapped(mmap) => mmap,
            Source::Owned(data) => data,
        }
    }
}

/// Sorts dex entry names the way the runtime loads them: `classes.dex`,
/// then `classesN.dex` by increasing `N`, then everything else by name.
pub fn sort_multidex(names: &mut [String]) {
    names.sort_by(|a, b| compare_multidex(a, b));
}

fn multidex_rank(name: &str) -> (u8, u32) {
    if name == "classes.dex" {
        return (0, 0);
    }
    let number = name
        .strip_prefix("classes")
        .and_then(|rest| rest.strip_suffix(".dex"))
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse::<u32>().ok());
    match number {
        Some(n) => (1, n),
        None => (2, 0),
    }
}

pub(crate) fn compare_multidex(a: &str, b: &str) -> Ordering {
    multidex_rank(a)
        .cmp(&multidex_rank(b))
        .then_with(|| a.cmp(b))
}

/// Kinds of containers [`open`] can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    Dex,
    Directory,
    Jar,
    Apk,
    Xapk,
    Apks,
}

impl ContainerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContainerKind::Dex => "dex",
            ContainerKind::Directory => "directory",
            ContainerKind::Jar => "jar",
            ContainerKind::Apk => "apk",
            ContainerKind::Xapk => "xapk",
            ContainerKind::Apks => "apks",
        }
    }
}

/// Detects the container at `path` and opens it.
pub fn open<P: AsRef<Path>>(path: P) -> Result<(ContainerKind, Box<dyn Container>)> {
    let path = path.as_ref();
    if path.is_dir() {
        log::debug!("opening {} as a dex directory", path.display());
        let container = DexContainer::open(path)?;
        return Ok((ContainerKind::Directory, Box::new(container)));
    }
    let dex_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "classes.dex".to_string());
    from_source(Source::map(path)?, path.display().to_string(), dex_name)
}

/// Detects the container held in `data` and opens it.
pub fn from_bytes(data: Vec<u8>) -> Result<(ContainerKind, Box<dyn Container>)> {
    from_source(
        Source::Owned(data),
        "[in-memory]".to_string(),
        "classes.dex".to_string(),
    )
}

fn from_source(
    source: Source,
    location: String,
    dex_name: String,
) -> Result<(ContainerKind, Box<dyn Container>)> {
    if source.starts_with(DEX_MAGIC) {
        log::debug!("opening {location} as a dex file");
        let container = DexContainer::single(dex_name, source, location);
        return Ok((ContainerKind::Dex, Box::new(container)));
    }

    let archive = zip::ZipArchive::new(source)?;
    let kind = sniff_archive(&archive);
    log::debug!("opening {location} as {}", kind.name());
    let container: Box<dyn Container> = match kind {
        ContainerKind::Xapk => Box::new(XapkContainer::from_archive(archive, location)?),
        ContainerKind::Apks => Box::new(ApksContainer::from_archive(archive, location)?),
        ContainerKind::Apk => Box::new(ApkContainer::from_archive(archive, location)?),
        _ => Box::new(JarContainer::from_archive(archive, location)),
    };
    Ok((kind, container))
}

/// Classifies a ZIP archive by its well-known members.
pub fn sniff_archive(archive: &zip::ZipArchive) -> ContainerKind {
    let manifest = archive
        .entries()
        .iter()
        .find(|e| e.file_name() == XAPK_MANIFEST);
    if let Some(entry) = manifest {
        let has_splits = archive
            .read_entry(entry)
            .ok()
            .and_then(|data| serde_json::from_slice::<serde_json::Value>(&data).ok())
            .is_some_and(|json| json.get("split_apks").is_some());
        if has_splits {
            return ContainerKind::Xapk;
        }
    }

    if archive.entries().iter().any(|e| e.file_name() == BASE_APK) {
        ContainerKind::Apks
    } else if archive.contains(ANDROID_MANIFEST) {
        ContainerKind::Apk
    } else {
        ContainerKind::Jar
    }
}

pub(crate) fn not_found(name: &str) -> DexError {
    DexError::EntryNotFound(name.to_string())
}
