use std::{
    fs,
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use super::{compare_multidex, not_found, Container, Source};
use crate::Result;

#[derive(Debug)]
enum EntrySource {
    Disk(PathBuf),
    Memory(Source),
}

/// Dex files that are already separate: a single `.dex` file, a directory of
/// them, or named in-memory images.
#[derive(Debug)]
pub struct DexContainer {
    location: String,
    entries: Vec<(String, EntrySource)>,
}

impl DexContainer {
    /// Opens a single dex file (memory-mapped) or every `*.dex` file in a
    /// directory. Directory entries are read when opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DexContainer> {
        let path = path.as_ref();
        let location = path.display().to_string();
        if !path.is_dir() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "classes.dex".to_string());
            return Ok(DexContainer::single(name, Source::map(path)?, location));
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(path)? {
            let item = item?;
            let entry_path = item.path();
            if !entry_path.is_file() || entry_path.extension().map_or(true, |ext| ext != "dex") {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            entries.push((name, EntrySource::Disk(entry_path)));
        }
        Ok(DexContainer::with_entries(location, entries))
    }

    /// A container holding one raw dex image named `classes.dex`.
    pub fn from_bytes(data: Vec<u8>) -> Result<DexContainer> {
        Ok(DexContainer::single(
            "classes.dex".to_string(),
            Source::Owned(data),
            "[in-memory]".to_string(),
        ))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<DexContainer> {
        Ok(DexContainer::single(
            "classes.dex".to_string(),
            Source::read_from(reader)?,
            "[reader]".to_string(),
        ))
    }

    /// A container over named in-memory dex images.
    pub fn from_entries<I>(entries: I) -> DexContainer
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, data)| (name, EntrySource::Memory(Source::Owned(data))))
            .collect();
        DexContainer::with_entries("[in-memory]".to_string(), entries)
    }

    pub(crate) fn single(name: String, source: Source, location: String) -> DexContainer {
        DexContainer::with_entries(location, vec![(name, EntrySource::Memory(source))])
    }

    fn with_entries(location: String, entries: Vec<(String, EntrySource)>) -> DexContainer {
        let mut unique: Vec<(String, EntrySource)> = Vec::with_capacity(entries.len());
        for (name, source) in entries {
            if unique.iter().any(|(n, _)| *n == name) {
                log::warn!("duplicate dex entry {name:?} in {location}, keeping the first one");
                continue;
            }
            unique.push((name, source));
        }
        unique.sort_by(|(a, _), (b, _)| compare_multidex(a, b));

        log::debug!("dex container {location} with {} entries", unique.len());
        DexContainer {
            location,
            entries: unique,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Container for DexContainer {
    fn list_entries(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn open_entry(&self, name: &str) -> Result<Vec<u8>> {
        match self.entries.iter().find(|(n, _)| n == name) {
            Some((_, EntrySource::Disk(path))) => Ok(fs::read(path)?),
            Some((_, EntrySource::Memory(source))) => Ok(source.to_vec()),
            None => Err(not_found(name)),
        }
    }
}
