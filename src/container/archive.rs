use super::{
    sort_multidex,
    zip::{ZipArchive, ZipEntry},
    Container, Source, ANDROID_MANIFEST,
};
use crate::{dex_err, Result};

/// A ZIP archive holding `.dex` entries.
///
/// With `root_only` set, only entries at the top level of the archive are
/// listed.
#[derive(Debug)]
pub struct ZipContainer {
    archive: ZipArchive,
    root_only: bool,
    location: String,
}

impl_constructors!(ZipContainer);

impl ZipContainer {
    fn from_source(source: Source, location: String) -> Result<ZipContainer> {
        Ok(ZipContainer::from_archive(
            ZipArchive::new(source)?,
            false,
            location,
        ))
    }

    pub fn from_archive(archive: ZipArchive, root_only: bool, location: String) -> ZipContainer {
        log::debug!(
            "zip container {location} ({} entries, root_only={root_only})",
            archive.entries().len()
        );
        ZipContainer {
            archive,
            root_only,
            location,
        }
    }

    pub fn with_root_only(mut self, root_only: bool) -> ZipContainer {
        self.root_only = root_only;
        self
    }

    #[inline(always)]
    pub fn root_only(&self) -> bool {
        self.root_only
    }

    #[inline(always)]
    pub fn archive(&self) -> &ZipArchive {
        &self.archive
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn is_dex_entry(&self, entry: &ZipEntry) -> bool {
        !entry.is_dir()
            && entry.name.ends_with(".dex")
            && !(self.root_only && entry.name.contains('/'))
    }
}

impl Container for ZipContainer {
    fn list_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .archive
            .entries()
            .iter()
            .filter(|e| self.is_dex_entry(e))
            .map(|e| e.name.clone())
            .collect();
        sort_multidex(&mut names);
        names
    }

    fn open_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.archive.read(name)
    }
}

/// A Java archive; dex entries are listed at any depth.
#[derive(Debug)]
pub struct JarContainer(ZipContainer);

impl_constructors!(JarContainer);

impl JarContainer {
    fn from_source(source: Source, location: String) -> Result<JarContainer> {
        Ok(JarContainer::from_archive(ZipArchive::new(source)?, location))
    }

    pub fn from_archive(archive: ZipArchive, location: String) -> JarContainer {
        JarContainer(ZipContainer::from_archive(archive, false, location))
    }

    pub fn zip(&self) -> &ZipContainer {
        &self.0
    }
}

/// An Android package; only dex entries at the archive root are listed and
/// the archive must carry an `AndroidManifest.xml`.
#[derive(Debug)]
pub struct ApkContainer(ZipContainer);

impl_constructors!(ApkContainer);

impl ApkContainer {
    fn from_source(source: Source, location: String) -> Result<ApkContainer> {
        ApkContainer::from_archive(ZipArchive::new(source)?, location)
    }

    pub fn from_archive(archive: ZipArchive, location: String) -> Result<ApkContainer> {
        if !archive.contains(ANDROID_MANIFEST) {
            return dex_err!(MissingContainerFile, ANDROID_MANIFEST);
        }
        Ok(ApkContainer(ZipContainer::from_archive(
            archive, true, location,
        )))
    }

    pub fn zip(&self) -> &ZipContainer {
        &self.0
    }
}

macro_rules! delegate_container {
    ($ty:ident) => {
        impl Container for $ty {
            fn list_entries(&self) -> Vec<String> {
                self.0.list_entries()
            }

            fn open_entry(&self, name: &str) -> Result<Vec<u8>> {
                self.0.open_entry(name)
            }
        }
    };
}

delegate_container!(JarContainer);
delegate_container!(ApkContainer);
