use std::cmp::Ordering;

use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::{
    zip::{file_name, ZipArchive},
    Container, Source, ZipContainer, BASE_APK, MEMBER_SEPARATOR, XAPK_MANIFEST,
};
use crate::{dex_err, error::DexError, Result};

#[derive(Debug)]
struct Member {
    name: String,
    apk: OnceCell<ZipContainer>,
}

/// A ZIP of APKs. Each member is opened as an APK on first use; its root
/// dex entries are exposed as `<member>!/<entry>`.
#[derive(Debug)]
pub struct MultiApkContainer {
    archive: ZipArchive,
    members: Vec<Member>,
    base: Option<String>,
    location: String,
}

impl_constructors!(MultiApkContainer);

impl MultiApkContainer {
    fn from_source(source: Source, location: String) -> Result<MultiApkContainer> {
        Ok(MultiApkContainer::from_archive(
            ZipArchive::new(source)?,
            location,
        ))
    }

    /// Uses every `.apk` entry as a member; the base is the first one named
    /// `base.apk`, if any.
    pub fn from_archive(archive: ZipArchive, location: String) -> MultiApkContainer {
        let members: Vec<String> = archive
            .entries()
            .iter()
            .filter(|e| !e.is_dir() && e.name.ends_with(".apk"))
            .map(|e| e.name.clone())
            .collect();
        let base = members
            .iter()
            .find(|name| file_name(name) == BASE_APK)
            .cloned();
        MultiApkContainer::with_members(archive, members, base, location)
    }

    pub(crate) fn with_members(
        archive: ZipArchive,
        mut members: Vec<String>,
        base: Option<String>,
        location: String,
    ) -> MultiApkContainer {
        members.sort_by(|a, b| match (Some(a) == base.as_ref(), Some(b) == base.as_ref()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.cmp(b),
        });
        members.dedup();

        log::debug!(
            "apk bundle {location} with {} members (base: {:?})",
            members.len(),
            base
        );
        MultiApkContainer {
            archive,
            members: members
                .into_iter()
                .map(|name| Member {
                    name,
                    apk: OnceCell::new(),
                })
                .collect(),
            base,
            location,
        }
    }

    /// Member names, base first.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    pub fn base_name(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Bytes of the base APK.
    pub fn base_apk(&self) -> Result<Vec<u8>> {
        match &self.base {
            Some(base) => self.archive.read(base),
            None => dex_err!(MissingContainerFile, BASE_APK),
        }
    }

    /// The member `name` opened as an APK.
    pub fn member(&self, name: &str) -> Result<&ZipContainer> {
        let member = match self.members.iter().find(|m| m.name == name) {
            Some(member) => member,
            None => return dex_err!(EntryNotFound, name.to_string()),
        };
        member.apk.get_or_try_init(|| {
            let data = self.archive.read(&member.name)?;
            let archive = ZipArchive::new(Source::Owned(data))?;
            Ok::<_, DexError>(ZipContainer::from_archive(
                archive,
                true,
                format!("{}{MEMBER_SEPARATOR}{}", self.location, member.name),
            ))
        })
    }

    #[inline(always)]
    pub fn archive(&self) -> &ZipArchive {
        &self.archive
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Container for MultiApkContainer {
    fn list_entries(&self) -> Vec<String> {
        let mut names = Vec::new();
        for member in &self.members {
            let apk = match self.member(&member.name) {
                Ok(apk) => apk,
                Err(err) => {
                    log::warn!("skipping apk member {}: {err}", member.name);
                    continue;
                }
            };
            names.extend(
                apk.list_entries()
                    .into_iter()
                    .map(|entry| format!("{}{MEMBER_SEPARATOR}{entry}", member.name)),
            );
        }
        names
    }

    /// Opens `<member>!/<entry>`; a name without separator reads the outer
    /// archive directly.
    fn open_entry(&self, name: &str) -> Result<Vec<u8>> {
        match name.split_once(MEMBER_SEPARATOR) {
            Some((member, entry)) => self.member(member)?.open_entry(entry),
            None => self.archive.read(name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct XapkManifest {
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub version_name: Option<String>,
    pub split_apks: Vec<SplitApk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitApk {
    pub file: String,
    pub id: String,
}

/// An XAPK bundle: members and base are declared by `manifest.json`.
#[derive(Debug)]
pub struct XapkContainer {
    bundle: MultiApkContainer,
    manifest: XapkManifest,
}

impl_constructors!(XapkContainer);

impl XapkContainer {
    fn from_source(source: Source, location: String) -> Result<XapkContainer> {
        XapkContainer::from_archive(ZipArchive::new(source)?, location)
    }

    pub fn from_archive(archive: ZipArchive, location: String) -> Result<XapkContainer> {
        let entry = match archive
            .entries()
            .iter()
            .find(|e| e.file_name() == XAPK_MANIFEST)
        {
            Some(entry) => entry,
            None => return dex_err!(MissingContainerFile, XAPK_MANIFEST),
        };
        let data = archive.read_entry(entry)?;
        let manifest: XapkManifest = match serde_json::from_slice(&data) {
            Ok(manifest) => manifest,
            Err(err) => return dex_err!(BadManifest, "{}: {err}", entry.name),
        };

        let base = match manifest.split_apks.iter().find(|s| s.id == "base") {
            Some(split) => split.file.clone(),
            None => return dex_err!(BadManifest, "no split apk with id \"base\""),
        };
        let members = manifest.split_apks.iter().map(|s| s.file.clone()).collect();
        Ok(XapkContainer {
            bundle: MultiApkContainer::with_members(archive, members, Some(base), location),
            manifest,
        })
    }

    pub fn manifest(&self) -> &XapkManifest {
        &self.manifest
    }

    pub fn bundle(&self) -> &MultiApkContainer {
        &self.bundle
    }

    pub fn base_apk(&self) -> Result<Vec<u8>> {
        self.bundle.base_apk()
    }
}

/// A split APK set: every `.apk` entry is a member, the base is `base.apk`.
#[derive(Debug)]
pub struct ApksContainer {
    bundle: MultiApkContainer,
}

impl_constructors!(ApksContainer);

impl ApksContainer {
    fn from_source(source: Source, location: String) -> Result<ApksContainer> {
        ApksContainer::from_archive(ZipArchive::new(source)?, location)
    }

    pub fn from_archive(archive: ZipArchive, location: String) -> Result<ApksContainer> {
        let bundle = MultiApkContainer::from_archive(archive, location);
        if bundle.base.is_none() {
            return dex_err!(MissingContainerFile, BASE_APK);
        }
        Ok(ApksContainer { bundle })
    }

    pub fn bundle(&self) -> &MultiApkContainer {
        &self.bundle
    }

    pub fn base_apk(&self) -> Result<Vec<u8>> {
        self.bundle.base_apk()
    }
}

macro_rules! delegate_bundle {
    ($ty:ident) => {
        impl Container for $ty {
            fn list_entries(&self) -> Vec<String> {
                self.bundle.list_entries()
            }

            fn open_entry(&self, name: &str) -> Result<Vec<u8>> {
                self.bundle.open_entry(name)
            }
        }
    };
}

delegate_bundle!(XapkContainer);
delegate_bundle!(ApksContainer);
