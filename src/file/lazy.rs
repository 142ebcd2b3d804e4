use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use once_cell::sync::OnceCell;

use super::{reader::DexReader, structs::StringIndex};
use crate::{dex_err, error::DexError, leb128::decode_uleb128, utf, Result};

/// Observable state of a lazily resolved slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    Unresolved { offset: u32 },
    Resolved(&'a str),
}

/// One slot of the string pool.
///
/// The string data is decoded on the first successful [`LazyString::resolve`]
/// and cached; later calls hand out the cached value. A failed decode caches
/// nothing, so the slot stays unresolved and may be retried.
///
/// The slot is a `OnceCell`, so concurrent resolvers block on each other and
/// the decode runs once per successful initialization.
#[derive(Debug)]
pub struct LazyString {
    index: StringIndex,
    data_off: u32,
    value: OnceCell<Arc<str>>,
}

impl LazyString {
    pub(crate) fn new(index: StringIndex, data_off: u32) -> Self {
        Self {
            index,
            data_off,
            value: OnceCell::new(),
        }
    }

    #[inline(always)]
    pub fn index(&self) -> StringIndex {
        self.index
    }

    /// Offset of the `string_data_item` in the file.
    #[inline(always)]
    pub fn data_offset(&self) -> u32 {
        self.data_off
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }

    /// The cached value, if already resolved.
    #[inline]
    pub fn get(&self) -> Option<&Arc<str>> {
        self.value.get()
    }

    pub fn state(&self) -> Resolution<'_> {
        match self.value.get() {
            Some(value) => Resolution::Resolved(value.as_ref()),
            None => Resolution::Unresolved {
                offset: self.data_off,
            },
        }
    }

    pub(crate) fn resolve(&self, r: &DexReader<'_>, decodes: &AtomicUsize) -> Result<Arc<str>> {
        self.value
            .get_or_try_init(|| {
                decodes.fetch_add(1, Ordering::Relaxed);
                decode_string_data(r, self.data_off as usize).map(Arc::from)
            })
            .cloned()
    }
}

/// One slot of the type pool: a descriptor index plus its memoized
/// descriptor.
#[derive(Debug)]
pub struct LazyType {
    index: u32,
    descriptor_idx: StringIndex,
    value: OnceCell<Arc<str>>,
}

impl LazyType {
    pub(crate) fn new(index: u32, descriptor_idx: StringIndex) -> Self {
        Self {
            index,
            descriptor_idx,
            value: OnceCell::new(),
        }
    }

    #[inline(always)]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline(always)]
    pub fn descriptor_idx(&self) -> StringIndex {
        self.descriptor_idx
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }

    pub(crate) fn resolve<F>(&self, lookup: F) -> Result<Arc<str>>
    where
        F: FnOnce(StringIndex) -> Result<Arc<str>>,
    {
        self.value
            .get_or_try_init(|| lookup(self.descriptor_idx))
            .cloned()
    }
}

/// Raw `string_data_item` at `offset`: the declared UTF-16 length and the
/// MUTF-8 bytes including the terminating NUL.
pub fn string_data<'a>(r: &DexReader<'a>, offset: usize) -> Result<(u32, &'a [u8])> {
    let data = r.tail(offset, "string-data")?;
    let (utf16_len, size) = match decode_uleb128(data) {
        Ok(v) => v,
        Err(e) => {
            return dex_err!(BadStringData {
                offset,
                source: Box::new(e)
            })
        }
    };

    let start = size;
    match data[start..].iter().position(|x| *x == 0) {
        Some(pos) => Ok((utf16_len, &data[start..start + pos + 1])),
        None => dex_err!(BadStringDataMissingNullByte, offset + start),
    }
}

/// Decodes the `string_data_item` at `offset` strictly.
pub fn decode_string_data(r: &DexReader<'_>, offset: usize) -> Result<String> {
    let (utf16_len, data) = string_data(r, offset)?;
    let units = utf::mutf8_to_utf16(data)?;
    if units.len() != utf16_len as usize {
        return Err(DexError::StringLengthMismatch {
            offset,
            declared: utf16_len,
            actual: units.len(),
        });
    }
    Ok(String::from_utf16(&units)?)
}
