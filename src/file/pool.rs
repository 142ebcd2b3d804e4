use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde::Serialize;

use super::{
    class_accessor::ClassData,
    header::{Header, NO_INDEX},
    lazy::{self, LazyString, LazyType},
    reader::{DexReader, Endianness},
    structs::*,
};
use crate::{dex_err, utf, Result};

macro_rules! check_lt_result {
    ($idx:expr, $count:expr, $item_ty:expr) => {
        if ($idx as usize) >= ($count as usize) {
            return dex_err!(DexIndexError {
                index: $idx as u32,
                item_ty: $item_ty,
                max: $count as usize,
            });
        }
    };
}

/// Location of a table of fixed-width records.
#[derive(Debug, Clone, Copy, Default)]
struct Section {
    off: u32,
    size: u32,
}

impl Section {
    fn new(off: u32, size: u32) -> Self {
        Self { off, size }
    }
}

/// Method prototype with all type references resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prototype {
    pub shorty: Arc<str>,
    pub return_type: Arc<str>,
    pub parameters: Vec<Arc<str>>,
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.parameters {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRef {
    pub class: Arc<str>,
    #[serde(rename = "type")]
    pub type_: Arc<str>,
    pub name: Arc<str>,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.type_)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodRef {
    pub class: Arc<str>,
    pub name: Arc<str>,
    pub proto: Prototype,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.proto)
    }
}

/// A class definition with its descriptors resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub class: Arc<str>,
    pub access_flags: u32,
    pub superclass: Option<Arc<str>>,
    pub interfaces: Vec<Arc<str>>,
    pub source_file: Option<Arc<str>>,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

/// All index-addressed pools of one dex file.
///
/// String and type slots are created up front and resolved lazily; every
/// other record is decoded from the buffer on each lookup. Lookups are
/// bounds-checked against the header counts and never resolve
/// cross-references on their own, use the `resolve_*` methods for that.
pub struct DexPool {
    data: Arc<[u8]>,
    order: Endianness,
    map_off: u32,

    strings: Vec<LazyString>,
    types: Vec<LazyType>,
    protos: Section,
    fields: Section,
    methods: Section,
    class_defs: Section,
    method_handles: Section,
    call_sites: Section,

    decodes: AtomicUsize,
}

impl DexPool {
    pub(crate) fn new(data: Arc<[u8]>, header: &Header) -> Result<DexPool> {
        let r = DexReader::new(&data, header.byte_order());

        let mut strings = Vec::with_capacity(header.string_ids_size as usize);
        for idx in 0..header.string_ids_size {
            let offset = header.string_ids_off as usize + idx as usize * StringId::SIZE;
            let string_id = StringId::read(&r, offset)?;
            strings.push(LazyString::new(idx, string_id.string_data_off));
        }

        let mut types = Vec::with_capacity(header.type_ids_size as usize);
        for idx in 0..header.type_ids_size {
            let offset = header.type_ids_off as usize + idx as usize * TypeId::SIZE;
            let type_id = TypeId::read(&r, offset)?;
            types.push(LazyType::new(idx, type_id.descriptor_idx));
        }

        let mut pool = DexPool {
            order: header.byte_order(),
            map_off: header.map_off,
            strings,
            types,
            protos: Section::new(header.proto_ids_off, header.proto_ids_size),
            fields: Section::new(header.field_ids_off, header.field_ids_size),
            methods: Section::new(header.method_ids_off, header.method_ids_size),
            class_defs: Section::new(header.class_defs_off, header.class_defs_size),
            method_handles: Section::default(),
            call_sites: Section::default(),
            decodes: AtomicUsize::new(0),
            data,
        };
        pool.init_sections_from_maplist();
        Ok(pool)
    }

    #[inline(always)]
    fn reader(&self) -> DexReader<'_> {
        DexReader::new(&self.data, self.order)
    }

    /// Number of underlying string decodes performed so far, successful or
    /// not. Cached lookups do not count.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    // -- strings
    #[inline]
    pub fn get_string(&self, idx: StringIndex) -> Result<&LazyString> {
        check_lt_result!(idx, self.strings.len(), StringId::NAME);
        Ok(&self.strings[idx as usize])
    }

    #[inline(always)]
    pub fn num_strings(&self) -> usize {
        self.strings.len()
    }

    pub fn strings(&self) -> impl Iterator<Item = &LazyString> {
        self.strings.iter()
    }

    pub fn resolve_string(&self, idx: StringIndex) -> Result<Arc<str>> {
        self.get_string(idx)?.resolve(&self.reader(), &self.decodes)
    }

    /// Resolves every string slot in index order and returns the values.
    ///
    /// Already resolved slots are served from their cache, so calling this
    /// twice decodes each string at most once. Stops at the first string
    /// that fails to decode.
    pub fn load_all_strings(&self) -> Result<Vec<Arc<str>>> {
        let r = self.reader();
        self.strings
            .iter()
            .map(|slot| slot.resolve(&r, &self.decodes))
            .collect()
    }

    /// Decodes the string at `idx` with invalid sequences replaced, bypassing
    /// the cache.
    pub fn resolve_string_lossy(&self, idx: StringIndex) -> Result<String> {
        let slot = self.get_string(idx)?;
        if let Some(value) = slot.get() {
            return Ok(value.to_string());
        }
        let (_, data) = lazy::string_data(&self.reader(), slot.data_offset() as usize)?;
        Ok(utf::mutf8_to_str_lossy(data))
    }

    // -- types
    #[inline]
    pub fn get_type(&self, idx: u32) -> Result<&LazyType> {
        check_lt_result!(idx, self.types.len(), TypeId::NAME);
        Ok(&self.types[idx as usize])
    }

    #[inline(always)]
    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> impl Iterator<Item = &LazyType> {
        self.types.iter()
    }

    pub fn resolve_type(&self, idx: u32) -> Result<Arc<str>> {
        self.get_type(idx)?
            .resolve(|descriptor_idx| self.resolve_string(descriptor_idx))
    }

    // -- fixed-width records
    fn item<T: PoolItem>(&self, section: Section, idx: u32) -> Result<T> {
        check_lt_result!(idx, section.size, T::NAME);
        T::read(&self.reader(), section.off as usize + idx as usize * T::SIZE)
    }

    #[inline]
    pub fn get_proto(&self, idx: u32) -> Result<ProtoId> {
        self.item(self.protos, idx)
    }

    #[inline(always)]
    pub fn num_protos(&self) -> usize {
        self.protos.size as usize
    }

    #[inline]
    pub fn get_field(&self, idx: FieldIndex) -> Result<FieldId> {
        self.item(self.fields, idx)
    }

    #[inline(always)]
    pub fn num_fields(&self) -> usize {
        self.fields.size as usize
    }

    #[inline]
    pub fn get_method(&self, idx: MethodIndex) -> Result<MethodId> {
        self.item(self.methods, idx)
    }

    #[inline(always)]
    pub fn num_methods(&self) -> usize {
        self.methods.size as usize
    }

    #[inline]
    pub fn get_class_def(&self, idx: u32) -> Result<ClassDef> {
        self.item(self.class_defs, idx)
    }

    #[inline(always)]
    pub fn num_class_defs(&self) -> usize {
        self.class_defs.size as usize
    }

    #[inline]
    pub fn get_method_handle(&self, idx: u32) -> Result<MethodHandleItem> {
        self.item(self.method_handles, idx)
    }

    #[inline(always)]
    pub fn num_method_handles(&self) -> usize {
        self.method_handles.size as usize
    }

    #[inline]
    pub fn get_call_site(&self, idx: u32) -> Result<CallSiteIdItem> {
        self.item(self.call_sites, idx)
    }

    #[inline(always)]
    pub fn num_call_sites(&self) -> usize {
        self.call_sites.size as usize
    }

    // -- composite resolution
    pub fn resolve_proto(&self, idx: u32) -> Result<Prototype> {
        let proto_id = self.get_proto(idx)?;
        let parameters = match self.type_list(proto_id.parameters_off)? {
            Some(list) => list
                .into_iter()
                .map(|type_idx| self.resolve_type(type_idx as u32))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Prototype {
            shorty: self.resolve_string(proto_id.shorty_idx)?,
            return_type: self.resolve_type(proto_id.return_type_idx)?,
            parameters,
        })
    }

    pub fn resolve_field(&self, idx: FieldIndex) -> Result<FieldRef> {
        let field_id = self.get_field(idx)?;
        Ok(FieldRef {
            class: self.resolve_type(field_id.class_idx as u32)?,
            type_: self.resolve_type(field_id.type_idx as u32)?,
            name: self.resolve_string(field_id.name_idx)?,
        })
    }

    pub fn resolve_method(&self, idx: MethodIndex) -> Result<MethodRef> {
        let method_id = self.get_method(idx)?;
        Ok(MethodRef {
            class: self.resolve_type(method_id.class_idx as u32)?,
            name: self.resolve_string(method_id.name_idx)?,
            proto: self.resolve_proto(method_id.proto_idx as u32)?,
        })
    }

    pub fn resolve_class_def(&self, idx: u32) -> Result<ClassInfo> {
        let class_def = self.get_class_def(idx)?;
        let superclass = match class_def.superclass_idx {
            NO_INDEX => None,
            type_idx => Some(self.resolve_type(type_idx)?),
        };
        let source_file = match class_def.source_file_idx {
            NO_INDEX => None,
            string_idx => Some(self.resolve_string(string_idx)?),
        };
        let interfaces = match self.type_list(class_def.interfaces_off)? {
            Some(list) => list
                .into_iter()
                .map(|type_idx| self.resolve_type(type_idx as u32))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(ClassInfo {
            class: self.resolve_type(class_def.class_idx)?,
            access_flags: class_def.access_flags,
            superclass,
            interfaces,
            source_file,
            annotations_off: class_def.annotations_off,
            class_data_off: class_def.class_data_off,
            static_values_off: class_def.static_values_off,
        })
    }

    // -- data section
    /// Reads the `type_list` at `offset`; `None` for a zero offset.
    pub fn type_list(&self, offset: u32) -> Result<Option<Vec<TypeIndex>>> {
        if offset == 0 {
            return Ok(None);
        }
        let r = self.reader();
        let size = r.u32_at(offset as usize)? as usize;
        // validates the whole list before allocating for it
        r.slice(offset as usize + 4, size.saturating_mul(2), "type-list")?;

        let mut list = Vec::with_capacity(size);
        for i in 0..size {
            list.push(r.u16_at(offset as usize + 4 + i * 2)?);
        }
        Ok(Some(list))
    }

    pub fn class_data(&self, class_def: &ClassDef) -> Result<Option<ClassData>> {
        match class_def.class_data_off {
            0 => Ok(None),
            offset => Ok(Some(ClassData::parse(&self.reader(), offset)?)),
        }
    }

    /// Reads the map list referenced by the header, `None` if there is none.
    pub fn map_list(&self) -> Result<Option<Vec<MapItem>>> {
        if self.map_off == 0 {
            return Ok(None);
        }
        let r = self.reader();
        let count = r.u32_at(self.map_off as usize)? as usize;
        let items_off = self.map_off as usize + 4;
        r.slice(items_off, count.saturating_mul(MapItem::SIZE), "map-list")?;

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            items.push(MapItem::read(&r, items_off + i * MapItem::SIZE)?);
        }
        Ok(Some(items))
    }

    fn init_sections_from_maplist(&mut self) {
        let items = match self.map_list() {
            Ok(Some(items)) => items,
            Ok(None) => return,
            Err(err) => {
                log::warn!("ignoring unreadable map list: {err}");
                return;
            }
        };

        for map_item in items {
            let (section, width) = match map_item.item_type() {
                Some(MapItemType::MethodHandleItem) => {
                    (&mut self.method_handles, MethodHandleItem::SIZE)
                }
                Some(MapItemType::CallSiteIdItem) => (&mut self.call_sites, CallSiteIdItem::SIZE),
                _ => continue,
            };

            let end = map_item.off as u64 + map_item.size as u64 * width as u64;
            if end > self.data.len() as u64 {
                log::warn!(
                    "map item {:#06x} at {:#x} overflows the file, ignoring it",
                    map_item.type_,
                    map_item.off
                );
                continue;
            }
            *section = Section::new(map_item.off, map_item.size);
        }
    }
}

impl fmt::Debug for DexPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DexPool")
            .field("strings", &self.strings.len())
            .field("types", &self.types.len())
            .field("protos", &self.protos.size)
            .field("fields", &self.fields.size)
            .field("methods", &self.methods.size)
            .field("class_defs", &self.class_defs.size)
            .field("method_handles", &self.method_handles.size)
            .field("call_sites", &self.call_sites.size)
            .finish()
    }
}
