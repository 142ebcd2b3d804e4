use serde::Serialize;

use super::reader::DexReader;
use crate::Result;

pub type StringIndex = u32;
pub type TypeIndex = u16;
pub type ProtoIndex = u16;
pub type FieldIndex = u32;
pub type MethodIndex = u32;

/// A fixed-width record living in one of the index tables.
pub trait PoolItem: Sized {
    /// Record width in bytes.
    const SIZE: usize;
    /// Name used in index errors.
    const NAME: &'static str;

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StringId {
    pub string_data_off: u32,
}

impl StringId {
    #[inline]
    pub const fn offset(&self) -> usize {
        self.string_data_off as usize
    }
}

impl PoolItem for StringId {
    const SIZE: usize = 4;
    const NAME: &'static str = "StringId";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            string_data_off: r.u32_at(offset)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeId {
    pub descriptor_idx: StringIndex,
}

impl PoolItem for TypeId {
    const SIZE: usize = 4;
    const NAME: &'static str = "TypeId";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            descriptor_idx: r.u32_at(offset)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtoId {
    pub shorty_idx: StringIndex, // index into string_ids array for shorty descriptor
    pub return_type_idx: u32,    // index into type_ids array for return type
    pub parameters_off: u32,     // file offset to type_list for parameter types
}

impl PoolItem for ProtoId {
    const SIZE: usize = 12;
    const NAME: &'static str = "ProtoId";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            shorty_idx: r.u32_at(offset)?,
            return_type_idx: r.u32_at(offset + 4)?,
            parameters_off: r.u32_at(offset + 8)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldId {
    pub class_idx: TypeIndex,  // index into type_ids_ array for defining class
    pub type_idx: TypeIndex,   // index into type_ids_ array for field type
    pub name_idx: StringIndex, // index into string_ids_ array for field name
}

impl PoolItem for FieldId {
    const SIZE: usize = 8;
    const NAME: &'static str = "FieldId";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            class_idx: r.u16_at(offset)?,
            type_idx: r.u16_at(offset + 2)?,
            name_idx: r.u32_at(offset + 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodId {
    pub class_idx: TypeIndex,  // index into type_ids_ array for defining class
    pub proto_idx: ProtoIndex, // index into proto_ids_ array for method signature
    pub name_idx: StringIndex, // index into string_ids_ array for method name
}

impl PoolItem for MethodId {
    const SIZE: usize = 8;
    const NAME: &'static str = "MethodId";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            class_idx: r.u16_at(offset)?,
            proto_idx: r.u16_at(offset + 2)?,
            name_idx: r.u32_at(offset + 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassDef {
    pub class_idx: u32, // index into type_ids_ array for this class
    pub access_flags: u32,
    pub superclass_idx: u32,    // index into type_ids_ array for superclass, or NO_INDEX
    pub interfaces_off: u32,    // file offset to TypeList
    pub source_file_idx: u32,   // index into string_ids_ for source file name, or NO_INDEX
    pub annotations_off: u32,   // file offset to annotations_directory_item
    pub class_data_off: u32,    // file offset to class_data_item
    pub static_values_off: u32, // file offset to EncodedArray
}

impl PoolItem for ClassDef {
    const SIZE: usize = 32;
    const NAME: &'static str = "ClassDef";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            class_idx: r.u32_at(offset)?,
            access_flags: r.u32_at(offset + 4)?,
            superclass_idx: r.u32_at(offset + 8)?,
            interfaces_off: r.u32_at(offset + 12)?,
            source_file_idx: r.u32_at(offset + 16)?,
            annotations_off: r.u32_at(offset + 20)?,
            class_data_off: r.u32_at(offset + 24)?,
            static_values_off: r.u32_at(offset + 28)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodHandleItem {
    pub method_handle_type: u16,
    pub field_or_method_idx: u16, // Field index for accessors, method index otherwise.
}

impl PoolItem for MethodHandleItem {
    const SIZE: usize = 8;
    const NAME: &'static str = "MethodHandleItem";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            method_handle_type: r.u16_at(offset)?,
            field_or_method_idx: r.u16_at(offset + 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSiteIdItem {
    pub data_off: u32, // Offset into data section pointing to encoded array items.
}

impl PoolItem for CallSiteIdItem {
    const SIZE: usize = 4;
    const NAME: &'static str = "CallSiteIdItem";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            data_off: r.u32_at(offset)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapItem {
    /// Raw item type, see [`MapItemType`].
    pub type_: u16,
    pub size: u32,
    pub off: u32,
}

impl MapItem {
    pub fn item_type(&self) -> Option<MapItemType> {
        MapItemType::from_raw(self.type_)
    }
}

impl PoolItem for MapItem {
    const SIZE: usize = 12;
    const NAME: &'static str = "MapItem";

    fn read(r: &DexReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            type_: r.u16_at(offset)?,
            size: r.u32_at(offset + 4)?,
            off: r.u32_at(offset + 8)?,
        })
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapItemType {
    HeaderItem = 0x0000,
    StringIdItem = 0x0001,
    TypeIdItem = 0x0002,
    ProtoIdItem = 0x0003,
    FieldIdItem = 0x0004,
    MethodIdItem = 0x0005,
    ClassDefItem = 0x0006,
    CallSiteIdItem = 0x0007,
    MethodHandleItem = 0x0008,
    MapList = 0x1000,
    TypeList = 0x1001,
    AnnotationSetRefList = 0x1002,
    AnnotationSetItem = 0x1003,
    ClassDataItem = 0x2000,
    CodeItem = 0x2001,
    StringDataItem = 0x2002,
    DebugInfoItem = 0x2003,
    AnnotationItem = 0x2004,
    EncodedArrayItem = 0x2005,
    AnnotationsDirectoryItem = 0x2006,
    HiddenapiClassData = 0xF000,
}

impl MapItemType {
    pub fn from_raw(raw: u16) -> Option<MapItemType> {
        use MapItemType::*;
        Some(match raw {
            0x0000 => HeaderItem,
            0x0001 => StringIdItem,
            0x0002 => TypeIdItem,
            0x0003 => ProtoIdItem,
            0x0004 => FieldIdItem,
            0x0005 => MethodIdItem,
            0x0006 => ClassDefItem,
            0x0007 => CallSiteIdItem,
            0x0008 => MethodHandleItem,
            0x1000 => MapList,
            0x1001 => TypeList,
            0x1002 => AnnotationSetRefList,
            0x1003 => AnnotationSetItem,
            0x2000 => ClassDataItem,
            0x2001 => CodeItem,
            0x2002 => StringDataItem,
            0x2003 => DebugInfoItem,
            0x2004 => AnnotationItem,
            0x2005 => EncodedArrayItem,
            0x2006 => AnnotationsDirectoryItem,
            0xF000 => HiddenapiClassData,
            _ => return None,
        })
    }
}
