use serde::Serialize;

use super::{modifiers::ACC_STATIC, reader::DexReader};
use crate::{dex_err, leb128::decode_uleb128_off, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub index: u32,
    pub access_flags: u32,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Method {
    pub index: u32,
    pub access_flags: u32,
    pub code_offset: u32,
    pub is_static_or_direct: bool,
}

impl Method {
    #[inline]
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    #[inline]
    pub fn is_abstract_or_native(&self) -> bool {
        self.code_offset == 0
    }
}

/// Decoded `class_data_item`. Member indices are stored delta-encoded in the
/// file; here they are absolute.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassData {
    pub static_fields: Vec<Field>,
    pub instance_fields: Vec<Field>,
    pub direct_methods: Vec<Method>,
    pub virtual_methods: Vec<Method>,
}

impl ClassData {
    pub fn parse(r: &DexReader<'_>, offset: u32) -> Result<ClassData> {
        let data = r.tail(offset as usize, "class-data")?;
        let mut pos = 0;

        let num_static_fields = decode_uleb128_off(data, &mut pos)?;
        let num_instance_fields = decode_uleb128_off(data, &mut pos)?;
        let num_direct_methods = decode_uleb128_off(data, &mut pos)?;
        let num_virtual_methods = decode_uleb128_off(data, &mut pos)?;

        // every member takes at least two bytes, which bounds bogus counts
        let remaining = (data.len() - pos) as u64;
        let total = num_static_fields as u64
            + num_instance_fields as u64
            + num_direct_methods as u64
            + num_virtual_methods as u64;
        if total * 2 > remaining {
            return dex_err!(DexLayoutError {
                offset: offset as usize + pos,
                len: (total * 2) as usize,
                item_ty: "class-data",
                file_size: r.len()
            });
        }

        Ok(ClassData {
            static_fields: read_fields(data, &mut pos, num_static_fields, true)?,
            instance_fields: read_fields(data, &mut pos, num_instance_fields, false)?,
            direct_methods: read_methods(data, &mut pos, num_direct_methods, true)?,
            virtual_methods: read_methods(data, &mut pos, num_virtual_methods, false)?,
        })
    }

    #[inline(always)]
    pub fn num_fields(&self) -> usize {
        self.static_fields.len() + self.instance_fields.len()
    }

    #[inline(always)]
    pub fn num_methods(&self) -> usize {
        self.direct_methods.len() + self.virtual_methods.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

fn next_index(index: u32, diff: u32, item_ty: &'static str) -> Result<u32> {
    match index.checked_add(diff) {
        Some(v) => Ok(v),
        None => dex_err!(BadEncodedIndex {
            index,
            next_index: diff,
            item_ty
        }),
    }
}

fn read_fields(data: &[u8], pos: &mut usize, count: u32, is_static: bool) -> Result<Vec<Field>> {
    let mut fields = Vec::with_capacity(count as usize);
    let mut index = 0u32;
    for _ in 0..count {
        let diff = decode_uleb128_off(data, pos)?;
        index = next_index(index, diff, "encoded_field")?;
        fields.push(Field {
            index,
            access_flags: decode_uleb128_off(data, pos)?,
            is_static,
        });
    }
    Ok(fields)
}

fn read_methods(data: &[u8], pos: &mut usize, count: u32, direct: bool) -> Result<Vec<Method>> {
    let mut methods = Vec::with_capacity(count as usize);
    let mut index = 0u32;
    for _ in 0..count {
        let diff = decode_uleb128_off(data, pos)?;
        index = next_index(index, diff, "encoded_method")?;
        methods.push(Method {
            index,
            access_flags: decode_uleb128_off(data, pos)?,
            code_offset: decode_uleb128_off(data, pos)?,
            is_static_or_direct: direct,
        });
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DexError;
    use crate::file::reader::Endianness;

    #[test]
    fn test_parse_class_data() {
        #[rustfmt::skip]
        let data = [
            0xAA, // padding so the item is not at offset zero
            0x01, 0x01, 0x01, 0x01, // one member of each kind
            0x02, 0x19,             // static field 2, public|static|final
            0x03, 0x02,             // instance field 3, private
            0x01, 0x81, 0x80, 0x04, 0x90, 0x02, // direct method 1, constructor, code 0x110
            0x05, 0x01, 0x00,       // virtual method 5, public, no code
        ];
        let r = DexReader::new(&data, Endianness::Little);
        let class_data = ClassData::parse(&r, 1).unwrap();

        assert_eq!(class_data.num_fields(), 2);
        assert_eq!(class_data.static_fields[0].index, 2);
        assert!(class_data.static_fields[0].is_static);
        assert_eq!(class_data.instance_fields[0].index, 3);
        assert_eq!(class_data.instance_fields[0].access_flags, 0x02);

        let direct = class_data.direct_methods[0];
        assert_eq!(direct.index, 1);
        assert_eq!(direct.access_flags, 0x10001);
        assert_eq!(direct.code_offset, 0x110);
        assert!(direct.is_static_or_direct);

        let virt = class_data.virtual_methods[0];
        assert_eq!(virt.index, 5);
        assert!(virt.is_abstract_or_native());
        assert_eq!(class_data.methods().count(), 2);
    }

    #[test]
    fn test_delta_indices_accumulate() {
        let data = [0x00, 0x02, 0x00, 0x00, 0x03, 0x01, 0x04, 0x01];
        let r = DexReader::new(&data, Endianness::Little);
        let class_data = ClassData::parse(&r, 0).unwrap();
        let indices: Vec<u32> = class_data.instance_fields.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![3, 7]);
    }

    #[test]
    fn test_index_overflow() {
        let data = [
            0x02, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x01, 0x01, 0x01,
        ];
        let r = DexReader::new(&data, Endianness::Little);
        assert!(matches!(
            ClassData::parse(&r, 0),
            Err(DexError::BadEncodedIndex { .. })
        ));
    }

    #[test]
    fn test_bogus_counts_rejected() {
        let data = [0xFF, 0xFF, 0x03, 0x00, 0x00, 0x00];
        let r = DexReader::new(&data, Endianness::Little);
        assert!(ClassData::parse(&r, 0).unwrap_err().is_reference());
    }
}
