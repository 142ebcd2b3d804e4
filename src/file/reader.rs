use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::{dex_err, Result};

/// Byte order of every multi-byte integer after the magic, selected by the
/// header's `endian_tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Endianness {
    Little,
    Big,
}

/// Bounds-checked absolute-offset reads over a DEX buffer.
#[derive(Clone, Copy)]
pub struct DexReader<'a> {
    data: &'a [u8],
    order: Endianness,
}

impl<'a> DexReader<'a> {
    pub fn new(data: &'a [u8], order: Endianness) -> Self {
        Self { data, order }
    }

    #[inline(always)]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline(always)]
    pub fn order(&self) -> Endianness {
        self.order
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `len` bytes at `offset`, or a layout error naming `item_ty`.
    #[inline]
    pub fn slice(&self, offset: usize, len: usize, item_ty: &'static str) -> Result<&'a [u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => dex_err!(DexLayoutError {
                offset,
                len,
                item_ty,
                file_size: self.data.len()
            }),
        }
    }

    /// Everything from `offset` to the end of the buffer.
    #[inline]
    pub fn tail(&self, offset: usize, item_ty: &'static str) -> Result<&'a [u8]> {
        if offset >= self.data.len() {
            return dex_err!(DexLayoutError {
                offset,
                len: 1,
                item_ty,
                file_size: self.data.len()
            });
        }
        Ok(&self.data[offset..])
    }

    #[inline]
    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1, "u8")?[0])
    }

    #[inline]
    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        let raw = self.slice(offset, 2, "u16")?;
        Ok(match self.order {
            Endianness::Little => LittleEndian::read_u16(raw),
            Endianness::Big => BigEndian::read_u16(raw),
        })
    }

    #[inline]
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        let raw = self.slice(offset, 4, "u32")?;
        Ok(match self.order {
            Endianness::Little => LittleEndian::read_u32(raw),
            Endianness::Big => BigEndian::read_u32(raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_follow_byte_order() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let le = DexReader::new(&data, Endianness::Little);
        let be = DexReader::new(&data, Endianness::Big);
        assert_eq!(le.u32_at(0).unwrap(), 0x78563412);
        assert_eq!(be.u32_at(0).unwrap(), 0x12345678);
        assert_eq!(le.u16_at(2).unwrap(), 0x7856);
        assert_eq!(be.u16_at(2).unwrap(), 0x5678);
    }

    #[test]
    fn test_out_of_bounds_is_reference_error() {
        let data = [0u8; 6];
        let reader = DexReader::new(&data, Endianness::Little);
        assert!(reader.u32_at(2).is_ok());
        let err = reader.u32_at(3).unwrap_err();
        assert!(err.is_reference());
        assert!(reader.slice(usize::MAX, 2, "test").is_err());
        assert!(reader.tail(6, "test").is_err());
    }
}
