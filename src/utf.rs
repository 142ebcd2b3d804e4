//! Modified UTF-8 (MUTF-8) as used by the string data section.
//!
//! MUTF-8 differs from UTF-8 in two ways: U+0000 is written as the overlong
//! pair `C0 80` so a literal zero byte only ever terminates a string, and
//! supplementary characters are stored as two separately encoded surrogate
//! halves (three bytes each). Decoding therefore goes through UTF-16.

use crate::{dex_err, Result};

pub fn mutf8_to_str(utf8_data_in: &[u8]) -> Result<String> {
    let utf16_data = mutf8_to_utf16(utf8_data_in)?;
    Ok(String::from_utf16(&utf16_data)?)
}

pub fn mutf8_to_str_lossy(utf8_data_in: &[u8]) -> String {
    let mut utf16_data = Vec::with_capacity(utf8_data_in.len());
    let mut in_idx = 0;
    while in_idx < utf8_data_in.len() && utf8_data_in[in_idx] != 0 {
        match utf16_from_mutf8(utf8_data_in, &mut in_idx) {
            Ok(ch) => push_code_units(&mut utf16_data, ch),
            Err(_) => {
                // skip the bad lead byte and resync on the next one
                utf16_data.push(0xFFFD);
                in_idx += 1;
            }
        }
    }
    String::from_utf16_lossy(&utf16_data)
}

/// Decodes up to (not including) the first zero byte, or the end of input.
pub fn mutf8_to_utf16(utf8_data_in: &[u8]) -> Result<Vec<u16>> {
    if utf8_data_in.is_ascii() {
        // common case where all chars are ASCII
        return Ok(utf8_data_in
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as u16)
            .collect());
    }

    let mut utf16_data_out = Vec::with_capacity(utf8_data_in.len());
    let mut in_idx = 0;
    while in_idx < utf8_data_in.len() && utf8_data_in[in_idx] != 0 {
        let ch = utf16_from_mutf8(utf8_data_in, &mut in_idx)?;
        push_code_units(&mut utf16_data_out, ch);
    }
    Ok(utf16_data_out)
}

/// Number of UTF-16 code units encoded by `utf8_data_in` (up to the first
/// zero byte), without materializing them.
pub fn mutf8_len(utf8_data_in: &[u8]) -> Result<usize> {
    let mut len = 0;
    let mut in_idx = 0;
    while in_idx < utf8_data_in.len() && utf8_data_in[in_idx] != 0 {
        let ch = utf16_from_mutf8(utf8_data_in, &mut in_idx)?;
        len += if trailing_utf16_char(ch) != 0 { 2 } else { 1 };
    }
    Ok(len)
}

pub fn str_to_mutf8(str_data_in: &str) -> Vec<u8> {
    let utf16_data_in: Vec<u16> = str_data_in.encode_utf16().collect();
    utf16_to_mutf8(&utf16_data_in)
}

/// Encodes UTF-16 code units as MUTF-8 and appends the terminating NUL.
pub fn utf16_to_mutf8(utf16_in: &[u16]) -> Vec<u8> {
    let mut mutf8_out = Vec::with_capacity(utf16_in.len() + 1);
    for &ch in utf16_in {
        if ch != 0 && ch < 0x80 {
            mutf8_out.push(ch as u8);
        } else if ch < 0x800 {
            mutf8_out.push(((ch >> 6) | 0xC0) as u8);
            mutf8_out.push(((ch & 0x3F) | 0x80) as u8);
        } else {
            // surrogate halves end up here as well
            mutf8_out.push(((ch >> 12) | 0xE0) as u8);
            mutf8_out.push((((ch >> 6) & 0x3F) | 0x80) as u8);
            mutf8_out.push(((ch & 0x3F) | 0x80) as u8);
        }
    }
    mutf8_out.push(0x00);
    mutf8_out
}

/// Decodes one character starting at `*offset`. Returns either a single
/// UTF-16 unit in the low half, or (for four-byte input) a surrogate pair
/// with the trailing unit in the high half.
#[inline]
fn utf16_from_mutf8(utf8_data_in: &[u8], offset: &mut usize) -> Result<u32> {
    let start = *offset;
    let one = utf8_data_in[start];
    if one & 0x80 == 0 {
        *offset += 1;
        return Ok(one as u32);
    }

    let width = match one {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        // stray continuation byte or invalid lead
        _ => {
            return dex_err!(MalformedMUTF8Sequence {
                idx: start,
                len: utf8_data_in.len()
            })
        }
    };

    let tail = match utf8_data_in.get(start + 1..start + width) {
        Some(tail) if tail.iter().all(|b| b & 0xC0 == 0x80) => tail,
        _ => {
            return dex_err!(MalformedMUTF8Sequence {
                idx: start,
                len: utf8_data_in.len()
            })
        }
    };
    *offset += width;

    let ch = match width {
        2 => ((one & 0x1F) as u32) << 6 | (tail[0] & 0x3F) as u32,
        3 => {
            ((one & 0x0F) as u32) << 12 | ((tail[0] & 0x3F) as u32) << 6 | (tail[1] & 0x3F) as u32
        }
        _ => {
            let code_point = ((one & 0x07) as u32) << 18
                | ((tail[0] & 0x3F) as u32) << 12
                | ((tail[1] & 0x3F) as u32) << 6
                | (tail[2] & 0x3F) as u32;
            if !(0x10000..=0x10FFFF).contains(&code_point) {
                return dex_err!(MalformedMUTF8Sequence {
                    idx: start,
                    len: utf8_data_in.len()
                });
            }
            let mut surrogate_pair: u32 = 0x00;
            surrogate_pair |= ((code_point >> 10) + 0xd7c0) & 0xFFFF;
            surrogate_pair |= ((code_point & 0x03FF) + 0xdc00) << 16;
            surrogate_pair
        }
    };
    Ok(ch)
}

#[inline(always)]
fn push_code_units(out: &mut Vec<u16>, maybe_pair: u32) {
    out.push(leading_utf16_char(maybe_pair));
    let trailing = trailing_utf16_char(maybe_pair);
    if trailing != 0 {
        out.push(trailing);
    }
}

#[inline(always)]
fn trailing_utf16_char(maybe_pair: u32) -> u16 {
    (maybe_pair >> 16) as u16
}

#[inline(always)]
fn leading_utf16_char(maybe_pair: u32) -> u16 {
    (maybe_pair & 0x0000FFFF) as u16
}
