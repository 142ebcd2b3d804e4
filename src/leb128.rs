use crate::{dex_err, Result};

/// Longest encoding of a 32-bit value.
pub const MAX_LEB128_LEN: usize = 5;

/// Decodes an unsigned LEB128 value from the start of `data_in`.
///
/// Returns the value and the number of bytes consumed. Sequences longer than
/// five bytes, or whose fifth byte carries bits beyond the 32nd, are rejected.
#[inline]
pub fn decode_uleb128(data_in: &[u8]) -> Result<(u32, usize)> {
    let window = window(data_in);
    if data_in.len() >= MAX_LEB128_LEN && window[..4].iter().all(|b| b & 0x80 != 0) {
        // fifth byte may only contribute four bits
        if window[4] & 0x70 != 0 {
            return dex_err!(Leb128Overflow {
                offset: MAX_LEB128_LEN - 1
            });
        }
    }
    match leb128fmt::decode_u32(window) {
        Some((value, size)) if size <= data_in.len() => Ok((value, size)),
        _ => decode_failure(data_in),
    }
}

/// Decodes a signed LEB128 value from the start of `data_in`.
#[inline]
pub fn decode_sleb128(data_in: &[u8]) -> Result<(i32, usize)> {
    match leb128fmt::decode_s32(window(data_in)) {
        Some((value, size)) if size <= data_in.len() => Ok((value, size)),
        _ => decode_failure(data_in),
    }
}

/// Copies up to five bytes into the fixed window the decoder expects. The
/// zero padding terminates short input early, so callers must compare the
/// consumed size against the real length.
#[inline(always)]
fn window(data_in: &[u8]) -> [u8; MAX_LEB128_LEN] {
    let mut buf = [0u8; MAX_LEB128_LEN];
    let n = data_in.len().min(MAX_LEB128_LEN);
    buf[..n].copy_from_slice(&data_in[..n]);
    buf
}

fn decode_failure<T>(data_in: &[u8]) -> Result<T> {
    if data_in.len() >= MAX_LEB128_LEN {
        dex_err!(Leb128Overflow {
            offset: MAX_LEB128_LEN - 1
        })
    } else {
        dex_err!(Leb128Truncated { offset: 0 })
    }
}

/// Decodes a `uleb128p1` value, i.e. the encoded value minus one. `NO_INDEX`
/// is therefore represented as `-1`.
#[inline]
pub fn decode_uleb128p1(data_in: &[u8]) -> Result<(i32, usize)> {
    let (value, size) = decode_uleb128(data_in)?;
    Ok((value.wrapping_sub(1) as i32, size))
}

/// Cursor variant of [`decode_uleb128`]: reads at `*pos` and advances it.
///
/// Error offsets are reported relative to the start of `data_in`.
#[inline]
pub fn decode_uleb128_off(data_in: &[u8], pos: &mut usize) -> Result<u32> {
    let start = *pos;
    let tail = data_in.get(start..).unwrap_or(&[]);
    let (value, size) = decode_uleb128(tail).map_err(|e| rebase(e, start))?;
    *pos += size;
    Ok(value)
}

/// Cursor variant of [`decode_sleb128`].
#[inline]
pub fn decode_sleb128_off(data_in: &[u8], pos: &mut usize) -> Result<i32> {
    let start = *pos;
    let tail = data_in.get(start..).unwrap_or(&[]);
    let (value, size) = decode_sleb128(tail).map_err(|e| rebase(e, start))?;
    *pos += size;
    Ok(value)
}

fn rebase(err: crate::error::DexError, base: usize) -> crate::error::DexError {
    use crate::error::DexError;
    match err {
        DexError::Leb128Overflow { offset } => DexError::Leb128Overflow {
            offset: base + offset,
        },
        DexError::Leb128Truncated { offset } => DexError::Leb128Truncated {
            offset: base + offset,
        },
        other => other,
    }
}
