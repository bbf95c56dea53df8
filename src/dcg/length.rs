//! Variable-length size field used throughout the DCG game format.
//!
//! ## Size classes
//! ```text
//! 0x00..=0x7F          value itself, one byte
//! 0x81 + u8            128..=255
//! 0x82 + u16           256..=65_535
//! 0x83 + u24           65_536..=16_777_215
//! 0x84 + u32           16_777_216..=4_294_967_295
//! ```
//! All multi-byte magnitudes are big-endian. Anything above `u32::MAX` is
//! rejected rather than truncated.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};

const SINGLE_BYTE_MAX: usize = 0x7F;

const CLASS_U8: u8 = 0x81;
const CLASS_U16: u8 = 0x82;
const CLASS_U24: u8 = 0x83;
const CLASS_U32: u8 = 0x84;

const U24_MAX: usize = 0x00FF_FFFF;

/// Number of bytes the size field for `len` occupies
pub fn encoded_size(len: usize) -> Result<usize> {
    Ok(match len {
        0..=SINGLE_BYTE_MAX => 1,
        0x80..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=U24_MAX => 4,
        _ if len as u64 <= u32::MAX as u64 => 5,
        _ => return Err(Error::LengthOverflow(len as u64)),
    })
}

/// Append the size field for `len` to `buf`
pub fn append_length(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    match len {
        0..=SINGLE_BYTE_MAX => buf.push(len as u8),
        0x80..=0xFF => {
            buf.push(CLASS_U8);
            buf.push(len as u8);
        }
        0x100..=0xFFFF => {
            buf.push(CLASS_U16);
            buf.write_u16::<BigEndian>(len as u16)?;
        }
        0x1_0000..=U24_MAX => {
            buf.push(CLASS_U24);
            buf.write_u24::<BigEndian>(len as u32)?;
        }
        _ => {
            let len = u32::try_from(len).map_err(|_| Error::LengthOverflow(len as u64))?;
            buf.push(CLASS_U32);
            buf.write_u32::<BigEndian>(len)?;
        }
    }
    Ok(())
}

/// Prefix `buf` with a size field holding its current length
pub fn prepend_length(buf: &mut Vec<u8>) -> Result<()> {
    let mut header = Vec::with_capacity(encoded_size(buf.len())?);
    append_length(&mut header, buf.len())?;
    buf.splice(0..0, header);
    Ok(())
}

/// Read a size field at `*pos`, advancing `*pos` past it
pub fn read_length(data: &[u8], pos: &mut usize) -> Result<usize> {
    let start = *pos;
    let tag = *data
        .get(start)
        .ok_or_else(|| Error::decode(start, "truncated size field"))?;

    if tag as usize <= SINGLE_BYTE_MAX {
        *pos += 1;
        return Ok(tag as usize);
    }

    let width = match tag {
        CLASS_U8 => 1,
        CLASS_U16 => 2,
        CLASS_U24 => 3,
        CLASS_U32 => 4,
        _ => return Err(Error::decode(start, format!("invalid size class 0x{:02X}", tag))),
    };
    let bytes = data
        .get(start + 1..start + 1 + width)
        .ok_or_else(|| Error::decode(start, "truncated size field"))?;
    let value = match width {
        1 => bytes[0] as usize,
        2 => BigEndian::read_u16(bytes) as usize,
        3 => BigEndian::read_u24(bytes) as usize,
        _ => BigEndian::read_u32(bytes) as usize,
    };
    *pos = start + 1 + width;
    Ok(value)
}
