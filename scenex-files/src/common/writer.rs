use crate::ParserError;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// The byte-for-byte inverse of [`crate::common::reader::Parseable`].
pub trait Writable {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError>;
}

impl Writable for u8 {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        Ok(w.write_u8(*self)?)
    }
}

impl Writable for i8 {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        Ok(w.write_i8(*self)?)
    }
}

impl Writable for i32 {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        Ok(w.write_i32::<LittleEndian>(*self)?)
    }
}

impl Writable for u32 {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        Ok(w.write_u32::<LittleEndian>(*self)?)
    }
}

impl Writable for f32 {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        Ok(w.write_f32::<LittleEndian>(*self)?)
    }
}

impl Writable for u64 {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        Ok(w.write_u64::<LittleEndian>(*self)?)
    }
}

pub fn write_count<W: Write>(w: &mut W, count: usize, field: &'static str) -> Result<(), ParserError> {
    let count = i32::try_from(count).map_err(|_| ParserError::InvalidCount {
        field,
        count: count as i64,
    })?;
    Ok(w.write_i32::<LittleEndian>(count)?)
}

pub fn write_array<T: Writable, W: Write>(w: &mut W, list: &[T]) -> Result<(), ParserError> {
    for element in list {
        element.write(w)?;
    }
    Ok(())
}

pub fn write_counted_array<T: Writable, W: Write>(
    w: &mut W,
    list: &[T],
    field: &'static str,
) -> Result<(), ParserError> {
    write_count(w, list.len(), field)?;
    write_array(w, list)
}

pub fn write_sized_bytes<W: Write>(w: &mut W, bytes: &[u8], field: &'static str) -> Result<(), ParserError> {
    write_count(w, bytes.len(), field)?;
    Ok(w.write_all(bytes)?)
}
