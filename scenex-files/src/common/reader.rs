use crate::ParserError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::ErrorKind::UnexpectedEof;
use std::io::Read;

/// Upper bound for capacity reservations driven by counts read off the wire. A corrupt count must not
/// translate into a multi gigabyte allocation before the first element even failed to parse.
const MAX_PREALLOCATION: usize = 4096;

pub trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, ParserError>;
}

impl Parseable<u8> for u8 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u8, ParserError> {
        Ok(rdr.read_u8()?)
    }
}

impl Parseable<i8> for i8 {
    fn parse<R: Read>(rdr: &mut R) -> Result<i8, ParserError> {
        Ok(rdr.read_i8()?)
    }
}

impl Parseable<i32> for i32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<i32, ParserError> {
        Ok(rdr.read_i32::<LittleEndian>()?)
    }
}

impl Parseable<u32> for u32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u32, ParserError> {
        Ok(rdr.read_u32::<LittleEndian>()?)
    }
}

impl Parseable<f32> for f32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<f32, ParserError> {
        Ok(rdr.read_f32::<LittleEndian>()?)
    }
}

impl Parseable<u64> for u64 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u64, ParserError> {
        Ok(rdr.read_u64::<LittleEndian>()?)
    }
}

/// Reads a signed 32 bit element count. Negative counts are malformed rather than "empty".
pub fn read_count<R: Read>(rdr: &mut R, field: &'static str) -> Result<usize, ParserError> {
    let count = rdr.read_i32::<LittleEndian>()?;
    usize::try_from(count).map_err(|_| ParserError::InvalidCount {
        field,
        count: count as i64,
    })
}

pub fn read_array<T: Parseable<T>, R: Read>(rdr: &mut R, count: usize) -> Result<Vec<T>, ParserError> {
    let mut list = Vec::with_capacity(count.min(MAX_PREALLOCATION));
    for _ in 0..count {
        list.push(T::parse(rdr)?);
    }
    Ok(list)
}

/// `i32` count followed by that many elements.
pub fn read_counted_array<T: Parseable<T>, R: Read>(rdr: &mut R, field: &'static str) -> Result<Vec<T>, ParserError> {
    let count = read_count(rdr, field)?;
    read_array(rdr, count)
}

/// `i32` length followed by that many raw bytes.
pub fn read_sized_bytes<R: Read>(rdr: &mut R, field: &'static str) -> Result<Vec<u8>, ParserError> {
    let len = read_count(rdr, field)?;
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOCATION));
    rdr.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(std::io::Error::from(UnexpectedEof).into());
    }
    Ok(buf)
}
