use crate::ParserError;
use crate::common::reader::Parseable;
use scenex_files_derive_parseable::{Emit, Parse};
use std::io::Cursor;

/// Every raw (pre-decompression) node stream starts with this many header bytes.
pub const HEADER_SIZE: usize = 4;
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Parse, Emit)]
pub struct FileHeader {
    pub version: u32,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
        }
    }
}

impl FileHeader {
    /// `None` until at least [`HEADER_SIZE`] bytes are available.
    pub fn from_prefix(bytes: &[u8]) -> Result<Option<FileHeader>, ParserError> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }

        Ok(Some(FileHeader::parse(&mut Cursor::new(&bytes[..HEADER_SIZE]))?))
    }
}
