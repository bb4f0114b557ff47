use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{ErrorKind, Read, Write};

/// Whether the raw bytes of a node stream are zlib wrapped. Containers are always compressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamCompression {
    Compressed,
    Uncompressed,
}

impl StreamCompression {
    /// Inserts the inflate filter between the raw source and whoever consumes it, if needed.
    pub fn wrap_source<'a, R: Read + 'a>(&self, source: R) -> Box<dyn Read + 'a> {
        match self {
            StreamCompression::Compressed => Box::new(ZlibDecoder::new(source)),
            StreamCompression::Uncompressed => Box::new(source),
        }
    }

    /// Whether a read error from a wrapped source came out of the inflate filter rather than the source.
    pub fn is_filter_error(&self, kind: ErrorKind) -> bool {
        matches!(self, StreamCompression::Compressed) && matches!(kind, ErrorKind::InvalidInput | ErrorKind::InvalidData)
    }
}

pub fn compressing_writer<W: Write>(sink: W) -> ZlibEncoder<W> {
    ZlibEncoder::new(sink, Compression::default())
}

pub fn decompressing_reader<R: Read>(source: R) -> ZlibDecoder<R> {
    ZlibDecoder::new(source)
}

pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = compressing_writer(Vec::with_capacity(bytes.len() / 2));
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(bytes.len() * 2);
    decompressing_reader(bytes).read_to_end(&mut buf)?;
    Ok(buf)
}
