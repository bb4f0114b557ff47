use crate::ParserError;
use crate::common::writer::Writable;
use crate::header::FileHeader;
use crate::nodes::WireNode;
use std::io::Write;
use std::marker::PhantomData;

/// Producer side of a node stream: the header followed by records of a single node kind.
pub struct NodeStreamWriter<N: WireNode, W: Write> {
    inner: W,
    nodes_written: usize,
    _kind: PhantomData<N>,
}

impl<N: WireNode, W: Write> NodeStreamWriter<N, W> {
    pub fn new(mut inner: W, header: FileHeader) -> Result<Self, ParserError> {
        header.write(&mut inner)?;
        Ok(Self {
            inner,
            nodes_written: 0,
            _kind: PhantomData,
        })
    }

    pub fn write_node(&mut self, node: &N) -> Result<(), ParserError> {
        node.write(&mut self.inner)?;
        self.nodes_written += 1;
        Ok(())
    }

    pub fn nodes_written(&self) -> usize {
        self.nodes_written
    }

    pub fn finish(mut self) -> Result<W, ParserError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Encodes a complete, uncompressed node stream in memory.
pub fn encode_stream<N: WireNode>(nodes: &[N]) -> Result<Vec<u8>, ParserError> {
    let mut writer = NodeStreamWriter::new(Vec::new(), FileHeader::default())?;
    for node in nodes {
        writer.write_node(node)?;
    }
    writer.finish()
}
