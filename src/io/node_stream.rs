use crate::io::compression::StreamCompression;
use crate::settings::{DecoderSettings, TrailingBytes};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, trace, warn};
use scenex_files::ParserError;
use scenex_files::header::{CURRENT_VERSION, FileHeader, HEADER_SIZE};
use scenex_files::nodes::{AnyNode, Decoded, NodeKind};
use std::io::{ErrorKind, Read};
use std::thread;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("malformed {} record at stream offset {offset}", kind.name())]
    Malformed {
        kind: NodeKind,
        offset: usize,
        #[source]
        source: ParserError,
    },
    #[error("{} stream ended with {pending} undecodable trailing bytes", kind.name())]
    Truncated { kind: NodeKind, pending: usize },
    #[error("{} stream ended before its header was complete", kind.name())]
    MissingHeader { kind: NodeKind },
    #[error("decompressing the {} stream failed", kind.name())]
    Decompression {
        kind: NodeKind,
        #[source]
        source: std::io::Error,
    },
    #[error("reading the {} stream failed", kind.name())]
    Io {
        kind: NodeKind,
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    /// Numeric code reported through the error channel.
    pub fn code(&self) -> u16 {
        match self {
            StreamError::Malformed { .. } => 400,
            StreamError::Truncated { .. } | StreamError::MissingHeader { .. } => 422,
            StreamError::Decompression { .. } => 500,
            StreamError::Io { .. } => 503,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            StreamError::Malformed { kind, .. }
            | StreamError::Truncated { kind, .. }
            | StreamError::MissingHeader { kind }
            | StreamError::Decompression { kind, .. }
            | StreamError::Io { kind, .. } => *kind,
        }
    }
}

/// Receives everything a node stream produces. Nodes arrive in the order they were written.
pub trait NodeStreamHandler {
    fn on_version(&mut self, kind: NodeKind, version: u32) {
        debug!("{} stream has version {version}", kind.name());
    }

    fn on_node(&mut self, node: AnyNode);

    /// Called at most once, the stream stops afterwards.
    fn on_error(&mut self, _error: &StreamError) {}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingHeader,
    Streaming,
    Drained,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub kind: NodeKind,
    pub version: Option<u32>,
    pub nodes: usize,
    /// Decompressed bytes, header included.
    pub bytes: usize,
}

/// Incremental decoder for one node stream. Bytes can be fed in arbitrarily sized pieces, a record that is
/// split across feeds is kept verbatim until the rest of it arrives.
pub struct StreamingDecoder {
    kind: NodeKind,
    state: DecoderState,
    leftover: Vec<u8>,
    /// Stream offset of `leftover[0]`.
    leftover_offset: usize,
    version: Option<u32>,
    nodes: usize,
}

impl StreamingDecoder {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: DecoderState::AwaitingHeader,
            leftover: Vec::new(),
            leftover_offset: 0,
            version: None,
            nodes: 0,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Bytes waiting for the rest of their record.
    pub fn pending(&self) -> usize {
        self.leftover.len()
    }

    /// Returns the amount of nodes this call emitted.
    pub fn feed<H: NodeStreamHandler + ?Sized>(&mut self, bytes: &[u8], handler: &mut H) -> Result<usize, StreamError> {
        match self.state {
            DecoderState::Drained => {
                warn!("{} stream received {} bytes after it was drained", self.kind.name(), bytes.len());
                return Ok(0);
            }
            DecoderState::AwaitingHeader => {
                self.leftover.extend_from_slice(bytes);
                let header = FileHeader::from_prefix(&self.leftover).map_err(|source| StreamError::Malformed {
                    kind: self.kind,
                    offset: 0,
                    source,
                })?;

                let Some(header) = header else {
                    return Ok(0);
                };

                if header.version != CURRENT_VERSION {
                    warn!(
                        "{} stream has version {}, this build writes version {CURRENT_VERSION}",
                        self.kind.name(),
                        header.version
                    );
                }

                self.version = Some(header.version);
                handler.on_version(self.kind, header.version);
                self.leftover.drain(..HEADER_SIZE);
                self.leftover_offset = HEADER_SIZE;
                self.state = DecoderState::Streaming;
            }
            DecoderState::Streaming => self.leftover.extend_from_slice(bytes),
        }

        self.decode_available(handler)
    }

    fn decode_available<H: NodeStreamHandler + ?Sized>(&mut self, handler: &mut H) -> Result<usize, StreamError> {
        let mut cursor = 0;
        let mut emitted = 0;
        loop {
            match AnyNode::decode(self.kind, &self.leftover, cursor) {
                Ok(Decoded::Node { node, consumed }) => {
                    trace!("Decoded {} node {:#x} ({consumed} bytes)", self.kind.name(), node.id());
                    cursor += consumed;
                    emitted += 1;
                    handler.on_node(node);
                }
                Ok(Decoded::NeedMoreData) => break,
                Err(source) => {
                    return Err(StreamError::Malformed {
                        kind: self.kind,
                        offset: self.leftover_offset + cursor,
                        source,
                    });
                }
            }
        }

        self.leftover.drain(..cursor);
        self.leftover_offset += cursor;
        self.nodes += emitted;
        Ok(emitted)
    }

    /// Signals the end of input.
    pub fn finish(&mut self, trailing_bytes: TrailingBytes) -> Result<StreamSummary, StreamError> {
        let previous = std::mem::replace(&mut self.state, DecoderState::Drained);
        let pending = std::mem::take(&mut self.leftover);

        match (previous, trailing_bytes) {
            (DecoderState::AwaitingHeader, TrailingBytes::Report) => {
                return Err(StreamError::MissingHeader { kind: self.kind });
            }
            (DecoderState::AwaitingHeader, TrailingBytes::Discard) => {
                warn!(
                    "{} stream ended before its header, discarding {} bytes",
                    self.kind.name(),
                    pending.len()
                );
            }
            (DecoderState::Streaming, _) if pending.is_empty() => {}
            (DecoderState::Streaming, TrailingBytes::Report) => {
                return Err(StreamError::Truncated {
                    kind: self.kind,
                    pending: pending.len(),
                });
            }
            (DecoderState::Streaming, TrailingBytes::Discard) => {
                warn!(
                    "{} stream ended with a partial record, discarding {} bytes",
                    self.kind.name(),
                    pending.len()
                );
            }
            (DecoderState::Drained, _) => {}
        }

        Ok(StreamSummary {
            kind: self.kind,
            version: self.version,
            nodes: self.nodes,
            bytes: self.leftover_offset + pending.len(),
        })
    }
}

enum Ingested {
    Chunk(Vec<u8>),
    Failed(StreamError),
}

/// Batches of chunks the queue between source and consumer holds before the source blocks.
const QUEUED_BATCHES: usize = 4;

/// Reads one node stream to its end. The source is read (and inflated) on the calling thread, decoding
/// happens on a dedicated consumer thread so slow handlers never stall the source.
pub struct NodeStreamReader {
    kind: NodeKind,
    compression: StreamCompression,
    settings: DecoderSettings,
}

impl NodeStreamReader {
    pub fn new(kind: NodeKind, compression: StreamCompression, settings: DecoderSettings) -> Self {
        Self {
            kind,
            compression,
            settings,
        }
    }

    pub fn run<R: Read, H: NodeStreamHandler + Send>(
        &self,
        source: R,
        handler: &mut H,
    ) -> Result<StreamSummary, StreamError> {
        let result = thread::scope(|scope| {
            let (sender, receiver) = crossbeam_channel::bounded(self.batch_bound() * QUEUED_BATCHES);
            let consumer = thread::Builder::new()
                .name(format!("{}-stream", self.kind.name()))
                .spawn_scoped(scope, || self.consume(receiver, &mut *handler))
                .map_err(|source| StreamError::Io {
                    kind: self.kind,
                    source,
                })?;

            self.produce(source, &sender);
            drop(sender);

            consumer.join().unwrap_or_else(|_| {
                Err(StreamError::Io {
                    kind: self.kind,
                    source: std::io::Error::other("stream consumer panicked"),
                })
            })
        });

        match result {
            Ok(summary) => {
                debug!(
                    "{} stream drained: {} nodes out of {} bytes",
                    self.kind.name(),
                    summary.nodes,
                    summary.bytes
                );
                Ok(summary)
            }
            Err(err) => {
                error!("{} stream failed ({}): {err}", self.kind.name(), err.code());
                handler.on_error(&err);
                Err(err)
            }
        }
    }

    fn batch_bound(&self) -> usize {
        self.settings.batch_bound.max(1)
    }

    fn produce<R: Read>(&self, source: R, sender: &Sender<Ingested>) {
        let mut source = self.compression.wrap_source(source);
        let mut buf = vec![0u8; self.settings.read_chunk_size.max(1)];

        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    // The consumer hung up, it already failed.
                    if sender.send(Ingested::Chunk(buf[..read].to_vec())).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    let failure = if self.compression.is_filter_error(err.kind()) {
                        StreamError::Decompression {
                            kind: self.kind,
                            source: err,
                        }
                    } else {
                        StreamError::Io {
                            kind: self.kind,
                            source: err,
                        }
                    };
                    let _ = sender.send(Ingested::Failed(failure));
                    break;
                }
            }
        }
    }

    fn consume<H: NodeStreamHandler>(
        &self,
        receiver: Receiver<Ingested>,
        handler: &mut H,
    ) -> Result<StreamSummary, StreamError> {
        let batch_bound = self.batch_bound();
        let mut decoder = StreamingDecoder::new(self.kind);
        let mut pending = Vec::new();
        let mut end_of_input = false;

        while !end_of_input {
            let mut drained = 0;
            while drained < batch_bound {
                match receiver.try_recv() {
                    Ok(Ingested::Chunk(chunk)) => {
                        pending.extend_from_slice(&chunk);
                        drained += 1;
                    }
                    Ok(Ingested::Failed(err)) => return Err(err),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        end_of_input = true;
                        break;
                    }
                }
            }

            if !pending.is_empty() {
                decoder.feed(&pending, handler)?;
                pending.clear();
            }

            if !end_of_input && drained < batch_bound {
                match receiver.recv_timeout(self.settings.idle_wait) {
                    Ok(Ingested::Chunk(chunk)) => pending.extend_from_slice(&chunk),
                    Ok(Ingested::Failed(err)) => return Err(err),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => end_of_input = true,
                }
            }
        }

        if !pending.is_empty() {
            decoder.feed(&pending, handler)?;
        }
        decoder.finish(self.settings.trailing_bytes)
    }
}
