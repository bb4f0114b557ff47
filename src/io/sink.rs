use parking_lot::Mutex;
use scenex_files::common::types::NodeId;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// A growable in-memory destination the caller keeps a handle to.
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

pub type DoneCallback = Box<dyn FnOnce() + Send>;

/// Hands out one destination per output: `None` for single-container formats, the geometry id for split ones.
pub type OutputProvider = Arc<dyn Fn(Option<NodeId>) -> Result<OutputSink, SinkError> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("no destination available for {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub enum OutputSink {
    Buffer(SharedBuffer),
    Stream {
        writer: Box<dyn Write + Send>,
        /// Runs exactly once, after the final byte was written and flushed. Never on failure.
        on_done: Option<DoneCallback>,
    },
}

impl OutputSink {
    pub fn buffer() -> (OutputSink, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (OutputSink::Buffer(buffer.clone()), buffer)
    }

    pub fn stream<W: Write + Send + 'static>(writer: W, on_done: Option<DoneCallback>) -> OutputSink {
        OutputSink::Stream {
            writer: Box::new(writer),
            on_done,
        }
    }

    pub fn create_file(path: &Path) -> Result<OutputSink, SinkError> {
        Ok(OutputSink::stream(BufWriter::new(File::create(path)?), None))
    }

    pub fn into_writer(self) -> SinkWriter {
        match self {
            OutputSink::Buffer(target) => SinkWriter::Buffer {
                staging: Vec::new(),
                target,
            },
            OutputSink::Stream { writer, on_done } => SinkWriter::Stream { writer, on_done },
        }
    }
}

/// The writing end of an [`OutputSink`]. Nothing is published until [`SinkWriter::finish`].
pub enum SinkWriter {
    Buffer {
        staging: Vec<u8>,
        target: SharedBuffer,
    },
    Stream {
        writer: Box<dyn Write + Send>,
        on_done: Option<DoneCallback>,
    },
}

impl SinkWriter {
    pub fn finish(self) -> Result<(), SinkError> {
        match self {
            // replaces anything the buffer held before
            SinkWriter::Buffer { staging, target } => *target.lock() = staging,
            SinkWriter::Stream { mut writer, on_done } => {
                writer.flush()?;
                drop(writer);
                if let Some(on_done) = on_done {
                    on_done();
                }
            }
        }
        Ok(())
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            SinkWriter::Buffer { staging, .. } => staging.write(buf),
            SinkWriter::Stream { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            SinkWriter::Buffer { .. } => Ok(()),
            SinkWriter::Stream { writer, .. } => writer.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    pub fn buffer_is_published_on_finish() -> Result<(), anyhow::Error> {
        let (sink, buffer) = OutputSink::buffer();
        let mut writer = sink.into_writer();
        writer.write_all(b"abc")?;
        assert!(buffer.lock().is_empty());

        writer.finish()?;
        assert_eq!(buffer.lock().as_slice(), b"abc");
        Ok(())
    }

    #[test]
    pub fn reused_buffer_is_replaced() -> Result<(), anyhow::Error> {
        let buffer = SharedBuffer::new(Mutex::new(b"stale contents".to_vec()));
        let mut writer = OutputSink::Buffer(buffer.clone()).into_writer();
        writer.write_all(b"new")?;
        assert_eq!(buffer.lock().as_slice(), b"stale contents");

        writer.finish()?;
        assert_eq!(buffer.lock().as_slice(), b"new");
        Ok(())
    }

    #[test]
    pub fn done_callback_runs_once_after_finish() -> Result<(), anyhow::Error> {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_callback = calls.clone();
        let target = SharedBuffer::default();

        struct Forward(SharedBuffer);
        impl Write for Forward {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = OutputSink::stream(
            Forward(target.clone()),
            Some(Box::new(move || {
                calls_in_callback.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let mut writer = sink.into_writer();
        writer.write_all(b"payload")?;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        writer.finish()?;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(target.lock().as_slice(), b"payload");
        Ok(())
    }
}
