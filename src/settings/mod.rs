use clap::{Parser, Subcommand, ValueEnum, value_parser};
use itertools::Itertools;
use scenex_files::container::ContainerFormat;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "scenex")]
#[command(version)]
#[command(about = "Converts streamed 3D asset exports into self-contained asset containers")]
pub struct CliArgs {
    /// Worker threads used for graph integration, defaults to the available parallelism.
    #[arg(long, env = "SCENEX_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    #[arg(long, env = "SCENEX_READ_CHUNK_SIZE", default_value_t = DEFAULT_READ_CHUNK_SIZE)]
    pub read_chunk_size: usize,

    #[arg(long, value_enum, env = "SCENEX_TRAILING_BYTES", default_value_t = TrailingBytes::Report)]
    pub trailing_bytes: TrailingBytes,

    #[command(subcommand)]
    pub operation_mode: OperationMode,
}

#[derive(Subcommand, Debug)]
pub enum OperationMode {
    /// Decodes an export bundle (`<stem>.x3_p` or `<stem>.x3_c`) and writes the requested containers.
    Convert {
        input: PathBuf,
        #[arg(long, short, env = "SCENEX_OUTPUT_DIR", default_value = ".")]
        output_dir: PathBuf,
        #[arg(long, short, value_delimiter = ',', default_value = "hgm", value_parser = value_parser!(ContainerFormat))]
        formats: Vec<ContainerFormat>,
        /// Stop issuing per-geometry outputs once one of them failed.
        #[arg(long, env = "SCENEX_FAIL_FAST")]
        fail_fast: bool,
    },
    /// Decodes one container and prints what it contains.
    Inspect { container: PathBuf },
}

impl CliArgs {
    pub fn decoder_settings(&self) -> DecoderSettings {
        DecoderSettings {
            read_chunk_size: self.read_chunk_size.max(1),
            trailing_bytes: self.trailing_bytes,
            ..Default::default()
        }
    }

    pub fn assembler_settings(&self) -> AssemblerSettings {
        let mut settings = AssemblerSettings::default();
        if let Some(worker_threads) = self.worker_threads {
            settings.worker_threads = worker_threads.max(1);
        }
        settings
    }

    /// Output formats, deduplicated, in tag order.
    pub fn formats(&self) -> Vec<ContainerFormat> {
        match &self.operation_mode {
            OperationMode::Convert { formats, .. } => formats.iter().copied().sorted().dedup().collect_vec(),
            OperationMode::Inspect { .. } => vec![],
        }
    }
}

pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

/// What to do with bytes that are still undecoded when a node stream ends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum TrailingBytes {
    /// Fail the stream with a truncation error.
    #[default]
    Report,
    /// Log and drop them.
    Discard,
}

#[derive(Debug, Clone)]
pub struct DecoderSettings {
    /// Bytes requested from the source per read.
    pub read_chunk_size: usize,
    /// Chunks the consumer drains before attempting to decode, at least 1.
    pub batch_bound: usize,
    /// How long the consumer waits for new chunks when it drained fewer than `batch_bound`.
    pub idle_wait: Duration,
    pub trailing_bytes: TrailingBytes,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            batch_bound: 32,
            idle_wait: Duration::from_millis(50),
            trailing_bytes: TrailingBytes::Report,
        }
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|threads| threads.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub worker_threads: usize,
    /// Sleep between two checks in [`crate::assembler::GraphAssembler::wait_quiescent`].
    pub poll_interval: Duration,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            worker_threads: available_threads(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Skip outputs that have not started yet once another one failed.
    pub fail_fast: bool,
    /// Per-geometry outputs written at the same time.
    pub output_threads: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            output_threads: available_threads(),
        }
    }
}
