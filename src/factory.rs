use crate::assembler::{AssemblerError, AssemblerFeed, GraphAssembler};
use crate::content::AssetContent;
use crate::content::container::{ContainerError, EncodeError, OutputFailure};
use crate::io::bundle::StreamSources;
use crate::io::compression::StreamCompression;
use crate::io::node_stream::{NodeStreamReader, StreamError, StreamSummary};
use crate::io::sink::OutputProvider;
use crate::render::mesh_codec::{MeshCodec, PackedMeshCodec};
use crate::settings::{AssemblerSettings, DecoderSettings, EncodeOptions};
use log::{error, info, warn};
use scenex_files::container::ContainerFormat;
use scenex_files::nodes::NodeKind;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("no output formats were requested")]
    NoOutputs,
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
    #[error("could not spawn a pipeline thread")]
    Spawn(#[source] std::io::Error),
    #[error("{} input stream(s) failed", .0.len())]
    Streams(Vec<StreamError>),
    #[error("{} output format(s) failed", .0.len())]
    Encode(Vec<(ContainerFormat, EncodeError)>),
}

/// The outcome of reading one bundle: the graph is usable even when a stream failed midway.
pub struct AssembledContent {
    pub content: Arc<AssetContent>,
    pub summaries: Vec<StreamSummary>,
    pub stream_errors: Vec<StreamError>,
    pub failed_integrations: usize,
}

/// Runs the whole pipeline: three node streams into one assembler, then the assembled content into every
/// requested container format.
pub struct AssetFactory {
    codec: Arc<dyn MeshCodec>,
    decoder_settings: DecoderSettings,
    assembler_settings: AssemblerSettings,
    encode_options: EncodeOptions,
}

impl Default for AssetFactory {
    fn default() -> Self {
        Self::new(
            Arc::new(PackedMeshCodec),
            DecoderSettings::default(),
            AssemblerSettings::default(),
            EncodeOptions::default(),
        )
    }
}

impl AssetFactory {
    pub fn new(
        codec: Arc<dyn MeshCodec>,
        decoder_settings: DecoderSettings,
        assembler_settings: AssemblerSettings,
        encode_options: EncodeOptions,
    ) -> Self {
        Self {
            codec,
            decoder_settings,
            assembler_settings,
            encode_options,
        }
    }

    /// Reads all three streams concurrently, one thread each, and waits for the assembler to drain.
    pub fn build<H, G, M>(
        &self,
        sources: StreamSources<H, G, M>,
        compression: StreamCompression,
    ) -> Result<AssembledContent, FactoryError>
    where
        H: Read + Send,
        G: Read + Send,
        M: Read + Send,
    {
        let started = Instant::now();
        let assembler = GraphAssembler::new(self.codec.clone(), self.assembler_settings.clone())?;

        let results = thread::scope(|scope| {
            let hierarchy = self.spawn_stream(scope, &assembler, NodeKind::Hierarchy, compression, sources.hierarchy)?;
            let geometry = self.spawn_stream(scope, &assembler, NodeKind::Geometry, compression, sources.geometry)?;
            let metadata = self.spawn_stream(scope, &assembler, NodeKind::Metadata, compression, sources.metadata)?;

            let handles = [
                (NodeKind::Hierarchy, hierarchy),
                (NodeKind::Geometry, geometry),
                (NodeKind::Metadata, metadata),
            ];
            let results = handles.map(|(kind, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(StreamError::Io {
                        kind,
                        source: std::io::Error::other("stream thread panicked"),
                    })
                })
            });
            Ok::<_, std::io::Error>(results)
        })
        .map_err(FactoryError::Spawn)?;

        // Streams are done, but integration tasks may still be queued.
        assembler.wait_quiescent();

        let mut summaries = vec![];
        let mut stream_errors = vec![];
        for result in results {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(err) => stream_errors.push(err),
            }
        }

        let content = assembler.content();
        info!(
            "Assembled {:?} in {:?} ({} stream errors, {} failed integrations)",
            content.stats(),
            started.elapsed(),
            stream_errors.len(),
            assembler.failed_integrations()
        );

        Ok(AssembledContent {
            content,
            summaries,
            stream_errors,
            failed_integrations: assembler.failed_integrations(),
        })
    }

    fn spawn_stream<'scope, 'env, R: Read + Send + 'scope>(
        &'env self,
        scope: &'scope thread::Scope<'scope, 'env>,
        assembler: &'env GraphAssembler,
        kind: NodeKind,
        compression: StreamCompression,
        source: R,
    ) -> std::io::Result<thread::ScopedJoinHandle<'scope, Result<StreamSummary, StreamError>>> {
        let reader = NodeStreamReader::new(kind, compression, self.decoder_settings.clone());
        thread::Builder::new()
            .name(format!("{}-reader", kind.name()))
            .spawn_scoped(scope, move || reader.run(source, &mut AssemblerFeed(assembler)))
    }

    /// [`Self::build`] followed by encoding every format in `outputs`, each on its own thread. Nothing is
    /// written if one of the input streams failed.
    pub fn convert<H, G, M>(
        &self,
        sources: StreamSources<H, G, M>,
        compression: StreamCompression,
        outputs: &BTreeMap<ContainerFormat, OutputProvider>,
    ) -> Result<Arc<AssetContent>, FactoryError>
    where
        H: Read + Send,
        G: Read + Send,
        M: Read + Send,
    {
        if outputs.is_empty() {
            return Err(FactoryError::NoOutputs);
        }

        let assembled = self.build(sources, compression)?;
        if !assembled.stream_errors.is_empty() {
            return Err(FactoryError::Streams(assembled.stream_errors));
        }
        if assembled.failed_integrations > 0 {
            warn!(
                "{} nodes failed to integrate, the outputs will miss them",
                assembled.failed_integrations
            );
        }

        self.encode_all(&assembled.content, outputs)?;
        Ok(assembled.content)
    }

    /// Encodes every format concurrently. A failing output raises a flag shared by all formats, with
    /// `fail_fast` the formats and geometry outputs that have not started yet are skipped.
    pub fn encode_all(
        &self,
        content: &AssetContent,
        outputs: &BTreeMap<ContainerFormat, OutputProvider>,
    ) -> Result<(), FactoryError> {
        let failed = AtomicBool::new(false);

        let failures = thread::scope(|scope| {
            let handles = outputs
                .iter()
                .map(|(format, provider)| {
                    let failed = &failed;
                    let handle = thread::Builder::new()
                        .name(format!("encode-{format}"))
                        .spawn_scoped(scope, move || self.encode_format(content, *format, provider, failed))?;
                    Ok((*format, handle))
                })
                .collect::<std::io::Result<Vec<_>>>()?;

            let failures = handles
                .into_iter()
                .filter_map(|(format, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(EncodeError {
                            attempted: 1,
                            failures: vec![OutputFailure {
                                geometry: None,
                                error: ContainerError::Io(std::io::Error::other("encode thread panicked")),
                            }],
                        })
                    });
                    result.err().map(|err| (format, err))
                })
                .collect::<Vec<_>>();
            Ok::<_, std::io::Error>(failures)
        })
        .map_err(FactoryError::Spawn)?;

        if failures.is_empty() {
            Ok(())
        } else {
            for (format, err) in &failures {
                error!("{format}: {err}");
            }
            Err(FactoryError::Encode(failures))
        }
    }

    fn encode_format(
        &self,
        content: &AssetContent,
        format: ContainerFormat,
        provider: &OutputProvider,
        failed: &AtomicBool,
    ) -> Result<(), EncodeError> {
        if self.encode_options.fail_fast && failed.load(Ordering::Acquire) {
            warn!("Skipping {format}, another format already failed");
            return Err(EncodeError {
                attempted: 0,
                failures: vec![OutputFailure {
                    geometry: None,
                    error: ContainerError::Skipped,
                }],
            });
        }

        content.encode_to_shared(format, provider, &self.encode_options, failed)
    }
}
