use crate::content::AssetContent;
use crate::content::nodes::{
    FinalGeometryNode, FinalGeometryPart, FinalHierarchyNode, NodeRef, affine_from_wire, affine_to_wire,
};
use crate::io::compression::{compressing_writer, decompress};
use crate::io::sink::{OutputProvider, OutputSink, SinkError};
use crate::settings::EncodeOptions;
use itertools::Itertools;
use log::{error, info, warn};
use rayon::prelude::*;
use scenex_files::ParserError;
use scenex_files::common::reader::Parseable;
use scenex_files::common::types::{NodeId, UNDEFINED_ID, defined};
use scenex_files::common::writer::Writable;
use scenex_files::container::{
    ContainerFormat, HierarchyEntry, PayloadEntry, PlacedPart, read_section, write_section,
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("the asset has no root hierarchy node")]
    NoRoot,
    #[error("the asset has no encodable geometry nodes")]
    NoGeometry,
    #[error("{0} produces one container per geometry node")]
    SplitFormat(ContainerFormat),
    #[error("hierarchy node {0:#x} appears more than once")]
    DuplicateNode(NodeId),
    #[error("the container is violating the expected format, because: {0}")]
    Malformed(&'static str),
    #[error("skipped after an earlier output failed")]
    Skipped,
    #[error("decompressing the container failed")]
    Decompression(#[source] std::io::Error),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("could not build the output thread pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct OutputFailure {
    /// The geometry a split output was for, `None` for single containers.
    pub geometry: Option<NodeId>,
    pub error: ContainerError,
}

/// Every output that failed while encoding one format. The other outputs completed.
#[derive(Error, Debug)]
#[error("{} of {attempted} outputs failed", failures.len())]
pub struct EncodeError {
    pub attempted: usize,
    pub failures: Vec<OutputFailure>,
}

enum Selection<'a> {
    Whole(ContainerFormat),
    Geometry(&'a FinalGeometryNode),
}

impl AssetContent {
    /// Encodes a single-payload format into a compressed in-memory container.
    pub fn encode(&self, format: ContainerFormat) -> Result<Vec<u8>, ContainerError> {
        if format.is_split() {
            return Err(ContainerError::SplitFormat(format));
        }
        self.encode_selection(Selection::Whole(format))
    }

    /// The split container for one geometry node.
    pub fn encode_geometry(&self, geometry_id: NodeId) -> Result<Vec<u8>, ContainerError> {
        let geometry = self
            .geometries()
            .get(geometry_id)
            .filter(|geometry| geometry.render_payload().is_some())
            .ok_or(ContainerError::NoGeometry)?;
        self.encode_selection(Selection::Geometry(&geometry))
    }

    fn encode_selection(&self, selection: Selection) -> Result<Vec<u8>, ContainerError> {
        let mut encoder = compressing_writer(Vec::new());
        self.write_selection(&selection, &mut encoder)?;
        Ok(encoder.finish()?)
    }

    /// Encodes `format` into the destinations `provider` hands out: one for single-payload formats, one per
    /// geometry node for split formats. A failing destination never stops the others from completing.
    pub fn encode_to(
        &self,
        format: ContainerFormat,
        provider: &OutputProvider,
        options: &EncodeOptions,
    ) -> Result<(), EncodeError> {
        self.encode_to_shared(format, provider, options, &AtomicBool::new(false))
    }

    /// [`Self::encode_to`] with a failure flag shared with other formats. Any failure raises it, and with
    /// `fail_fast` the outputs that have not started once it is raised are skipped.
    pub(crate) fn encode_to_shared(
        &self,
        format: ContainerFormat,
        provider: &OutputProvider,
        options: &EncodeOptions,
        failed: &AtomicBool,
    ) -> Result<(), EncodeError> {
        let started = Instant::now();
        let result = if format.is_split() {
            self.encode_split(provider, options, failed)
        } else {
            self.encode_single(format, provider)
        };
        if result.is_err() {
            failed.store(true, Ordering::Release);
        }

        match &result {
            Ok(()) => info!("Encoded {format} in {:?}", started.elapsed()),
            Err(err) => error!("Encoding {format} failed after {:?}: {err}", started.elapsed()),
        }
        result
    }

    fn encode_single(&self, format: ContainerFormat, provider: &OutputProvider) -> Result<(), EncodeError> {
        let outcome = if format.has_hierarchy() && self.root().is_none() {
            Err(ContainerError::NoRoot)
        } else {
            provider(None)
                .map_err(ContainerError::from)
                .and_then(|sink| self.write_to_sink(&Selection::Whole(format), sink))
        };

        outcome.map_err(|error| EncodeError {
            attempted: 1,
            failures: vec![OutputFailure { geometry: None, error }],
        })
    }

    fn encode_split(
        &self,
        provider: &OutputProvider,
        options: &EncodeOptions,
        failed: &AtomicBool,
    ) -> Result<(), EncodeError> {
        let geometries = self.encodable_geometries();
        if geometries.is_empty() {
            return Err(EncodeError {
                attempted: 0,
                failures: vec![OutputFailure {
                    geometry: None,
                    error: ContainerError::NoGeometry,
                }],
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.output_threads.max(1))
            .thread_name(|index| format!("gs-output-{index}"))
            .build()
            .map_err(|err| EncodeError {
                attempted: geometries.len(),
                failures: vec![OutputFailure {
                    geometry: None,
                    error: ContainerError::Pool(err),
                }],
            })?;

        let failures = pool.install(|| {
            geometries
                .par_iter()
                .filter_map(|geometry| {
                    if options.fail_fast && failed.load(Ordering::Acquire) {
                        return Some(OutputFailure {
                            geometry: Some(geometry.id),
                            error: ContainerError::Skipped,
                        });
                    }

                    let outcome = provider(Some(geometry.id))
                        .map_err(ContainerError::from)
                        .and_then(|sink| self.write_to_sink(&Selection::Geometry(geometry), sink));

                    outcome.err().map(|error| {
                        error!("Geometry container {:#x} failed: {error}", geometry.id);
                        failed.store(true, Ordering::Release);
                        OutputFailure {
                            geometry: Some(geometry.id),
                            error,
                        }
                    })
                })
                .collect::<Vec<_>>()
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EncodeError {
                attempted: geometries.len(),
                failures,
            })
        }
    }

    fn write_to_sink(&self, selection: &Selection, sink: OutputSink) -> Result<(), ContainerError> {
        let mut encoder = compressing_writer(sink.into_writer());
        self.write_selection(selection, &mut encoder)?;
        encoder.finish()?.finish()?;
        Ok(())
    }

    /// Geometry nodes that have a render payload, in id order. Only those get a split container.
    fn encodable_geometries(&self) -> Vec<Arc<FinalGeometryNode>> {
        self.geometries()
            .sorted()
            .into_iter()
            .filter(|geometry| {
                let encodable = geometry.render_payload().is_some();
                if geometry.is_declared() && !encodable {
                    warn!("Geometry {:#x} has no render payload, leaving it out", geometry.id);
                }
                encodable
            })
            .collect_vec()
    }

    fn write_selection<W: Write>(&self, selection: &Selection, w: &mut W) -> Result<(), ContainerError> {
        match selection {
            Selection::Whole(format) => {
                format.tag().write(w)?;
                if format.has_geometry() {
                    // placeholders are written with an empty payload
                    let entries = self
                        .geometries()
                        .sorted()
                        .iter()
                        .map(|geometry| geometry_entry(geometry))
                        .collect_vec();
                    write_section(w, &entries)?;
                }
                if format.has_metadata() {
                    write_section(w, &self.metadata_entries()?)?;
                }
                if format.has_hierarchy() {
                    self.write_hierarchy(w)?;
                }
            }
            Selection::Geometry(geometry) => {
                if geometry.render_payload().is_none() {
                    return Err(ContainerError::NoGeometry);
                }
                ContainerFormat::Gs.tag().write(w)?;
                geometry_entry(geometry).write(w)?;
            }
        }
        Ok(())
    }

    fn metadata_entries(&self) -> Result<Vec<PayloadEntry>, ContainerError> {
        self.metadata()
            .sorted()
            .iter()
            .map(|metadata| {
                Ok(PayloadEntry {
                    id: metadata.id,
                    bytes: serde_json::to_vec(&*metadata.json())?,
                })
            })
            .collect()
    }

    /// Strict pre-order: every node is written right before its subtree, children in id order.
    fn write_hierarchy<W: Write>(&self, w: &mut W) -> Result<(), ContainerError> {
        let root = self.root().ok_or(ContainerError::NoRoot)?;

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let children = node.children().into_iter().sorted_by_key(|child| child.id).collect_vec();
            let entry = HierarchyEntry {
                id: node.id,
                parent_id: node.parent_id(),
                metadata_id: node.metadata().id,
                parts: node
                    .geometries()
                    .iter()
                    .map(|part| PlacedPart {
                        geometry_id: part.geometry.id,
                        transform: affine_to_wire(&part.transform),
                        color: part.color,
                    })
                    .collect_vec(),
                child_count: children.len(),
            };
            entry.write(w)?;
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// Builds a fresh graph out of one container.
    pub fn decode(bytes: &[u8]) -> Result<AssetContent, ContainerError> {
        let content = AssetContent::new();
        content.decode_into(bytes)?;
        Ok(content)
    }

    /// Merges one container into this graph, e.g. the geometry containers belonging to a hierarchy-only
    /// container. References to nodes that aren't known yet stay dangling until [`AssetContent::relink`].
    pub fn decode_into(&self, bytes: &[u8]) -> Result<ContainerFormat, ContainerError> {
        let payload = decompress(bytes).map_err(ContainerError::Decompression)?;
        let mut rdr = Cursor::new(payload.as_slice());
        let format = ContainerFormat::from_tag(u8::parse(&mut rdr)?)?;

        if format.has_geometry() {
            let entries = if format.is_split() {
                vec![PayloadEntry::parse(&mut rdr)?]
            } else {
                read_section(&mut rdr)?
            };

            for entry in entries {
                let geometry = self.geometries().resolve(entry.id);
                if entry.bytes.is_empty() {
                    continue;
                }
                if !geometry.declare() {
                    warn!("Geometry {:#x} is already known, ignoring the container's copy", entry.id);
                    continue;
                }
                geometry.set_render_payload(entry.bytes);
            }
        }

        if format.has_metadata() {
            for entry in read_section(&mut rdr)? {
                let json = serde_json::from_slice(&entry.bytes)?;
                let metadata = self.metadata().resolve(entry.id);
                if !metadata.declare() {
                    warn!("Metadata {:#x} is already known, ignoring the container's copy", entry.id);
                    continue;
                }
                metadata.set_json(json);
            }
        }

        if format.has_hierarchy() {
            self.read_hierarchy(&mut rdr)?;
        }

        if rdr.position() as usize != payload.len() {
            return Err(ContainerError::Malformed("trailing bytes after the last section"));
        }
        Ok(format)
    }

    fn read_hierarchy(&self, rdr: &mut Cursor<&[u8]>) -> Result<(), ContainerError> {
        let root_entry = HierarchyEntry::parse(rdr)?;
        if root_entry.parent_id != UNDEFINED_ID {
            return Err(ContainerError::Malformed("the first hierarchy record is not a root"));
        }

        let root = self.materialize(&root_entry, None)?;
        self.declare_root(&root);

        // (parent, children still to read)
        let mut pending = vec![(root, root_entry.child_count)];
        while let Some(top) = pending.last_mut() {
            if top.1 == 0 {
                pending.pop();
                continue;
            }
            top.1 -= 1;
            let parent = Arc::clone(&top.0);

            let entry = HierarchyEntry::parse(rdr)?;
            if entry.parent_id != parent.id {
                return Err(ContainerError::Malformed("a child record names a different parent"));
            }

            let node = self.materialize(&entry, Some(&parent))?;
            if entry.child_count > 0 {
                pending.push((node, entry.child_count));
            }
        }
        Ok(())
    }

    fn materialize(
        &self,
        entry: &HierarchyEntry,
        parent: Option<&Arc<FinalHierarchyNode>>,
    ) -> Result<Arc<FinalHierarchyNode>, ContainerError> {
        let node = self.hierarchy().resolve(entry.id);
        if !node.declare() {
            return Err(ContainerError::DuplicateNode(entry.id));
        }

        if let Some(parent) = parent {
            node.set_parent(NodeRef::to(parent, parent.id));
            parent.add_child(node.clone());
        }

        node.set_metadata(match defined(entry.metadata_id) {
            None => NodeRef::none(),
            Some(id) => match self.metadata().get(id) {
                Some(metadata) => NodeRef::to(&metadata, id),
                None => NodeRef::dangling(id),
            },
        });

        node.set_geometries(
            entry
                .parts
                .iter()
                .map(|part| FinalGeometryPart {
                    geometry: match self.geometries().get(part.geometry_id) {
                        Some(geometry) => NodeRef::to(&geometry, part.geometry_id),
                        None => NodeRef::dangling(part.geometry_id),
                    },
                    transform: affine_from_wire(&part.transform),
                    color: part.color,
                })
                .collect_vec(),
        );
        Ok(node)
    }
}

fn geometry_entry(geometry: &FinalGeometryNode) -> PayloadEntry {
    PayloadEntry {
        id: geometry.id,
        bytes: geometry
            .render_payload()
            .map(|payload| payload.as_ref().clone())
            .unwrap_or_default(),
    }
}
