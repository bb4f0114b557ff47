mod common;

use common::{Collect, Scene, metadata};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scenex::io::compression::{StreamCompression, compress};
use scenex::io::node_stream::{DecoderState, NodeStreamHandler, NodeStreamReader, StreamError, StreamingDecoder};
use scenex::settings::{DecoderSettings, TrailingBytes};
use scenex_files::common::types::UNDEFINED_ID;
use scenex_files::nodes::{AnyNode, NodeKind};
use scenex_files::stream::encode_stream;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn decode_in_chunks(kind: NodeKind, bytes: &[u8], chunk_sizes: &mut dyn FnMut() -> usize) -> Result<Collect, StreamError> {
    let mut decoder = StreamingDecoder::new(kind);
    let mut collect = Collect::default();

    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + chunk_sizes()).min(bytes.len());
        decoder.feed(&bytes[offset..end], &mut collect)?;
        offset = end;
    }

    let summary = decoder.finish(TrailingBytes::Report)?;
    assert_eq!(summary.nodes, collect.nodes.len());
    assert_eq!(summary.bytes, bytes.len());
    Ok(collect)
}

#[test]
fn byte_at_a_time_matches_whole_buffer() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let nodes = scene.nodes();

    for (kind, bytes) in NodeKind::ALL.into_iter().zip(scene.streams()?) {
        let whole = decode_in_chunks(kind, &bytes, &mut || usize::MAX / 2)?;
        let single = decode_in_chunks(kind, &bytes, &mut || 1)?;

        assert_eq!(single.nodes, whole.nodes);
        assert_eq!(single.versions, vec![(kind, 1)]);
        assert!(whole.nodes.iter().all(|node| node.kind() == kind));
        assert!(whole.nodes.iter().all(|node| nodes.contains(node)));
    }
    Ok(())
}

#[test]
fn random_chunk_boundaries_keep_node_order() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [_, geometry, _] = scene.streams()?;
    let expected = scene.geometry.iter().cloned().map(AnyNode::from).collect::<Vec<_>>();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..32 {
        let collect = decode_in_chunks(NodeKind::Geometry, &geometry, &mut || rng.random_range(1..64))?;
        assert_eq!(collect.nodes, expected);
    }
    Ok(())
}

#[test]
fn partial_record_is_kept_between_feeds() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [hierarchy, _, _] = scene.streams()?;

    let mut decoder = StreamingDecoder::new(NodeKind::Hierarchy);
    let mut collect = Collect::default();

    // header plus a few bytes of the first record
    assert_eq!(decoder.feed(&hierarchy[..10], &mut collect)?, 0);
    assert_eq!(decoder.state(), DecoderState::Streaming);
    assert_eq!(decoder.pending(), 6);

    decoder.feed(&hierarchy[10..], &mut collect)?;
    assert_eq!(decoder.pending(), 0);
    assert_eq!(collect.nodes.len(), scene.hierarchy.len());
    Ok(())
}

#[test]
fn trailing_bytes_policy() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [hierarchy, _, _] = scene.streams()?;
    let truncated = &hierarchy[..hierarchy.len() - 3];

    let mut decoder = StreamingDecoder::new(NodeKind::Hierarchy);
    let mut collect = Collect::default();
    decoder.feed(truncated, &mut collect)?;
    let err = decoder.finish(TrailingBytes::Report).unwrap_err();
    assert!(matches!(err, StreamError::Truncated { .. }));
    assert_eq!(err.code(), 422);

    let mut decoder = StreamingDecoder::new(NodeKind::Hierarchy);
    let mut collect = Collect::default();
    decoder.feed(truncated, &mut collect)?;
    let summary = decoder.finish(TrailingBytes::Discard)?;
    assert_eq!(summary.nodes, scene.hierarchy.len() - 1);
    assert_eq!(decoder.state(), DecoderState::Drained);

    // feeding a drained decoder is ignored
    assert_eq!(decoder.feed(&hierarchy, &mut collect)?, 0);
    Ok(())
}

#[test]
fn negative_count_is_malformed() {
    let mut bytes = 1u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&7u64.to_le_bytes());
    bytes.extend_from_slice(&UNDEFINED_ID.to_le_bytes());
    bytes.extend_from_slice(&UNDEFINED_ID.to_le_bytes());
    bytes.extend_from_slice(&(-1i32).to_le_bytes());

    let mut decoder = StreamingDecoder::new(NodeKind::Hierarchy);
    let err = decoder.feed(&bytes, &mut Collect::default()).unwrap_err();
    assert_eq!(err.code(), 400);
    match err {
        StreamError::Malformed { offset, .. } => assert_eq!(offset, 4),
        other => panic!("unexpected error {other:?}"),
    }
}

fn reader(kind: NodeKind, compression: StreamCompression) -> NodeStreamReader {
    NodeStreamReader::new(
        kind,
        compression,
        DecoderSettings {
            read_chunk_size: 7,
            batch_bound: 2,
            ..Default::default()
        },
    )
}

#[test]
fn threaded_reader_inflates_compressed_sources() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [_, _, metadata] = scene.streams()?;

    let mut collect = Collect::default();
    let summary = reader(NodeKind::Metadata, StreamCompression::Compressed)
        .run(Cursor::new(compress(&metadata)?), &mut collect)?;

    assert_eq!(summary.version, Some(1));
    assert_eq!(summary.bytes, metadata.len());
    assert_eq!(
        collect.nodes,
        scene.metadata.iter().cloned().map(AnyNode::from).collect::<Vec<_>>()
    );
    assert!(collect.error_codes.is_empty());
    Ok(())
}

#[test]
fn reader_reports_errors_through_the_handler() {
    let mut collect = Collect::default();
    let err = reader(NodeKind::Geometry, StreamCompression::Compressed)
        .run(Cursor::new(b"definitely not a zlib stream".to_vec()), &mut collect)
        .unwrap_err();
    assert!(matches!(err, StreamError::Decompression { .. }));
    assert_eq!(collect.error_codes, vec![500]);

    let mut collect = Collect::default();
    let err = reader(NodeKind::Geometry, StreamCompression::Uncompressed)
        .run(Cursor::new(vec![1u8, 0]), &mut collect)
        .unwrap_err();
    assert!(matches!(err, StreamError::MissingHeader { .. }));
    assert_eq!(collect.error_codes, vec![422]);
    assert!(collect.versions.is_empty());
}

#[test]
fn zero_batch_bound_still_drains() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [hierarchy, _, _] = scene.streams()?;

    let mut collect = Collect::default();
    let summary = NodeStreamReader::new(
        NodeKind::Hierarchy,
        StreamCompression::Uncompressed,
        DecoderSettings {
            read_chunk_size: 5,
            batch_bound: 0,
            ..Default::default()
        },
    )
    .run(Cursor::new(hierarchy), &mut collect)?;

    assert_eq!(summary.nodes, scene.hierarchy.len());
    assert_eq!(collect.nodes.len(), scene.hierarchy.len());
    Ok(())
}

struct CountingSource {
    inner: Cursor<Vec<u8>>,
    read: Arc<AtomicUsize>,
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.read.fetch_add(read, Ordering::SeqCst);
        Ok(read)
    }
}

/// Stalls on the first node and remembers how far the source got in the meantime.
struct SlowStart {
    read: Arc<AtomicUsize>,
    read_after_stall: Option<usize>,
    nodes: usize,
}

impl NodeStreamHandler for SlowStart {
    fn on_node(&mut self, _node: AnyNode) {
        if self.nodes == 0 {
            thread::sleep(Duration::from_millis(200));
            self.read_after_stall = Some(self.read.load(Ordering::SeqCst));
        }
        self.nodes += 1;
    }
}

#[test]
fn slow_handler_holds_back_the_source() -> Result<(), anyhow::Error> {
    let nodes = (0..500).map(|id| metadata(id, "filler")).collect::<Vec<_>>();
    let bytes = encode_stream(&nodes)?;
    let total = bytes.len();

    let read = Arc::new(AtomicUsize::new(0));
    let mut handler = SlowStart {
        read: read.clone(),
        read_after_stall: None,
        nodes: 0,
    };
    let summary = NodeStreamReader::new(
        NodeKind::Metadata,
        StreamCompression::Uncompressed,
        DecoderSettings {
            read_chunk_size: 16,
            batch_bound: 1,
            ..Default::default()
        },
    )
    .run(
        CountingSource {
            inner: Cursor::new(bytes),
            read: read.clone(),
        },
        &mut handler,
    )?;

    assert_eq!(summary.nodes, nodes.len());
    assert_eq!(read.load(Ordering::SeqCst), total);
    // the source waited for the stalled consumer instead of running ahead to the end
    let read_after_stall = handler.read_after_stall.unwrap();
    assert!(read_after_stall < total / 10, "{read_after_stall} of {total} bytes read during the stall");
    Ok(())
}
