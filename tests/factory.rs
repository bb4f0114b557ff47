mod common;

use common::{BufferOutputs, Scene, assemble, shape};
use scenex::content::AssetContent;
use scenex::content::container::ContainerError;
use scenex::factory::{AssetFactory, FactoryError};
use scenex::io::bundle::StreamSources;
use scenex::io::compression::{StreamCompression, compress};
use scenex::io::node_stream::StreamError;
use scenex::io::sink::{OutputProvider, SinkError};
use scenex::render::mesh_codec::PackedMeshCodec;
use scenex::settings::{AssemblerSettings, DecoderSettings, EncodeOptions};
use scenex_files::common::types::NodeId;
use scenex_files::container::ContainerFormat;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn sources(streams: [Vec<u8>; 3]) -> StreamSources<Cursor<Vec<u8>>, Cursor<Vec<u8>>, Cursor<Vec<u8>>> {
    let [hierarchy, geometry, metadata] = streams;
    StreamSources {
        hierarchy: Cursor::new(hierarchy),
        geometry: Cursor::new(geometry),
        metadata: Cursor::new(metadata),
    }
}

#[test]
fn converts_compressed_streams_into_every_format() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [hierarchy, geometry, metadata] = scene.streams()?;
    let compressed = [compress(&hierarchy)?, compress(&geometry)?, compress(&metadata)?];

    let single = BufferOutputs::default();
    let split = BufferOutputs::default();
    let outputs = BTreeMap::from([
        (ContainerFormat::Hgm, single.provider()),
        (ContainerFormat::Gs, split.provider()),
    ]);

    let content = AssetFactory::default().convert(sources(compressed), StreamCompression::Compressed, &outputs)?;
    let expected = assemble(scene.nodes())?;
    assert_eq!(shape(&content), shape(&expected));

    let decoded = AssetContent::decode(&single.get(None).unwrap())?;
    assert_eq!(shape(&decoded), shape(&expected));
    assert_eq!(split.len(), scene.geometry.len());
    Ok(())
}

#[test]
fn build_reports_stream_failures_next_to_the_graph() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [hierarchy, geometry, mut metadata] = scene.streams()?;
    metadata.truncate(metadata.len() - 2);

    let assembled = AssetFactory::default().build(
        sources([hierarchy, geometry, metadata]),
        StreamCompression::Uncompressed,
    )?;

    assert_eq!(assembled.summaries.len(), 2);
    assert_eq!(assembled.stream_errors.len(), 1);
    assert!(matches!(assembled.stream_errors[0], StreamError::Truncated { .. }));

    // the last metadata node never arrived, everything else did
    let content = assembled.content;
    assert_eq!(content.root().unwrap().id, 1);
    assert!(content.metadata().get(20).unwrap().is_declared());
    assert!(!content.metadata().get(21).unwrap().is_declared());
    Ok(())
}

#[test]
fn convert_writes_nothing_after_a_stream_failure() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let [mut hierarchy, geometry, metadata] = scene.streams()?;
    // a negative part count right after the first record's ids
    hierarchy[28..32].copy_from_slice(&(-5i32).to_le_bytes());

    let outputs = BufferOutputs::default();
    let err = AssetFactory::default()
        .convert(
            sources([hierarchy, geometry, metadata]),
            StreamCompression::Uncompressed,
            &BTreeMap::from([(ContainerFormat::Hg, outputs.provider())]),
        )
        .err()
        .expect("conversion should fail");

    match err {
        FactoryError::Streams(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].code(), 400);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(outputs.len(), 0);
    Ok(())
}

#[test]
fn convert_requires_outputs() -> Result<(), anyhow::Error> {
    let err = AssetFactory::default()
        .convert(sources(Scene::new().streams()?), StreamCompression::Uncompressed, &BTreeMap::new())
        .err()
        .expect("conversion should fail");
    assert!(matches!(err, FactoryError::NoOutputs));
    Ok(())
}

#[test]
fn failing_format_does_not_stop_the_others() -> Result<(), anyhow::Error> {
    let scene = Scene::new();
    let good = BufferOutputs::default();
    let bad = BufferOutputs::default();

    let err = AssetFactory::default()
        .convert(
            sources(scene.streams()?),
            StreamCompression::Uncompressed,
            &BTreeMap::from([
                (ContainerFormat::H, good.provider()),
                (ContainerFormat::Gs, bad.provider_failing_for(12)),
            ]),
        )
        .err()
        .expect("conversion should fail");

    match err {
        FactoryError::Encode(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, ContainerFormat::Gs);
            assert_eq!(failures[0].1.failures[0].geometry, Some(12));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(good.get(None).is_some());
    assert_eq!(bad.len(), 2);
    Ok(())
}

#[test]
fn fail_fast_skips_outputs_after_another_format_failed() -> Result<(), anyhow::Error> {
    let content = assemble(Scene::new().nodes())?;
    let (asked, wait_for_split) = crossbeam_channel::bounded(1);

    // the hierarchy output fails once the first geometry output has started, which then takes its time
    let split = BufferOutputs::default();
    let split_provider = split.provider();
    let gs: OutputProvider = Arc::new(move |geometry: Option<NodeId>| {
        if geometry == Some(10) {
            let _ = asked.send(());
            thread::sleep(Duration::from_millis(200));
        }
        split_provider(geometry)
    });
    let h: OutputProvider = Arc::new(move |_: Option<NodeId>| {
        let _ = wait_for_split.recv_timeout(Duration::from_secs(5));
        Err(SinkError::Unavailable("hierarchy".to_string()))
    });

    let factory = AssetFactory::new(
        Arc::new(PackedMeshCodec),
        DecoderSettings::default(),
        AssemblerSettings::default(),
        EncodeOptions {
            fail_fast: true,
            output_threads: 1,
        },
    );
    let err = factory
        .encode_all(&content, &BTreeMap::from([(ContainerFormat::H, h), (ContainerFormat::Gs, gs)]))
        .unwrap_err();

    let failures = match err {
        FactoryError::Encode(failures) => failures,
        other => panic!("unexpected error {other:?}"),
    };
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0, ContainerFormat::H);
    assert!(matches!(failures[0].1.failures[0].error, ContainerError::Sink(_)));

    // geometry 10 had already started and completed, the others were skipped
    assert_eq!(failures[1].0, ContainerFormat::Gs);
    let skipped = &failures[1].1.failures;
    assert_eq!(skipped.iter().map(|failure| failure.geometry).collect::<Vec<_>>(), vec![Some(11), Some(12)]);
    assert!(skipped.iter().all(|failure| matches!(failure.error, ContainerError::Skipped)));
    assert_eq!(split.len(), 1);
    assert!(AssetContent::decode(&split.get(Some(10)).unwrap())?.geometries().get(10).is_some());
    Ok(())
}
