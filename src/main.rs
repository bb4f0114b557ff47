use anyhow::Context;
use clap::Parser;
use scenex::content::AssetContent;
use scenex::factory::AssetFactory;
use scenex::io::bundle::InputBundle;
use scenex::io::sink::{OutputProvider, OutputSink};
use scenex::render::mesh_codec::PackedMeshCodec;
use scenex::settings::{CliArgs, EncodeOptions, OperationMode};
use scenex_files::common::types::NodeId;
use scenex_files::container::ContainerFormat;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    match &args.operation_mode {
        OperationMode::Convert {
            input,
            output_dir,
            fail_fast,
            ..
        } => convert(&args, input, output_dir, *fail_fast),
        OperationMode::Inspect { container } => inspect(container),
    }
}

fn convert(args: &CliArgs, input: &Path, output_dir: &Path, fail_fast: bool) -> anyhow::Result<()> {
    let bundle = InputBundle::locate(input).with_context(|| format!("locating the bundle {}", input.display()))?;
    let sources = bundle.open()?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating the output directory {}", output_dir.display()))?;

    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset".to_string());

    let outputs = args
        .formats()
        .into_iter()
        .map(|format| (format, file_provider(output_dir.to_path_buf(), stem.clone(), format)))
        .collect::<BTreeMap<_, _>>();

    let factory = AssetFactory::new(
        Arc::new(PackedMeshCodec),
        args.decoder_settings(),
        args.assembler_settings(),
        EncodeOptions {
            fail_fast,
            ..Default::default()
        },
    );

    let content = factory.convert(sources, bundle.compression, &outputs)?;
    log::info!("Converted {}: {:?}", input.display(), content.stats());
    Ok(())
}

/// `<stem>.<format>` for single containers, `<stem>.<geometry id>.<format>` for split ones.
fn file_provider(output_dir: PathBuf, stem: String, format: ContainerFormat) -> OutputProvider {
    Arc::new(move |geometry: Option<NodeId>| {
        let file_name = match geometry {
            None => format!("{stem}.{format}"),
            Some(id) => format!("{stem}.{id:016x}.{format}"),
        };
        let path = output_dir.join(file_name);
        log::debug!("Writing {}", path.display());
        OutputSink::create_file(&path)
    })
}

fn inspect(container: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(container).with_context(|| format!("reading {}", container.display()))?;
    let content = AssetContent::new();
    let format = content.decode_into(&bytes)?;
    let stats = content.stats();

    println!("{}: {format} container", container.display());
    println!("  hierarchy nodes: {}", stats.hierarchy_nodes);
    println!("  geometry nodes:  {}", stats.geometry_nodes);
    println!("  metadata nodes:  {}", stats.metadata_nodes);
    match stats.root {
        Some(root) => println!("  root: {root:#x}, depth {}", stats.depth),
        None => println!("  no root"),
    }
    Ok(())
}
