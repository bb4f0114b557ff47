use crate::io::compression::StreamCompression;
use log::trace;
use scenex_files::nodes::NodeKind;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

const PLAIN_EXTENSION: &str = "x3_p";
const COMPRESSED_EXTENSION: &str = "x3_c";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("unexpected bundle extension {0:?}, expected x3_p or x3_c")]
    UnexpectedExtension(String),
    #[error("unexpected bundle member {0}")]
    UnexpectedMember(PathBuf),
    #[error("the bundle has no {} member (looked for {path})", kind.name())]
    MissingMember { kind: NodeKind, path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The three node streams of one export: `<stem>.x3_p_h`, `_g` and `_m` (or `x3_c_*` when compressed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBundle {
    pub hierarchy: PathBuf,
    pub geometry: PathBuf,
    pub metadata: PathBuf,
    pub compression: StreamCompression,
}

/// The three node streams of one export, in any [`std::io::Read`] flavor.
pub struct StreamSources<H, G, M> {
    pub hierarchy: H,
    pub geometry: G,
    pub metadata: M,
}

pub type BundleSources = StreamSources<BufReader<File>, BufReader<File>, BufReader<File>>;

fn member_suffix(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Hierarchy => "_h",
        NodeKind::Geometry => "_g",
        NodeKind::Metadata => "_m",
    }
}

impl InputBundle {
    /// `path` is either the main export path (members sit next to it and share its stem) or an unpacked
    /// export directory named like the main path, holding exactly the three members.
    pub fn locate(path: &Path) -> Result<InputBundle, BundleError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let compression = match extension.as_str() {
            PLAIN_EXTENSION => StreamCompression::Uncompressed,
            COMPRESSED_EXTENSION => StreamCompression::Compressed,
            _ => return Err(BundleError::UnexpectedExtension(extension)),
        };

        let members = if path.is_dir() {
            Self::scan_directory(path, &extension)?
        } else {
            NodeKind::ALL.map(|kind| {
                let candidate = path.with_extension(format!("{extension}{}", member_suffix(kind)));
                candidate.is_file().then_some(candidate)
            })
        };

        let [hierarchy, geometry, metadata] = members;
        let require = |kind: NodeKind, member: Option<PathBuf>| {
            member.ok_or_else(|| BundleError::MissingMember {
                kind,
                path: path.with_extension(format!("{extension}{}", member_suffix(kind))),
            })
        };

        let bundle = InputBundle {
            hierarchy: require(NodeKind::Hierarchy, hierarchy)?,
            geometry: require(NodeKind::Geometry, geometry)?,
            metadata: require(NodeKind::Metadata, metadata)?,
            compression,
        };
        trace!("Located bundle {:?}", bundle);
        Ok(bundle)
    }

    fn scan_directory(path: &Path, extension: &str) -> Result<[Option<PathBuf>; 3], BundleError> {
        let mut members: [Option<PathBuf>; 3] = [None, None, None];
        for entry in std::fs::read_dir(path)? {
            let member = entry?.path();
            let member_extension = member
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            let slot = NodeKind::ALL
                .iter()
                .position(|kind| member_extension == format!("{extension}{}", member_suffix(*kind)));

            match slot {
                Some(slot) => members[slot] = Some(member),
                None => return Err(BundleError::UnexpectedMember(member)),
            }
        }
        Ok(members)
    }

    pub fn open(&self) -> Result<BundleSources, BundleError> {
        Ok(StreamSources {
            hierarchy: BufReader::new(File::open(&self.hierarchy)?),
            geometry: BufReader::new(File::open(&self.geometry)?),
            metadata: BufReader::new(File::open(&self.metadata)?),
        })
    }
}
