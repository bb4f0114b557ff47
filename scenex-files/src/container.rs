use crate::ParserError;
use crate::common::reader::{Parseable, read_count, read_counted_array, read_sized_bytes};
use crate::common::types::{NodeId, Rgb8, Transform34};
use crate::common::writer::{Writable, write_count, write_counted_array, write_sized_bytes};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use scenex_files_derive_parseable::{Emit, Parse};
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::str::FromStr;

/// Selects which sections a serialized asset contains. The tag is the first byte of every container.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ContainerFormat {
    /// Geometry, metadata and hierarchy.
    Hgm = 1,
    /// Geometry and hierarchy.
    Hg = 2,
    /// Hierarchy only.
    H = 3,
    /// One container per geometry node.
    Gs = 4,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 4] = [
        ContainerFormat::Hgm,
        ContainerFormat::Hg,
        ContainerFormat::H,
        ContainerFormat::Gs,
    ];

    pub fn from_tag(tag: u8) -> Result<ContainerFormat, ParserError> {
        ContainerFormat::try_from(tag).map_err(|_| ParserError::UnknownContainerFormat(tag))
    }

    pub fn tag(&self) -> u8 {
        (*self).into()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Hgm => "hgm",
            ContainerFormat::Hg => "hg",
            ContainerFormat::H => "h",
            ContainerFormat::Gs => "gs",
        }
    }

    pub fn has_geometry(&self) -> bool {
        matches!(self, ContainerFormat::Hgm | ContainerFormat::Hg | ContainerFormat::Gs)
    }

    pub fn has_metadata(&self) -> bool {
        matches!(self, ContainerFormat::Hgm)
    }

    pub fn has_hierarchy(&self) -> bool {
        !self.is_split()
    }

    /// Split formats produce one output per geometry node instead of a single payload.
    pub fn is_split(&self) -> bool {
        matches!(self, ContainerFormat::Gs)
    }
}

impl Display for ContainerFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContainerFormat {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContainerFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or(ParserError::FormatError {
                reason: "Unknown container format name",
            })
    }
}

/// One entry of the geometry or metadata section: the node id and its opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadEntry {
    pub id: NodeId,
    pub bytes: Vec<u8>,
}

impl Parseable<PayloadEntry> for PayloadEntry {
    fn parse<R: Read>(rdr: &mut R) -> Result<PayloadEntry, ParserError> {
        Ok(PayloadEntry {
            id: NodeId::parse(rdr)?,
            bytes: read_sized_bytes(rdr, "payload")?,
        })
    }
}

impl Writable for PayloadEntry {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        self.id.write(w)?;
        write_sized_bytes(w, &self.bytes, "payload")
    }
}

pub fn read_section<R: Read>(rdr: &mut R) -> Result<Vec<PayloadEntry>, ParserError> {
    read_counted_array(rdr, "section entries")
}

pub fn write_section<W: Write>(w: &mut W, entries: &[PayloadEntry]) -> Result<(), ParserError> {
    write_counted_array(w, entries, "section entries")
}

/// A geometry placement with its transform already composed.
#[derive(Debug, Copy, Clone, PartialEq, Parse, Emit)]
pub struct PlacedPart {
    pub geometry_id: NodeId,
    pub transform: Transform34,
    pub color: Rgb8,
}

/// One record of the pre-order hierarchy dump. `child_count` records follow it, each with their own subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyEntry {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub metadata_id: NodeId,
    pub parts: Vec<PlacedPart>,
    pub child_count: usize,
}

impl Parseable<HierarchyEntry> for HierarchyEntry {
    fn parse<R: Read>(rdr: &mut R) -> Result<HierarchyEntry, ParserError> {
        Ok(HierarchyEntry {
            id: NodeId::parse(rdr)?,
            parent_id: NodeId::parse(rdr)?,
            metadata_id: NodeId::parse(rdr)?,
            parts: read_counted_array(rdr, "placed parts")?,
            child_count: read_count(rdr, "children")?,
        })
    }
}

impl Writable for HierarchyEntry {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        self.id.write(w)?;
        self.parent_id.write(w)?;
        self.metadata_id.write(w)?;
        write_counted_array(w, &self.parts, "placed parts")?;
        write_count(w, self.child_count, "children")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn tags_match_wire_values() -> Result<(), anyhow::Error> {
        assert_eq!(ContainerFormat::from_tag(1)?, ContainerFormat::Hgm);
        assert_eq!(ContainerFormat::from_tag(2)?, ContainerFormat::Hg);
        assert_eq!(ContainerFormat::from_tag(3)?, ContainerFormat::H);
        assert_eq!(ContainerFormat::from_tag(4)?, ContainerFormat::Gs);
        assert!(matches!(
            ContainerFormat::from_tag(0),
            Err(ParserError::UnknownContainerFormat(0))
        ));
        Ok(())
    }

    #[test]
    pub fn names_parse_case_insensitive() -> Result<(), anyhow::Error> {
        assert_eq!("HGM".parse::<ContainerFormat>()?, ContainerFormat::Hgm);
        assert_eq!("gs".parse::<ContainerFormat>()?, ContainerFormat::Gs);
        assert!("xyz".parse::<ContainerFormat>().is_err());
        Ok(())
    }

    #[test]
    pub fn hierarchy_entry_layout() -> Result<(), anyhow::Error> {
        let entry = HierarchyEntry {
            id: 1,
            parent_id: crate::common::types::UNDEFINED_ID,
            metadata_id: 2,
            parts: vec![PlacedPart {
                geometry_id: 3,
                transform: Transform34::default(),
                color: Rgb8::WHITE,
            }],
            child_count: 2,
        };

        let mut bytes = Vec::new();
        entry.write(&mut bytes)?;
        // three ids, part count, one part (id, 12 floats, color), child count
        assert_eq!(bytes.len(), 24 + 4 + (8 + 48 + 3) + 4);
        assert_eq!(HierarchyEntry::parse(&mut std::io::Cursor::new(bytes))?, entry);
        Ok(())
    }
}
