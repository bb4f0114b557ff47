use crate::ParserError;
use crate::common::reader::{Parseable, read_sized_bytes};
use crate::common::types::NodeId;
use crate::common::writer::{Writable, write_sized_bytes};
use crate::nodes::{NodeKind, WireNode};
use log::{error, warn};
use serde_json::{Map, Value};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataNode {
    pub id: NodeId,
    /// Always a JSON object.
    pub json: Value,
}

impl MetadataNode {
    pub fn new(id: NodeId, json: Value) -> Self {
        Self { id, json }
    }

    /// Decodes metadata text the way the producer may have mangled it: transcoding leaves NUL bytes and
    /// junk around the object. Anything that still doesn't parse degrades to an empty object.
    pub fn from_text(id: NodeId, raw: &[u8]) -> Self {
        Self {
            id,
            json: parse_tolerant(id, raw),
        }
    }
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn parse_tolerant(id: NodeId, raw: &[u8]) -> Value {
    if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(raw) {
        return value;
    }

    let cleaned = raw.iter().copied().filter(|b| *b != 0).collect::<Vec<_>>();
    let Some(window) = object_window(&cleaned) else {
        error!("Metadata {id:#x} does not contain a JSON object, substituting an empty one");
        return empty_object();
    };

    match serde_json::from_slice::<Value>(window) {
        Ok(value @ Value::Object(_)) => {
            warn!(
                "Metadata {id:#x}: recovered JSON after trimming {} surrounding bytes",
                raw.len() - window.len()
            );
            value
        }
        Ok(_) => {
            error!("Metadata {id:#x} is not a JSON object, substituting an empty one");
            empty_object()
        }
        Err(err) => {
            error!("Metadata {id:#x} failed to parse ({err}), substituting an empty one");
            empty_object()
        }
    }
}

/// From the first `{"` (or `{` when there is none) to the last `}`.
fn object_window(text: &[u8]) -> Option<&[u8]> {
    let start = text
        .windows(2)
        .position(|pair| pair == b"{\"")
        .or_else(|| text.iter().position(|b| *b == b'{'))?;
    let end = text.iter().rposition(|b| *b == b'}')?;
    (end > start).then(|| &text[start..=end])
}

impl WireNode for MetadataNode {
    const KIND: NodeKind = NodeKind::Metadata;

    fn id(&self) -> NodeId {
        self.id
    }

    fn read<R: Read>(rdr: &mut R) -> Result<Self, ParserError> {
        let id = NodeId::parse(rdr)?;
        let raw = read_sized_bytes(rdr, "metadata text")?;
        Ok(MetadataNode::from_text(id, &raw))
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        let text = serde_json::to_vec(&self.json)?;
        self.id.write(w)?;
        write_sized_bytes(w, &text, "metadata text")
    }
}
