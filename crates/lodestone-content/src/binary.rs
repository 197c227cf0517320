//! Packed binary codec.
//!
//! Stream layout: a four byte header followed by one tagged value. Objects are
//! numbered in the order they are first written; any later reference to the
//! same object is written as a reuse tag carrying that number, which keeps
//! shared references shared and lets cycles round-trip.

use crate::error::{ContentError, ContentResult};
use crate::graph::{
    AttachedReference, ContentGraph, ContentObject, ContentValue, NodeId, MAX_DEPTH,
};
use crate::ContentSerializer;
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;

pub(crate) const HEADER: &[u8; 4] = b"LDC\x01";

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_BYTES: u8 = 0x06;
const TAG_LIST: u8 = 0x07;
const TAG_OBJECT: u8 = 0x08;
const TAG_REUSE: u8 = 0x09;
const TAG_ATTACHED: u8 = 0x0a;

/// How objects carrying an [`AttachedReference`] are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttachedReferenceMode {
    /// Write only the identifier; decoding yields a field-less proxy object.
    #[default]
    AsSerializableVersion,
    /// Write `null` in place of the object.
    AsNull,
    /// Write the full object, identifier included.
    Clone,
}

#[derive(Clone, Debug, Default)]
pub struct BinarySerializer {
    attached: AttachedReferenceMode,
}

impl BinarySerializer {
    pub fn new(attached: AttachedReferenceMode) -> Self {
        Self { attached }
    }

    pub fn attached_mode(&self) -> AttachedReferenceMode {
        self.attached
    }
}

impl ContentSerializer for BinarySerializer {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode(&self, graph: &ContentGraph) -> ContentResult<Vec<u8>> {
        let mut writer = Writer {
            graph,
            mode: self.attached,
            out: BytesMut::with_capacity(64),
            written: HashMap::new(),
        };
        writer.out.put_slice(HEADER);
        writer.write_value(graph.root(), 0)?;
        Ok(writer.out.to_vec())
    }

    fn decode_graph(&self, bytes: &[u8]) -> ContentResult<ContentGraph> {
        if bytes.len() < HEADER.len() || &bytes[..HEADER.len()] != HEADER {
            return Err(ContentError::BadHeader);
        }
        let mut reader = Reader {
            buf: &bytes[HEADER.len()..],
            graph: ContentGraph::new(),
            objects: Vec::new(),
        };
        let root = reader.read_value(0)?;
        if reader.buf.has_remaining() {
            return Err(ContentError::TrailingBytes(reader.buf.remaining()));
        }
        reader.graph.set_root(root);
        Ok(reader.graph)
    }
}

struct Writer<'a> {
    graph: &'a ContentGraph,
    mode: AttachedReferenceMode,
    out: BytesMut,
    written: HashMap<NodeId, u32>,
}

impl Writer<'_> {
    fn write_value(&mut self, value: &ContentValue, depth: usize) -> ContentResult<()> {
        if depth > MAX_DEPTH {
            return Err(ContentError::TooDeep(MAX_DEPTH));
        }
        match value {
            ContentValue::Null => self.out.put_u8(TAG_NULL),
            ContentValue::Bool(false) => self.out.put_u8(TAG_FALSE),
            ContentValue::Bool(true) => self.out.put_u8(TAG_TRUE),
            ContentValue::Int(i) => {
                self.out.put_u8(TAG_INT);
                self.out.put_i64_le(*i);
            }
            ContentValue::Float(f) => {
                self.out.put_u8(TAG_FLOAT);
                self.out.put_f64_le(*f);
            }
            ContentValue::String(s) => {
                self.out.put_u8(TAG_STRING);
                self.write_str(s);
            }
            ContentValue::Bytes(bytes) => {
                self.out.put_u8(TAG_BYTES);
                self.out.put_u32_le(bytes.len() as u32);
                self.out.put_slice(bytes);
            }
            ContentValue::List(items) => {
                self.out.put_u8(TAG_LIST);
                self.out.put_u32_le(items.len() as u32);
                for item in items {
                    self.write_value(item, depth + 1)?;
                }
            }
            ContentValue::Object(id) => self.write_object(*id, depth)?,
        }
        Ok(())
    }

    fn write_object(&mut self, id: NodeId, depth: usize) -> ContentResult<()> {
        if let Some(index) = self.written.get(&id) {
            self.out.put_u8(TAG_REUSE);
            self.out.put_u32_le(*index);
            return Ok(());
        }
        let object = self.graph.check_node(id)?;
        if let Some(attached) = &object.attached {
            match self.mode {
                AttachedReferenceMode::AsNull => {
                    self.out.put_u8(TAG_NULL);
                    return Ok(());
                }
                AttachedReferenceMode::AsSerializableVersion => {
                    self.remember(id);
                    self.out.put_u8(TAG_ATTACHED);
                    self.write_str(&object.type_name);
                    self.write_str(&attached.id);
                    self.write_str(&attached.url);
                    return Ok(());
                }
                AttachedReferenceMode::Clone => {}
            }
        }
        self.remember(id);
        self.out.put_u8(TAG_OBJECT);
        self.write_str(&object.type_name);
        match &object.attached {
            Some(attached) => {
                self.out.put_u8(1);
                self.write_str(&attached.id);
                self.write_str(&attached.url);
            }
            None => self.out.put_u8(0),
        }
        self.out.put_u32_le(object.fields.len() as u32);
        for (name, field) in &object.fields {
            self.write_str(name);
            self.write_value(field, depth + 1)?;
        }
        Ok(())
    }

    fn remember(&mut self, id: NodeId) {
        let index = self.written.len() as u32;
        self.written.insert(id, index);
    }

    fn write_str(&mut self, s: &str) {
        self.out.put_u32_le(s.len() as u32);
        self.out.put_slice(s.as_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    graph: ContentGraph,
    objects: Vec<NodeId>,
}

impl Reader<'_> {
    fn need(&self, len: usize) -> ContentResult<()> {
        if self.buf.remaining() < len {
            return Err(ContentError::UnexpectedEof {
                needed: len - self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn read_u8(&mut self) -> ContentResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_u32(&mut self) -> ContentResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn read_bytes(&mut self) -> ContentResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.need(len)?;
        let bytes = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(bytes)
    }

    fn read_string(&mut self) -> ContentResult<String> {
        Ok(String::from_utf8(self.read_bytes()?)?)
    }

    fn read_value(&mut self, depth: usize) -> ContentResult<ContentValue> {
        if depth > MAX_DEPTH {
            return Err(ContentError::TooDeep(MAX_DEPTH));
        }
        let tag = self.read_u8()?;
        Ok(match tag {
            TAG_NULL => ContentValue::Null,
            TAG_FALSE => ContentValue::Bool(false),
            TAG_TRUE => ContentValue::Bool(true),
            TAG_INT => {
                self.need(8)?;
                ContentValue::Int(self.buf.get_i64_le())
            }
            TAG_FLOAT => {
                self.need(8)?;
                ContentValue::Float(self.buf.get_f64_le())
            }
            TAG_STRING => ContentValue::String(self.read_string()?),
            TAG_BYTES => ContentValue::Bytes(self.read_bytes()?),
            TAG_LIST => {
                let len = self.read_u32()? as usize;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.read_value(depth + 1)?);
                }
                ContentValue::List(items)
            }
            TAG_OBJECT => {
                let type_name = self.read_string()?;
                let attached = match self.read_u8()? {
                    0 => None,
                    _ => Some(AttachedReference::new(self.read_string()?, self.read_string()?)),
                };
                // Register before reading fields so that back references resolve.
                let id = self.graph.add_object(ContentObject {
                    type_name,
                    attached,
                    ..Default::default()
                });
                self.objects.push(id);
                let count = self.read_u32()?;
                for _ in 0..count {
                    let name = self.read_string()?;
                    let value = self.read_value(depth + 1)?;
                    self.graph.set_field(id, name, value);
                }
                ContentValue::Object(id)
            }
            TAG_REUSE => {
                let index = self.read_u32()?;
                let id = self
                    .objects
                    .get(index as usize)
                    .copied()
                    .ok_or(ContentError::DanglingReference(index))?;
                ContentValue::Object(id)
            }
            TAG_ATTACHED => {
                let type_name = self.read_string()?;
                let reference = AttachedReference::new(self.read_string()?, self.read_string()?);
                let id = self
                    .graph
                    .add_object(ContentObject::new(type_name).attached_to(reference));
                self.objects.push(id);
                ContentValue::Object(id)
            }
            other => return Err(ContentError::UnknownTag(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texture_graph() -> (ContentGraph, NodeId) {
        let mut graph = ContentGraph::new();
        let texture = graph.add_object(
            ContentObject::new("Texture")
                .with_field("width", 512i64)
                .attached_to(AttachedReference::new("6f1c", "textures/ground")),
        );
        let material = graph.add_object(ContentObject::new("Material").with_field("albedo", texture));
        graph.set_root(material);
        (graph, texture)
    }

    #[test]
    fn attached_objects_are_written_as_identifiers() -> eyre::Result<()> {
        let (graph, _) = texture_graph();
        let codec = BinarySerializer::default();
        let decoded = codec.decode_graph(&codec.encode(&graph)?)?;

        let ContentValue::Object(root) = decoded.root() else {
            panic!("root should be an object");
        };
        let ContentValue::Object(albedo) = &decoded.check_node(*root)?.fields["albedo"] else {
            panic!("albedo should be an object");
        };
        let proxy = decoded.check_node(*albedo)?;
        assert_eq!(proxy.type_name, "Texture");
        assert!(proxy.fields.is_empty());
        assert_eq!(proxy.attached, Some(AttachedReference::new("6f1c", "textures/ground")));
        Ok(())
    }

    #[test]
    fn attached_objects_can_be_cloned_or_nulled() -> eyre::Result<()> {
        let (graph, _) = texture_graph();

        let clone = BinarySerializer::new(AttachedReferenceMode::Clone);
        assert_eq!(clone.decode_graph(&clone.encode(&graph)?)?, graph);

        let null = BinarySerializer::new(AttachedReferenceMode::AsNull);
        let decoded = null.decode_graph(&null.encode(&graph)?)?;
        let ContentValue::Object(root) = decoded.root() else {
            panic!("root should be an object");
        };
        assert_eq!(decoded.check_node(*root)?.fields["albedo"], ContentValue::Null);
        Ok(())
    }

    #[test]
    fn shared_objects_are_written_once() -> eyre::Result<()> {
        let mut graph = ContentGraph::new();
        let shared = graph.add_object(ContentObject::new("Mesh").with_field("vertices", 3i64));
        let root = graph.add_object(
            ContentObject::new("Model")
                .with_field("lod0", shared)
                .with_field("lod1", shared),
        );
        graph.set_root(root);

        let codec = BinarySerializer::default();
        let decoded = codec.decode_graph(&codec.encode(&graph)?)?;
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded, graph);
        Ok(())
    }

    #[test]
    fn truncated_and_foreign_streams_are_rejected() -> eyre::Result<()> {
        let (graph, _) = texture_graph();
        let codec = BinarySerializer::new(AttachedReferenceMode::Clone);
        let bytes = codec.encode(&graph)?;

        assert!(matches!(
            codec.decode_graph(&bytes[..bytes.len() - 3]),
            Err(ContentError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            codec.decode_graph(b"{\"json\": true}"),
            Err(ContentError::BadHeader)
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            codec.decode_graph(&trailing),
            Err(ContentError::TrailingBytes(1))
        ));
        Ok(())
    }
}
