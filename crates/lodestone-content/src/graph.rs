//! In-memory content graphs.
//!
//! Objects live in an arena owned by [`ContentGraph`] and values point at them
//! through [`NodeId`], so shared references and reference cycles are plain
//! indices instead of owning pointers.

use crate::error::{ContentError, ContentResult};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};

/// Key carrying an object's type name in the structured (JSON) form.
pub const TYPE_KEY: &str = "$type";
/// Key carrying an object's attached reference in the structured (JSON) form.
pub const ATTACHED_KEY: &str = "$attached";
/// Key wrapping a hex-encoded byte buffer in the structured (JSON) form.
pub const BYTES_KEY: &str = "$bytes";

/// Deepest value nesting either codec reads or writes.
pub const MAX_DEPTH: usize = 512;

fn is_reserved(key: &str) -> bool {
    key == TYPE_KEY || key == ATTACHED_KEY || key == BYTES_KEY
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Lightweight by-identifier reference to content stored elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttachedReference {
    pub id: String,
    pub url: String,
}

impl AttachedReference {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<ContentValue>),
    Object(NodeId),
}

impl From<&str> for ContentValue {
    fn from(value: &str) -> Self {
        ContentValue::String(value.to_string())
    }
}

impl From<String> for ContentValue {
    fn from(value: String) -> Self {
        ContentValue::String(value)
    }
}

impl From<i64> for ContentValue {
    fn from(value: i64) -> Self {
        ContentValue::Int(value)
    }
}

impl From<bool> for ContentValue {
    fn from(value: bool) -> Self {
        ContentValue::Bool(value)
    }
}

impl From<NodeId> for ContentValue {
    fn from(value: NodeId) -> Self {
        ContentValue::Object(value)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContentObject {
    pub type_name: String,
    pub fields: BTreeMap<String, ContentValue>,
    /// Set when this object stands for content identified elsewhere.
    pub attached: Option<AttachedReference>,
}

impl ContentObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<ContentValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn attached_to(mut self, reference: AttachedReference) -> Self {
        self.attached = Some(reference);
        self
    }
}

/// An object graph rooted at a single value.
///
/// Equality is structural and starts at the root: two graphs are equal when
/// walking both from their roots visits equal values. Node numbering and
/// unreachable nodes do not matter.
#[derive(Clone, Debug)]
pub struct ContentGraph {
    nodes: Vec<ContentObject>,
    root: ContentValue,
}

impl Default for ContentGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: ContentValue::Null,
        }
    }

    pub fn from_value(root: ContentValue) -> Self {
        Self {
            nodes: Vec::new(),
            root,
        }
    }

    pub fn root(&self) -> &ContentValue {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<ContentValue>) {
        self.root = root.into();
    }

    pub fn add_object(&mut self, object: ContentObject) -> NodeId {
        self.nodes.push(object);
        NodeId(self.nodes.len() - 1)
    }

    pub fn object(&self, id: NodeId) -> Option<&ContentObject> {
        self.nodes.get(id.0)
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut ContentObject> {
        self.nodes.get_mut(id.0)
    }

    /// Sets a field on an existing object. Returns false for an unknown node.
    pub fn set_field(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<ContentValue>,
    ) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(object) => {
                object.fields.insert(name.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Builds a graph from structured JSON. Every JSON object becomes its own
    /// node, so the result is always a tree.
    pub fn from_json(value: &Value) -> ContentResult<Self> {
        let mut graph = ContentGraph::new();
        let root = graph.import_json(value, 0)?;
        graph.root = root;
        Ok(graph)
    }

    fn import_json(&mut self, value: &Value, depth: usize) -> ContentResult<ContentValue> {
        if depth > MAX_DEPTH {
            return Err(ContentError::TooDeep(MAX_DEPTH));
        }
        Ok(match value {
            Value::Null => ContentValue::Null,
            Value::Bool(b) => ContentValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ContentValue::Int(i),
                None => ContentValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ContentValue::String(s.clone()),
            Value::Array(items) => ContentValue::List(
                items
                    .iter()
                    .map(|item| self.import_json(item, depth + 1))
                    .collect::<ContentResult<_>>()?,
            ),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(encoded)) = map.get(BYTES_KEY) {
                        return Ok(ContentValue::Bytes(hex::decode(encoded)?));
                    }
                }
                let mut object = ContentObject::default();
                if let Some(Value::String(type_name)) = map.get(TYPE_KEY) {
                    object.type_name = type_name.clone();
                }
                if let Some(Value::Object(attached)) = map.get(ATTACHED_KEY) {
                    let field = |key: &str| {
                        attached
                            .get(key)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };
                    object.attached = Some(AttachedReference::new(field("id"), field("url")));
                }
                // Reserve the slot first so node numbering follows pre-order.
                let id = self.add_object(ContentObject::default());
                for (key, value) in map {
                    if key == TYPE_KEY || key == ATTACHED_KEY {
                        continue;
                    }
                    if key == BYTES_KEY {
                        return Err(ContentError::ReservedField(key.clone()));
                    }
                    let value = self.import_json(value, depth + 1)?;
                    object.fields.insert(key.clone(), value);
                }
                self.nodes[id.0] = object;
                ContentValue::Object(id)
            }
        })
    }

    /// Renders the graph as structured JSON. A reference back to an object
    /// that is still being written becomes `null` instead of being followed;
    /// objects shared without forming a cycle are written once per reference.
    ///
    /// Fails on nesting deeper than [`MAX_DEPTH`] and on field names that
    /// collide with the reserved `$` keys.
    pub fn to_json(&self) -> ContentResult<Value> {
        let mut on_path = HashSet::new();
        self.export_json(&self.root, 0, &mut on_path)
    }

    fn export_json(
        &self,
        value: &ContentValue,
        depth: usize,
        on_path: &mut HashSet<usize>,
    ) -> ContentResult<Value> {
        if depth > MAX_DEPTH {
            return Err(ContentError::TooDeep(MAX_DEPTH));
        }
        Ok(match value {
            ContentValue::Null => Value::Null,
            ContentValue::Bool(b) => Value::Bool(*b),
            ContentValue::Int(i) => Value::Number((*i).into()),
            ContentValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            ContentValue::String(s) => Value::String(s.clone()),
            ContentValue::Bytes(bytes) => {
                let mut map = Map::new();
                map.insert(BYTES_KEY.to_string(), Value::String(hex::encode(bytes)));
                Value::Object(map)
            }
            ContentValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.export_json(item, depth + 1, on_path))
                    .collect::<ContentResult<_>>()?,
            ),
            ContentValue::Object(id) => {
                let Some(object) = self.object(*id) else {
                    return Ok(Value::Null);
                };
                if !on_path.insert(id.0) {
                    return Ok(Value::Null);
                }
                let mut map = Map::new();
                if !object.type_name.is_empty() {
                    map.insert(TYPE_KEY.to_string(), Value::String(object.type_name.clone()));
                }
                if let Some(attached) = &object.attached {
                    let mut reference = Map::new();
                    reference.insert("id".to_string(), Value::String(attached.id.clone()));
                    reference.insert("url".to_string(), Value::String(attached.url.clone()));
                    map.insert(ATTACHED_KEY.to_string(), Value::Object(reference));
                }
                for (key, field) in &object.fields {
                    if is_reserved(key) {
                        return Err(ContentError::ReservedField(key.clone()));
                    }
                    map.insert(key.clone(), self.export_json(field, depth + 1, on_path)?);
                }
                on_path.remove(&id.0);
                Value::Object(map)
            }
        })
    }

    /// Returns true when following object references from the root can reach
    /// an object that is already on the current path.
    pub fn has_cycle(&self) -> bool {
        fn visit(
            graph: &ContentGraph,
            value: &ContentValue,
            on_path: &mut HashSet<usize>,
            done: &mut HashSet<usize>,
        ) -> bool {
            match value {
                ContentValue::List(items) => items
                    .iter()
                    .any(|item| visit(graph, item, on_path, done)),
                ContentValue::Object(id) => {
                    if on_path.contains(&id.0) {
                        return true;
                    }
                    if done.contains(&id.0) {
                        return false;
                    }
                    let Some(object) = graph.object(*id) else {
                        return false;
                    };
                    on_path.insert(id.0);
                    let found = object
                        .fields
                        .values()
                        .any(|field| visit(graph, field, on_path, done));
                    on_path.remove(&id.0);
                    done.insert(id.0);
                    found
                }
                _ => false,
            }
        }
        visit(self, &self.root, &mut HashSet::new(), &mut HashSet::new())
    }

    pub(crate) fn check_node(&self, id: NodeId) -> ContentResult<&ContentObject> {
        self.object(id)
            .ok_or(ContentError::DanglingReference(id.0 as u32))
    }

    fn values_eq(
        &self,
        left: &ContentValue,
        other: &ContentGraph,
        right: &ContentValue,
        assumed: &mut HashSet<(usize, usize)>,
    ) -> bool {
        match (left, right) {
            (ContentValue::List(a), ContentValue::List(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| self.values_eq(x, other, y, assumed))
            }
            (ContentValue::Object(a), ContentValue::Object(b)) => {
                if !assumed.insert((a.0, b.0)) {
                    return true;
                }
                match (self.object(*a), other.object(*b)) {
                    (Some(x), Some(y)) => {
                        x.type_name == y.type_name
                            && x.attached == y.attached
                            && x.fields.len() == y.fields.len()
                            && x.fields.iter().zip(&y.fields).all(|((ka, va), (kb, vb))| {
                                ka == kb && self.values_eq(va, other, vb, assumed)
                            })
                    }
                    (None, None) => true,
                    _ => false,
                }
            }
            (a, b) => a == b,
        }
    }
}

impl PartialEq for ContentGraph {
    fn eq(&self, other: &Self) -> bool {
        self.values_eq(&self.root, other, &other.root, &mut HashSet::new())
    }
}
