//! Content serialization for lodestone.
//!
//! Two codecs share one contract: the packed [`BinarySerializer`] preserves
//! shared references and cycles, the [`TextSerializer`] writes structured JSON
//! and drops back-edges. Decoding an empty buffer always yields the default
//! value of the requested type.

pub mod binary;
pub mod error;
pub mod graph;
pub mod text;
pub mod types;

pub use binary::{AttachedReferenceMode, BinarySerializer};
pub use error::{ContentError, ContentResult};
pub use graph::{
    AttachedReference, ContentGraph, ContentObject, ContentValue, NodeId, MAX_DEPTH,
};
pub use text::TextSerializer;
pub use types::{TypeDescriptor, TypeRegistry};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub trait ContentSerializer: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, graph: &ContentGraph) -> ContentResult<Vec<u8>>;

    /// Decodes a non-empty buffer into a graph.
    fn decode_graph(&self, bytes: &[u8]) -> ContentResult<ContentGraph>;

    /// Decodes a buffer as `ty`. An empty buffer yields the type's default.
    fn decode(&self, bytes: &[u8], ty: &TypeDescriptor) -> ContentResult<ContentGraph> {
        if bytes.is_empty() {
            return Ok(ty.default_value());
        }
        self.decode_graph(bytes)
    }
}

/// Encodes any serde value through the codec.
pub fn encode_value<T: Serialize + ?Sized>(
    codec: &dyn ContentSerializer,
    value: &T,
) -> ContentResult<Vec<u8>> {
    let json = serde_json::to_value(value)?;
    codec.encode(&ContentGraph::from_json(&json)?)
}

/// Decodes a serde value through the codec. An empty buffer yields
/// `T::default()`.
pub fn decode_value<T: DeserializeOwned + Default>(
    codec: &dyn ContentSerializer,
    bytes: &[u8],
) -> ContentResult<T> {
    if bytes.is_empty() {
        return Ok(T::default());
    }
    let graph = codec.decode_graph(bytes)?;
    Ok(serde_json::from_value(graph.to_json()?)?)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Binary,
    Text,
}

impl Codec {
    pub fn serializer(self) -> Box<dyn ContentSerializer> {
        match self {
            Codec::Binary => Box::new(BinarySerializer::default()),
            Codec::Text => Box::new(TextSerializer::pretty()),
        }
    }

    /// Guesses the codec of an encoded buffer from its leading bytes.
    pub fn detect(bytes: &[u8]) -> Codec {
        if bytes.starts_with(binary::HEADER) {
            Codec::Binary
        } else {
            Codec::Text
        }
    }
}

impl FromStr for Codec {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "bin" => Ok(Codec::Binary),
            "text" | "json" => Ok(Codec::Text),
            other => Err(ContentError::UnknownCodec(other.to_string())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Binary => f.write_str("binary"),
            Codec::Text => f.write_str("text"),
        }
    }
}
