use crate::error::{ContentError, ContentResult};
use crate::graph::{ContentGraph, MAX_DEPTH};
use crate::ContentSerializer;
use serde::Deserialize;

/// Structured text codec on top of JSON.
///
/// Cycles cannot be expressed in this form: a reference back to an object that
/// is still being written is emitted as `null`. Shared objects are duplicated.
#[derive(Clone, Debug, Default)]
pub struct TextSerializer {
    pretty: bool,
}

impl TextSerializer {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn pretty() -> Self {
        Self::new(true)
    }
}

impl ContentSerializer for TextSerializer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn encode(&self, graph: &ContentGraph) -> ContentResult<Vec<u8>> {
        let json = graph.to_json()?;
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&json)?
        } else {
            serde_json::to_vec(&json)?
        };
        Ok(bytes)
    }

    fn decode_graph(&self, bytes: &[u8]) -> ContentResult<ContentGraph> {
        // A bytes wrapper adds one structural level below the deepest value.
        if nesting_depth(bytes) > MAX_DEPTH + 1 {
            return Err(ContentError::TooDeep(MAX_DEPTH));
        }
        let mut de = serde_json::Deserializer::from_slice(bytes);
        de.disable_recursion_limit();
        let json = serde_json::Value::deserialize(&mut de)?;
        de.end()?;
        ContentGraph::from_json(&json)
    }
}

/// Deepest bracket nesting in a JSON document, ignoring brackets inside strings.
fn nesting_depth(bytes: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for &byte in bytes {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}
