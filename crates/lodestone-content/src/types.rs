use crate::error::{ContentError, ContentResult};
use crate::graph::{ContentGraph, ContentValue};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Names a decodable type and carries its default value, which is what
/// decoding an empty buffer produces.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    default: ContentGraph,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, default: ContentGraph) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }

    /// Describes a serde type, taking its `Default` as the default value.
    pub fn of<T: Serialize + Default>(name: impl Into<String>) -> ContentResult<Self> {
        let json = serde_json::to_value(T::default())?;
        Ok(Self::new(name, ContentGraph::from_json(&json)?))
    }

    pub fn default_value(&self) -> ContentGraph {
        self.default.clone()
    }
}

#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let builtins = [
            ("null", ContentValue::Null),
            ("bool", ContentValue::Bool(false)),
            ("int", ContentValue::Int(0)),
            ("float", ContentValue::Float(0.0)),
            ("string", ContentValue::String(String::new())),
            ("list", ContentValue::List(Vec::new())),
        ];
        for (name, value) in builtins {
            registry.register(TypeDescriptor::new(name, ContentGraph::from_value(value)));
        }
        registry
    }

    /// Registers a descriptor, replacing any previous one with the same name.
    pub fn register(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.types
            .write()
            .insert(descriptor.name.clone(), descriptor.clone());
        descriptor
    }

    pub fn resolve(&self, name: &str) -> ContentResult<Arc<TypeDescriptor>> {
        self.types
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContentError::UnknownType(name.to_string()))
    }
}
