//! Schema Catalog: the authoritative list of declared collections and
//! their schemas. The engine only ever consults this as an
//! existence/metadata oracle — it does not interpret schema fields itself
//! except to enumerate collection names and, during predicate evaluation,
//! look up a named field on a decoded document.

use std::collections::HashMap;

use crate::protocol::{Response, Status};

/// The type a field is declared to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
}

/// A modifier attached to a field declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Unique,
    Required,
    Indexed,
}

/// A single field's declared type and modifiers.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub modifiers: Vec<Modifier>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType, modifiers: Vec<Modifier>) -> FieldSpec {
        FieldSpec { field_type, modifiers }
    }

    pub fn has(&self, m: Modifier) -> bool {
        self.modifiers.contains(&m)
    }
}

/// A collection's schema: a mapping from field name to its declared type
/// and modifiers.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: HashMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Schema {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Field names declared `unique`. Tracked for future validation; not
    /// enforced on insert in this engine (see DESIGN.md).
    pub fn unique_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.has(Modifier::Unique))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Authoritative collection-name -> schema mapping.
///
/// Not concurrency-aware by itself: all mutation happens from the single
/// engine loop, matching the cooperative single-threaded scheduling model
/// the rest of this crate assumes.
#[derive(Debug, Default)]
pub struct Catalog {
    schemas: HashMap<String, Schema>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Declare or overwrite a collection's schema. Always succeeds.
    pub fn set(&mut self, name: &str, schema: Schema) -> Response<()> {
        self.schemas.insert(name.to_string(), schema);
        Response::ok(())
    }

    /// Update an existing collection's schema. `ERROR` if unknown.
    pub fn update(&mut self, name: &str, schema: Schema) -> Response<()> {
        if self.schemas.contains_key(name) {
            self.schemas.insert(name.to_string(), schema);
            Response::ok(())
        } else {
            Response::error()
        }
    }

    /// Remove a collection's schema. `ERROR` if unknown.
    pub fn delete(&mut self, name: &str) -> Response<()> {
        match self.schemas.remove(name) {
            Some(_) => Response::ok(()),
            None => Response::error(),
        }
    }

    pub fn get(&self, name: &str) -> Response<Schema> {
        match self.schemas.get(name) {
            Some(schema) => Response::with_status(Status::Ok, Some(schema.clone())),
            None => Response::error(),
        }
    }

    pub fn get_all(&self) -> Response<HashMap<String, Schema>> {
        Response::ok(self.schemas.clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;
