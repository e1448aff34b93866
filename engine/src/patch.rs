//! Sparse field-level updates.
//!
//! A [`Patch`] maps field names to new JSON values. [`PatchApplier`] checks
//! it against an [`EntitySchema`] and produces a new entity with the
//! changes merged in; fields absent from the patch are left untouched.
//!
//! # Algorithm
//!
//! 1. Reject an empty patch
//! 2. Collect every structurally invalid key (identifier, read-only, unknown)
//!    and reject them together
//! 3. Clone the entity and coerce/assign each remaining value in key order,
//!    stopping at the first type mismatch

use crate::error::{FieldViolation, Result, ValidationError, ViolationKind};
use crate::schema::{json_type_name, EntitySchema, FieldDescriptor, FieldRole};
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A mapping from field name to new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Map<String, Value>);

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style method to set a field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field, returning the previous value for it.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse a patch from a JSON value, which must be an object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Validation(ValidationError::NotAnObject(
                json_type_name(&other).to_string(),
            ))),
        }
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Patch {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Patch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// What to do with patch keys that name no declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Fail the patch, listing every unknown key (default)
    #[default]
    Reject,
    /// Drop unknown keys silently
    Ignore,
}

/// Merges patches onto entities of type `E`.
#[derive(Debug)]
pub struct PatchApplier<E> {
    schema: Arc<EntitySchema<E>>,
    unknown_fields: UnknownFieldPolicy,
}

impl<E> Clone for PatchApplier<E> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            unknown_fields: self.unknown_fields,
        }
    }
}

impl<E: Clone> PatchApplier<E> {
    /// Create an applier that rejects unknown fields.
    pub fn new(schema: Arc<EntitySchema<E>>) -> Self {
        Self {
            schema,
            unknown_fields: UnknownFieldPolicy::Reject,
        }
    }

    /// Builder-style method to set the unknown-field policy.
    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn schema(&self) -> &Arc<EntitySchema<E>> {
        &self.schema
    }

    pub fn unknown_fields(&self) -> UnknownFieldPolicy {
        self.unknown_fields
    }

    /// Validate the structure of `patch` without touching any entity.
    ///
    /// Returns the descriptors to assign, paired with their raw values, in
    /// [`Patch::iter`] order. A patch left with nothing to assign once
    /// ignored keys are dropped is [`ValidationError::EmptyPatch`].
    pub fn check<'p>(&self, patch: &'p Patch) -> Result<Vec<(&FieldDescriptor<E>, &'p Value)>> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }

        let mut violations = Vec::new();
        let mut assignments = Vec::with_capacity(patch.len());

        for (name, value) in patch.iter() {
            match self.schema.field(name) {
                Some(field) => match field.role() {
                    FieldRole::Identifier => {
                        violations.push(FieldViolation::new(name, ViolationKind::Identifier))
                    }
                    FieldRole::Version => {
                        violations.push(FieldViolation::new(name, ViolationKind::ReadOnly))
                    }
                    FieldRole::Attribute => assignments.push((field, value)),
                },
                None if self.unknown_fields == UnknownFieldPolicy::Ignore => {}
                None => violations.push(FieldViolation::new(name, ViolationKind::Unknown)),
            }
        }

        if !violations.is_empty() {
            return Err(ValidationError::Fields(violations).into());
        }
        // every key was an ignored unknown field
        if assignments.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }

        Ok(assignments)
    }

    /// Apply `patch` to a copy of `entity`.
    ///
    /// `entity` is never modified, so on error the caller still holds the
    /// pre-image.
    pub fn apply(&self, entity: &E, patch: &Patch) -> Result<E> {
        let assignments = self.check(patch)?;

        let mut merged = entity.clone();
        for (field, value) in assignments {
            field.assign(&mut merged, value)?;
        }

        Ok(merged)
    }
}
