//! Field-descriptor schemas.
//!
//! An [`EntitySchema`] is built once per entity type and describes every
//! field the patch applier and repositories may touch: its name, declared
//! type, role and a typed getter/setter pair. Patches are resolved against
//! this table instead of reflecting over the entity on every call.

use crate::{error::Result, Error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// Epoch milliseconds
    Timestamp,
    /// Arbitrary nested JSON
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

impl FieldType {
    /// Coerce a JSON value into this type, or `None` if it cannot be.
    ///
    /// Integral floats such as `30.0` are accepted for `Int` and `Timestamp`.
    /// Strings are never parsed into numbers or booleans.
    fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            FieldType::String => value.is_string().then(|| value.clone()),
            FieldType::Bool => value.is_boolean().then(|| value.clone()),
            FieldType::Float => value.is_number().then(|| value.clone()),
            FieldType::Int | FieldType::Timestamp => integral(value),
            FieldType::Json => Some(value.clone()),
        }
    }
}

fn integral(value: &Value) -> Option<Value> {
    let Value::Number(number) = value else {
        return None;
    };
    if number.is_i64() || number.is_u64() {
        return Some(value.clone());
    }
    let float = number.as_f64()?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
        Some(Value::from(float as i64))
    } else {
        None
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// What a field means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    /// The primary key. Exactly one per schema, never patchable.
    Identifier,
    /// Optimistic-lock counter maintained by the repository.
    Version,
    /// Ordinary patchable data.
    Attribute,
}

type Getter<E> = Box<dyn Fn(&E) -> Value + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, Value) -> serde_json::Result<()> + Send + Sync>;

/// Definition of a single field of entity type `E`.
pub struct FieldDescriptor<E> {
    name: String,
    field_type: FieldType,
    role: FieldRole,
    nullable: bool,
    get: Getter<E>,
    set: Setter<E>,
}

impl<E: 'static> FieldDescriptor<E> {
    /// Describe a patchable attribute.
    ///
    /// ```rust
    /// use crudkit_engine::{FieldDescriptor, FieldType};
    ///
    /// struct User { age: i64 }
    ///
    /// let age = FieldDescriptor::attribute("age", FieldType::Int, |u: &User| &u.age, |u: &mut User| &mut u.age);
    /// assert_eq!(age.name(), "age");
    /// assert!(!age.is_nullable());
    /// ```
    pub fn attribute<T>(
        name: impl Into<String>,
        field_type: FieldType,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self::with_role(name, field_type, FieldRole::Attribute, get, get_mut)
    }

    /// Describe the identifier field.
    pub fn identifier<T>(
        name: impl Into<String>,
        field_type: FieldType,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self::with_role(name, field_type, FieldRole::Identifier, get, get_mut)
    }

    /// Describe the optimistic-lock version field.
    pub fn version<T>(
        name: impl Into<String>,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self::with_role(name, FieldType::Int, FieldRole::Version, get, get_mut)
    }

    fn with_role<T>(
        name: impl Into<String>,
        field_type: FieldType,
        role: FieldRole,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        // Option<_> and friends accept null
        let nullable = serde_json::from_value::<T>(Value::Null).is_ok();
        Self {
            name: name.into(),
            field_type,
            role,
            nullable,
            get: Box::new(move |entity| serde_json::to_value(get(entity)).unwrap_or(Value::Null)),
            set: Box::new(move |entity, value| {
                *get_mut(entity) = serde_json::from_value(value)?;
                Ok(())
            }),
        }
    }

    /// Override the inferred nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

impl<E> FieldDescriptor<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn role(&self) -> FieldRole {
        self.role
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Read the field's current value as JSON.
    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    /// Coerce `value` to this field's declared type.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(self.mismatch(value))
            };
        }
        self.field_type
            .coerce(value)
            .ok_or_else(|| self.mismatch(value))
    }

    /// Coerce `value` and write it into `entity`.
    ///
    /// A value that passes type coercion but still fails to deserialize into
    /// the Rust field (an out-of-range integer, say) is a type mismatch too.
    pub fn assign(&self, entity: &mut E, value: &Value) -> Result<()> {
        let coerced = self.coerce(value)?;
        (self.set)(entity, coerced).map_err(|_| self.mismatch(value))
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type,
            got: json_type_name(value).to_string(),
        }
    }
}

impl<E> fmt::Debug for FieldDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("role", &self.role)
            .field("nullable", &self.nullable)
            .finish_non_exhaustive()
    }
}

/// How two entities are judged to be the same record on create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UniquenessRule {
    /// Only identifier equality counts.
    #[default]
    Identifier,
    /// Equality of all listed fields counts, in addition to identifier equality.
    NaturalKey(Vec<String>),
}

/// Canonical encoding of an entity's natural-key values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueKey(String);

impl UniqueKey {
    /// Build a key from field values in natural-key order.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(Value::Array(values).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The field-descriptor table for one entity type.
#[derive(Debug)]
pub struct EntitySchema<E> {
    entity: String,
    fields: Vec<FieldDescriptor<E>>,
    index: HashMap<String, usize>,
    uniqueness: UniquenessRule,
}

impl<E> EntitySchema<E> {
    /// Create a schema for entity `entity` with the given fields.
    pub fn new(entity: impl Into<String>, fields: Vec<FieldDescriptor<E>>) -> Self {
        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            index.entry(field.name.clone()).or_insert(position);
        }
        Self {
            entity: entity.into(),
            fields,
            index,
            uniqueness: UniquenessRule::Identifier,
        }
    }

    /// Builder-style method to declare a natural key.
    pub fn with_natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uniqueness = UniquenessRule::NaturalKey(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Check the table is usable. Called once at registration.
    pub fn validate(&self) -> Result<()> {
        if self.index.len() != self.fields.len() {
            return Err(self.invalid("duplicate field names"));
        }

        let identifiers = self.count_role(FieldRole::Identifier);
        if identifiers != 1 {
            return Err(self.invalid(format!(
                "expected exactly one identifier field, found {identifiers}"
            )));
        }
        if self.count_role(FieldRole::Version) > 1 {
            return Err(self.invalid("more than one version field"));
        }

        if let UniquenessRule::NaturalKey(names) = &self.uniqueness {
            if names.is_empty() {
                return Err(self.invalid("natural key has no fields"));
            }
            for name in names {
                match self.field(name) {
                    None => {
                        return Err(self.invalid(format!("natural key field '{name}' is not declared")))
                    }
                    Some(field) if field.role != FieldRole::Attribute => {
                        return Err(self.invalid(format!(
                            "natural key field '{name}' must be an attribute"
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }

    fn count_role(&self, role: FieldRole) -> usize {
        self.fields.iter().filter(|f| f.role == role).count()
    }

    fn invalid(&self, reason: impl fmt::Display) -> Error {
        Error::InvalidSchema(format!("{}: {reason}", self.entity))
    }

    /// Entity type name, used in log lines and error messages.
    pub fn name(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[FieldDescriptor<E>] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<E>> {
        self.index.get(name).map(|&position| &self.fields[position])
    }

    pub fn identifier(&self) -> Option<&FieldDescriptor<E>> {
        self.fields.iter().find(|f| f.role == FieldRole::Identifier)
    }

    pub fn uniqueness(&self) -> &UniquenessRule {
        &self.uniqueness
    }

    /// Natural-key value of `entity`, or `None` under [`UniquenessRule::Identifier`].
    pub fn unique_key(&self, entity: &E) -> Option<UniqueKey> {
        match &self.uniqueness {
            UniquenessRule::Identifier => None,
            UniquenessRule::NaturalKey(names) => {
                let values = names
                    .iter()
                    .map(|name| self.field(name).map_or(Value::Null, |f| f.get(entity)))
                    .collect();
                Some(UniqueKey::from_values(values))
            }
        }
    }
}
