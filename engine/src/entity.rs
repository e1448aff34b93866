//! The contract every persisted entity satisfies.

use crate::{EntitySchema, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Bounds required of an entity identifier.
pub trait EntityId:
    Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EntityId for T where
    T: Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A record type the engine can create, patch and delete.
///
/// Implementors expose identity and (optionally) a version counter; every
/// other field is reached through the descriptor table returned by
/// [`EntityModel::schema`].
///
/// ```rust
/// use crudkit_engine::{EntityModel, EntitySchema, FieldDescriptor, FieldType};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Tag {
///     id: Option<u64>,
///     label: String,
/// }
///
/// impl EntityModel for Tag {
///     type Id = u64;
///
///     fn id(&self) -> Option<&u64> {
///         self.id.as_ref()
///     }
///
///     fn set_id(&mut self, id: u64) {
///         self.id = Some(id);
///     }
///
///     fn schema() -> EntitySchema<Self> {
///         EntitySchema::new(
///             "tag",
///             vec![
///                 FieldDescriptor::identifier("id", FieldType::Int, |t: &Tag| &t.id, |t: &mut Tag| &mut t.id),
///                 FieldDescriptor::attribute("label", FieldType::String, |t: &Tag| &t.label, |t: &mut Tag| &mut t.label),
///             ],
///         )
///         .with_natural_key(["label"])
///     }
/// }
///
/// let schema = Tag::schema();
/// assert!(schema.validate().is_ok());
/// ```
pub trait EntityModel: Clone + PartialEq + Debug + Send + Sync + Sized + 'static {
    type Id: EntityId;

    /// The identifier, or `None` before the repository assigns one.
    fn id(&self) -> Option<&Self::Id>;

    /// Assign the identifier. Repositories call this at most once, on insert.
    fn set_id(&mut self, id: Self::Id);

    /// Optimistic-lock counter, if this entity type is versioned.
    fn version(&self) -> Option<Version> {
        None
    }

    /// Repositories call this on insert and after every successful save.
    fn set_version(&mut self, _version: Version) {}

    /// Build the field-descriptor table. Evaluated once per engine or
    /// repository, never per call.
    fn schema() -> EntitySchema<Self>;
}
