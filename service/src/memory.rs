//! In-memory repository.
//!
//! Thread-safe and can be shared across engines via `Arc`. Records live in a
//! [`DashMap`] keyed by id, with a second map indexing natural keys to every
//! id that holds them. Exclusive claims go through the map's entry API before
//! the record itself is inserted, so two concurrent inserts with the same key
//! cannot both win. Entities stored without a claim still join the index, so
//! later exclusive claims see them.

use crate::repository::{RepoResult, Repository, RepositoryError};
use async_trait::async_trait;
use crudkit_engine::{
    Direction, EntityModel, EntitySchema, Page, PageRequest, Sort, UniqueKey,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

type IdGenerator<Id> = Box<dyn Fn(u64) -> Id + Send + Sync>;

/// A stored entity plus its insertion sequence.
#[derive(Debug, Clone)]
struct Stored<E> {
    sequence: u64,
    entity: E,
}

/// Concurrent in-memory storage for entities of type `E`.
pub struct MemoryRepository<E: EntityModel> {
    schema: Arc<EntitySchema<E>>,
    records: DashMap<E::Id, Stored<E>>,
    /// Natural key -> ids holding it. Never holds an empty list.
    keys: DashMap<UniqueKey, Vec<E::Id>>,
    sequence: AtomicU64,
    id_generator: Option<IdGenerator<E::Id>>,
}

impl<E: EntityModel> MemoryRepository<E> {
    /// Create an empty repository. Entities must arrive with an id.
    pub fn new() -> Self {
        Self {
            schema: Arc::new(E::schema()),
            records: DashMap::new(),
            keys: DashMap::new(),
            sequence: AtomicU64::new(0),
            id_generator: None,
        }
    }

    /// Create an empty repository wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Builder-style method to generate ids for entities inserted without one.
    ///
    /// The generator receives a sequence number starting at 1.
    pub fn with_id_generator(mut self, generator: impl Fn(u64) -> E::Id + Send + Sync + 'static) -> Self {
        self.id_generator = Some(Box::new(generator));
        self
    }

    /// Get the number of stored entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    /// Register `id` under `key`. Returns whether this call added it.
    ///
    /// An exclusive claim fails while any other id holds the key.
    fn claim_key(&self, key: &UniqueKey, id: &E::Id, exclusive: bool) -> RepoResult<bool> {
        match self.keys.entry(key.clone()) {
            Entry::Occupied(owners) if owners.get().contains(id) => Ok(false),
            Entry::Occupied(_) if exclusive => Err(RepositoryError::ConstraintViolation(format!(
                "{} with key {key} already exists",
                self.schema.name()
            ))),
            Entry::Occupied(mut owners) => {
                owners.get_mut().push(id.clone());
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![id.clone()]);
                Ok(true)
            }
        }
    }

    fn release_key(&self, key: &UniqueKey, id: &E::Id) {
        if let Entry::Occupied(mut owners) = self.keys.entry(key.clone()) {
            owners.get_mut().retain(|owner| owner != id);
            if owners.get().is_empty() {
                owners.remove();
            }
        }
    }

    /// The key to index under, and whether the caller asked to enforce it.
    fn index_key(&self, entity: &E, key: Option<UniqueKey>) -> (Option<UniqueKey>, bool) {
        match key {
            Some(key) => (Some(key), true),
            None => (self.schema.unique_key(entity), false),
        }
    }

    fn sorted(&self, sort: &Sort) -> Vec<E> {
        let mut stored: Vec<Stored<E>> = self.records.iter().map(|r| r.value().clone()).collect();
        stored.sort_by_key(|s| s.sequence);

        if !sort.is_unsorted() {
            stored.sort_by(|a, b| self.compare(&a.entity, &b.entity, sort));
        }

        stored.into_iter().map(|s| s.entity).collect()
    }

    fn compare(&self, a: &E, b: &E, sort: &Sort) -> Ordering {
        for order in sort.orders() {
            // Unknown fields are the engine's concern; here they compare equal.
            let Some(field) = self.schema.field(&order.field) else {
                continue;
            };
            let ordering = compare_values(&field.get(a), &field.get(b));
            let ordering = match order.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl<E: EntityModel> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityModel> fmt::Debug for MemoryRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("entity", &self.schema.name())
            .field("records", &self.records.len())
            .field("keys", &self.keys.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: EntityModel> Repository<E> for MemoryRepository<E> {
    async fn insert(&self, mut entity: E, key: Option<UniqueKey>) -> RepoResult<E> {
        let sequence = self.next_sequence();
        let id = match entity.id() {
            Some(id) => id.clone(),
            None => {
                let generator = self.id_generator.as_ref().ok_or_else(|| {
                    RepositoryError::Backend(format!(
                        "{} has no id and no id generator is configured",
                        self.schema.name()
                    ))
                })?;
                let id = generator(sequence);
                entity.set_id(id.clone());
                id
            }
        };

        let (key, exclusive) = self.index_key(&entity, key);
        let claimed = match &key {
            Some(key) => self.claim_key(key, &id, exclusive)?,
            None => false,
        };

        if entity.version().is_some() {
            entity.set_version(1);
        }

        let inserted = match self.records.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Stored {
                    sequence,
                    entity: entity.clone(),
                });
                true
            }
        };

        if !inserted {
            if let (true, Some(key)) = (claimed, &key) {
                self.release_key(key, &id);
            }
            return Err(RepositoryError::ConstraintViolation(format!(
                "{} {id} already exists",
                self.schema.name()
            )));
        }

        tracing::trace!(entity = self.schema.name(), id = %id, "inserted");
        Ok(entity)
    }

    async fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        Ok(self.records.get(id).map(|r| r.entity.clone()))
    }

    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        Ok(self.sorted(sort))
    }

    async fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        let all = self.sorted(&request.sort);
        let total = all.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(request.size as usize)
            .collect();
        Ok(Page::new(items, request, total))
    }

    async fn save(&self, mut entity: E, key: Option<UniqueKey>) -> RepoResult<E> {
        let id = entity.id().cloned().ok_or_else(|| {
            RepositoryError::NotFound(format!("{} without id", self.schema.name()))
        })?;

        let previous_key = match self.records.get(&id) {
            Some(stored) => self.schema.unique_key(&stored.entity),
            None => return Err(RepositoryError::NotFound(id.to_string())),
        };
        let (key, exclusive) = self.index_key(&entity, key);
        let key_changed = key != previous_key;
        let claimed = match &key {
            Some(key) if key_changed => self.claim_key(key, &id, exclusive)?,
            _ => false,
        };

        let written = match self.records.get_mut(&id) {
            None => Err(RepositoryError::NotFound(id.to_string())),
            Some(mut stored) => match (entity.version(), stored.entity.version()) {
                (Some(expected), Some(actual)) if expected != actual => {
                    Err(RepositoryError::Conflict {
                        id: id.to_string(),
                        expected,
                        actual,
                    })
                }
                (Some(expected), _) => {
                    entity.set_version(expected + 1);
                    stored.entity = entity.clone();
                    Ok(())
                }
                (None, _) => {
                    stored.entity = entity.clone();
                    Ok(())
                }
            },
        };

        match written {
            Ok(()) => {
                if key_changed {
                    if let Some(previous) = &previous_key {
                        self.release_key(previous, &id);
                    }
                }
                tracing::trace!(entity = self.schema.name(), id = %id, "saved");
                Ok(entity)
            }
            Err(err) => {
                if let (true, Some(key)) = (claimed, &key) {
                    self.release_key(key, &id);
                }
                Err(err)
            }
        }
    }

    async fn delete_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        let Some((_, stored)) = self.records.remove(id) else {
            return Ok(None);
        };
        if let Some(key) = self.schema.unique_key(&stored.entity) {
            self.release_key(&key, id);
        }
        tracing::trace!(entity = self.schema.name(), id = %id, "deleted");
        Ok(Some(stored.entity))
    }

    async fn count(&self) -> RepoResult<u64> {
        Ok(self.records.len() as u64)
    }

    async fn exists_by_id(&self, id: &E::Id) -> RepoResult<bool> {
        Ok(self.records.contains_key(id))
    }

    async fn exists_by_key(&self, key: &UniqueKey) -> RepoResult<bool> {
        Ok(self.keys.contains_key(key))
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            },
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
