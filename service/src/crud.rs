//! The CRUD engine.
//!
//! [`CrudEngine`] drives a [`Repository`] through single-item and batch
//! operations. Single-item calls fail with one [`Error`]; batch calls are
//! best-effort and report every item in a [`BatchResult`].

use crate::config::EngineConfig;
use crate::repository::{Repository, RepositoryError};
use crudkit_engine::{
    BatchResult, EntityModel, EntitySchema, Error, ErrorKind, FieldViolation, Outcome, Page,
    PageRequest, Patch, PatchApplier, Result, Sort, UniqueKey, ValidationError, ViolationKind,
};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What `create_batch` does with an item that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnDuplicate {
    /// Report the item in `failed` with [`Error::DuplicateEntity`].
    #[default]
    Fail,
    /// Report the item in `skipped`.
    Skip,
}

/// Batch result of `create_batch`: inputs are entities.
pub type CreateBatch<E> = BatchResult<E, E>;

/// Batch result of `delete_batch`: inputs are ids.
pub type DeleteBatch<E> = BatchResult<E, <E as EntityModel>::Id>;

/// Batch result of `update_batch`: inputs are id/patch pairs.
pub type UpdateBatch<E> = BatchResult<E, (<E as EntityModel>::Id, Patch)>;

/// Batch and partial-update operations over one entity type.
pub struct CrudEngine<E: EntityModel, R> {
    repository: R,
    schema: Arc<EntitySchema<E>>,
    applier: PatchApplier<E>,
    config: EngineConfig,
}

impl<E, R> CrudEngine<E, R>
where
    E: EntityModel,
    R: Repository<E>,
{
    /// Create an engine with default configuration.
    pub fn new(repository: R) -> Result<Self> {
        Self::with_config(repository, EngineConfig::default())
    }

    /// Create an engine, validating the entity schema once up front.
    pub fn with_config(repository: R, config: EngineConfig) -> Result<Self> {
        let schema = E::schema();
        schema.validate()?;
        let schema = Arc::new(schema);
        let applier =
            PatchApplier::new(Arc::clone(&schema)).with_unknown_fields(config.unknown_fields);

        tracing::debug!(
            entity = schema.name(),
            fields = schema.fields().len(),
            batch_concurrency = config.batch_concurrency,
            "engine ready"
        );

        Ok(Self {
            repository,
            schema,
            applier,
            config,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn schema(&self) -> &EntitySchema<E> {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========== Single-item operations ==========

    /// Persist a new entity.
    ///
    /// Fails with [`Error::DuplicateEntity`] when the id or natural key is
    /// already stored.
    pub async fn create(&self, entity: E) -> Result<E> {
        let key = self.schema.unique_key(&entity);
        if let Some(reason) = self.find_duplicate(&entity, key.as_ref()).await? {
            return Err(Error::DuplicateEntity(reason));
        }
        Ok(self.repository.insert(entity, key).await?)
    }

    /// Persist a new entity without the natural-key check.
    ///
    /// An id that is already stored is still a duplicate. The entity keeps
    /// its natural key taken for later [`create`](Self::create) calls until
    /// every holder of it is deleted or changed.
    pub async fn create_allowing_duplicates(&self, entity: E) -> Result<E> {
        if let Some(id) = entity.id() {
            if self.repository.exists_by_id(id).await? {
                return Err(Error::DuplicateEntity(self.describe(id)));
            }
        }
        Ok(self.repository.insert(entity, None).await?)
    }

    pub async fn find_by_id(&self, id: &E::Id) -> Result<E> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(self.describe(id)))
    }

    /// All entities in repository order.
    pub async fn find_all(&self) -> Result<Vec<E>> {
        Ok(self.repository.find_all(&Sort::unsorted()).await?)
    }

    pub async fn find_all_sorted(&self, sort: &Sort) -> Result<Vec<E>> {
        self.check_sort(sort)?;
        Ok(self.repository.find_all(sort).await?)
    }

    pub async fn find_page(&self, request: &PageRequest) -> Result<Page<E>> {
        self.check_sort(&request.sort)?;
        Ok(self.repository.find_page(request).await?)
    }

    /// Apply `patch` to the stored entity `id`.
    ///
    /// A patch that leaves the entity unchanged performs no write and
    /// returns the stored entity as is.
    pub async fn update(&self, id: &E::Id, patch: &Patch) -> Result<E> {
        let current = self.find_by_id(id).await?;
        let merged = self.applier.apply(&current, patch)?;

        if merged == current {
            tracing::debug!(entity = self.schema.name(), id = %id, "patch is a no-op, skipping write");
            return Ok(current);
        }

        let key = self.schema.unique_key(&merged);
        Ok(self.repository.save(merged, key).await?)
    }

    /// Delete `id`, returning the entity as it was just before deletion.
    pub async fn delete(&self, id: &E::Id) -> Result<E> {
        self.repository
            .delete_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(self.describe(id)))
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.repository.count().await?)
    }

    pub async fn exists_by_id(&self, id: &E::Id) -> Result<bool> {
        Ok(self.repository.exists_by_id(id).await?)
    }

    // ========== Batch operations ==========

    /// Create every entity that is not a duplicate.
    ///
    /// Inputs repeating an earlier input's id or natural key are duplicates
    /// of it. Duplicates discovered at insert time get the same treatment.
    pub async fn create_batch(
        &self,
        entities: Vec<E>,
        on_duplicate: OnDuplicate,
    ) -> Result<CreateBatch<E>> {
        self.check_batch_size(entities.len())?;

        let keys: Vec<Option<UniqueKey>> =
            entities.iter().map(|e| self.schema.unique_key(e)).collect();
        let repeats = self.repeats_within(&entities, &keys);

        let result = self
            .run_batch(entities, |index, entity| {
                let key = keys[index].clone();
                let repeat = repeats[index].clone();
                async move { self.create_item(entity, key, repeat, on_duplicate).await }
            })
            .await;

        self.log_batch("create", &result);
        Ok(result)
    }

    /// Delete every listed id; missing ids fail with [`Error::NotFound`].
    ///
    /// A repeated id, or more ids than the configured batch limit, fails the
    /// whole call with [`Error::InvalidBatch`] before anything is deleted, so
    /// no per-item result is produced.
    pub async fn delete_batch(&self, ids: Vec<E::Id>) -> Result<DeleteBatch<E>> {
        self.check_batch_size(ids.len())?;
        self.reject_repeated_ids(ids.iter())?;

        let result = self
            .run_batch(ids, |_, id| async move {
                let deleted = self.delete(&id).await;
                match deleted {
                    Ok(entity) => Outcome::Succeeded(entity),
                    Err(err) => self.item_failed(id, err),
                }
            })
            .await;

        self.log_batch("delete", &result);
        Ok(result)
    }

    /// Apply each patch to its entity independently.
    ///
    /// Like [`delete_batch`](Self::delete_batch), a repeated id or an
    /// oversized batch fails the whole call with [`Error::InvalidBatch`].
    pub async fn update_batch(&self, updates: Vec<(E::Id, Patch)>) -> Result<UpdateBatch<E>> {
        self.check_batch_size(updates.len())?;
        self.reject_repeated_ids(updates.iter().map(|(id, _)| id))?;

        let result = self
            .run_batch(updates, |_, (id, patch)| async move {
                let updated = self.update(&id, &patch).await;
                match updated {
                    Ok(entity) => Outcome::Succeeded(entity),
                    Err(err) => self.item_failed((id, patch), err),
                }
            })
            .await;

        self.log_batch("update", &result);
        Ok(result)
    }

    // ========== Internals ==========

    /// Run `op` over every input with bounded concurrency.
    ///
    /// Items may finish in any order; outcomes are tagged with their input
    /// position and reordered before the result is built.
    async fn run_batch<I, F, Fut>(&self, inputs: Vec<I>, op: F) -> BatchResult<E, I>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = Outcome<E, I>>,
    {
        if inputs.is_empty() {
            return BatchResult::new();
        }

        let outcomes: Vec<(usize, Outcome<E, I>)> = stream::iter(inputs.into_iter().enumerate())
            .map(|(index, input)| {
                let item = op(index, input);
                async move { (index, item.await) }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        BatchResult::from_indexed(outcomes)
    }

    async fn create_item(
        &self,
        entity: E,
        key: Option<UniqueKey>,
        repeat: Option<String>,
        on_duplicate: OnDuplicate,
    ) -> Outcome<E, E> {
        let duplicate = match repeat {
            Some(reason) => Ok(Some(reason)),
            None => self.find_duplicate(&entity, key.as_ref()).await,
        };
        let duplicate = match duplicate {
            Ok(found) => found,
            Err(err) => return self.item_failed(entity, err),
        };
        if let Some(reason) = duplicate {
            return self.duplicate(entity, reason, on_duplicate);
        }

        // The existence check above can race a concurrent writer. The
        // repository's atomic insert has the final word.
        match self.repository.insert(entity.clone(), key).await {
            Ok(stored) => Outcome::Succeeded(stored),
            Err(RepositoryError::ConstraintViolation(reason)) => {
                self.duplicate(entity, reason, on_duplicate)
            }
            Err(err) => self.item_failed(entity, err.into()),
        }
    }

    fn duplicate(&self, entity: E, reason: String, on_duplicate: OnDuplicate) -> Outcome<E, E> {
        tracing::debug!(entity = self.schema.name(), reason = %reason, ?on_duplicate, "duplicate in batch");
        match on_duplicate {
            OnDuplicate::Skip => Outcome::Skipped(entity),
            OnDuplicate::Fail => Outcome::Failed(entity, Error::DuplicateEntity(reason)),
        }
    }

    fn item_failed<I>(&self, input: I, error: Error) -> Outcome<E, I> {
        match error.kind() {
            ErrorKind::Storage | ErrorKind::Timeout | ErrorKind::Cancelled => {
                tracing::warn!(entity = self.schema.name(), error = %error, "batch item failed in storage");
            }
            _ => {
                tracing::debug!(entity = self.schema.name(), error = %error, "batch item failed");
            }
        }
        Outcome::Failed(input, error)
    }

    /// Reason `entity` already exists in storage, if it does.
    async fn find_duplicate(&self, entity: &E, key: Option<&UniqueKey>) -> Result<Option<String>> {
        if let Some(id) = entity.id() {
            if self.repository.exists_by_id(id).await? {
                return Ok(Some(format!("{} already exists", self.describe(id))));
            }
        }
        if let Some(key) = key {
            if self.repository.exists_by_key(key).await? {
                return Ok(Some(format!(
                    "{} with key {key} already exists",
                    self.schema.name()
                )));
            }
        }
        Ok(None)
    }

    /// For each input, why it duplicates an earlier input of the same batch.
    fn repeats_within(&self, entities: &[E], keys: &[Option<UniqueKey>]) -> Vec<Option<String>> {
        let mut first_by_id: HashMap<&E::Id, usize> = HashMap::new();
        let mut first_by_key: HashMap<&UniqueKey, usize> = HashMap::new();

        entities
            .iter()
            .zip(keys)
            .enumerate()
            .map(|(index, (entity, key))| {
                if let Some(id) = entity.id() {
                    if let Some(first) = first_by_id.get(id) {
                        return Some(format!(
                            "{} repeats batch item {first}",
                            self.describe(id)
                        ));
                    }
                    first_by_id.insert(id, index);
                }
                if let Some(key) = key {
                    if let Some(first) = first_by_key.get(key) {
                        return Some(format!(
                            "{} with key {key} repeats batch item {first}",
                            self.schema.name()
                        ));
                    }
                    first_by_key.insert(key, index);
                }
                None
            })
            .collect()
    }

    fn check_batch_size(&self, len: usize) -> Result<()> {
        match self.config.max_batch_size {
            Some(limit) if len > limit => Err(Error::InvalidBatch(format!(
                "{len} items exceeds the limit of {limit}"
            ))),
            _ => Ok(()),
        }
    }

    fn reject_repeated_ids<'a>(&self, ids: impl Iterator<Item = &'a E::Id>) -> Result<()> {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(Error::InvalidBatch(format!(
                    "{} appears more than once",
                    self.describe(id)
                )));
            }
        }
        Ok(())
    }

    fn check_sort(&self, sort: &Sort) -> Result<()> {
        let unknown: Vec<FieldViolation> = sort
            .orders()
            .iter()
            .filter(|order| self.schema.field(&order.field).is_none())
            .map(|order| FieldViolation::new(order.field.as_str(), ViolationKind::Unknown))
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Fields(unknown).into())
        }
    }

    fn describe(&self, id: &E::Id) -> String {
        format!("{} {id}", self.schema.name())
    }

    fn log_batch<I>(&self, operation: &str, result: &BatchResult<E, I>) {
        tracing::info!(
            entity = self.schema.name(),
            operation,
            batch_size = result.len(),
            succeeded = result.success_count(),
            skipped = result.skip_count(),
            failed = result.fail_count(),
            "batch complete"
        );
    }
}

impl<E: EntityModel, R> fmt::Debug for CrudEngine<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudEngine")
            .field("entity", &self.schema.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
