//! The storage collaborator contract.
//!
//! A [`Repository`] persists, queries, sorts and pages entities. The engine
//! never holds entity copies between calls; every operation round-trips
//! through one of these methods.

use async_trait::async_trait;
use crudkit_engine::{EntityModel, Error, Page, PageRequest, Sort, UniqueKey, Version};
use std::sync::Arc;

/// Errors reported by a repository.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    /// An identifier or natural key is already taken.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The stored version moved since the entity was read.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: Version,
        actual: Version,
    },

    /// The record to save no longer exists.
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for repository calls.
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConstraintViolation(reason) => Error::DuplicateEntity(reason),
            conflict @ RepositoryError::Conflict { .. } => Error::Conflict(conflict.to_string()),
            RepositoryError::NotFound(id) => Error::NotFound(id),
            RepositoryError::Timeout(what) => Error::Timeout(what),
            RepositoryError::Cancelled => Error::Cancelled,
            RepositoryError::Backend(reason) => Error::Storage(reason),
        }
    }
}

/// Storage collaborator for entities of type `E`.
///
/// Implementations apply their own timeout policy and report it as
/// [`RepositoryError::Timeout`].
#[async_trait]
pub trait Repository<E: EntityModel>: Send + Sync {
    /// Insert a new entity, assigning an id if it has none.
    ///
    /// Must atomically reject an id that is already stored, and a `key`
    /// already held by another entity, with
    /// [`RepositoryError::ConstraintViolation`]. With no `key`, the entity's
    /// natural key is still recorded so that [`exists_by_key`] and later
    /// claims see it, but it may be shared.
    ///
    /// [`exists_by_key`]: Repository::exists_by_key
    async fn insert(&self, entity: E, key: Option<UniqueKey>) -> RepoResult<E>;

    async fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>>;

    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<E>>;

    async fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>>;

    /// Overwrite a stored entity.
    ///
    /// Versioned entities are compared against the stored version and
    /// rejected with [`RepositoryError::Conflict`] when they differ. `key` is
    /// the entity's natural key after the change.
    async fn save(&self, entity: E, key: Option<UniqueKey>) -> RepoResult<E>;

    /// Remove an entity, returning it as it was just before removal.
    async fn delete_by_id(&self, id: &E::Id) -> RepoResult<Option<E>>;

    async fn count(&self) -> RepoResult<u64>;

    async fn exists_by_id(&self, id: &E::Id) -> RepoResult<bool>;

    /// Whether any stored entity holds natural key `key`.
    async fn exists_by_key(&self, key: &UniqueKey) -> RepoResult<bool>;
}

#[async_trait]
impl<E, R> Repository<E> for Arc<R>
where
    E: EntityModel,
    R: Repository<E> + ?Sized,
{
    async fn insert(&self, entity: E, key: Option<UniqueKey>) -> RepoResult<E> {
        (**self).insert(entity, key).await
    }

    async fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        (**self).find_by_id(id).await
    }

    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        (**self).find_all(sort).await
    }

    async fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        (**self).find_page(request).await
    }

    async fn save(&self, entity: E, key: Option<UniqueKey>) -> RepoResult<E> {
        (**self).save(entity, key).await
    }

    async fn delete_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        (**self).delete_by_id(id).await
    }

    async fn count(&self) -> RepoResult<u64> {
        (**self).count().await
    }

    async fn exists_by_id(&self, id: &E::Id) -> RepoResult<bool> {
        (**self).exists_by_id(id).await
    }

    async fn exists_by_key(&self, key: &UniqueKey) -> RepoResult<bool> {
        (**self).exists_by_key(key).await
    }
}
