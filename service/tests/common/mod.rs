//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use crudkit_engine::{
    EntityModel, EntitySchema, FieldDescriptor, FieldType, Page, PageRequest, Sort, UniqueKey,
};
use crudkit_service::{MemoryRepository, RepoResult, Repository, RepositoryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// ========== Person: integer ids, identifier uniqueness ==========

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    pub age: i64,
    pub email: Option<String>,
    pub version: u64,
}

impl Person {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            age,
            email: None,
            version: 0,
        }
    }

    pub fn with_id(id: i64, name: &str, age: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(name, age)
        }
    }
}

impl EntityModel for Person {
    type Id = i64;

    fn id(&self) -> Option<&i64> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn version(&self) -> Option<u64> {
        Some(self.version)
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn schema() -> EntitySchema<Self> {
        EntitySchema::new(
            "person",
            vec![
                FieldDescriptor::identifier("id", FieldType::Int, |p: &Person| &p.id, |p: &mut Person| &mut p.id),
                FieldDescriptor::attribute("name", FieldType::String, |p: &Person| &p.name, |p: &mut Person| &mut p.name),
                FieldDescriptor::attribute("age", FieldType::Int, |p: &Person| &p.age, |p: &mut Person| &mut p.age),
                FieldDescriptor::attribute("email", FieldType::String, |p: &Person| &p.email, |p: &mut Person| &mut p.email),
                FieldDescriptor::version("version", |p: &Person| &p.version, |p: &mut Person| &mut p.version),
            ],
        )
    }
}

pub fn people() -> MemoryRepository<Person> {
    MemoryRepository::new().with_id_generator(|seq| seq as i64)
}

// ========== Account: UUID ids, unique email ==========

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Option<Uuid>,
    pub email: String,
    pub balance: i64,
}

impl Account {
    pub fn new(email: &str, balance: i64) -> Self {
        Self {
            id: None,
            email: email.into(),
            balance,
        }
    }
}

impl EntityModel for Account {
    type Id = Uuid;

    fn id(&self) -> Option<&Uuid> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn schema() -> EntitySchema<Self> {
        EntitySchema::new(
            "account",
            vec![
                FieldDescriptor::identifier("id", FieldType::String, |a: &Account| &a.id, |a: &mut Account| &mut a.id),
                FieldDescriptor::attribute("email", FieldType::String, |a: &Account| &a.email, |a: &mut Account| &mut a.email),
                FieldDescriptor::attribute("balance", FieldType::Int, |a: &Account| &a.balance, |a: &mut Account| &mut a.balance),
            ],
        )
        .with_natural_key(["email"])
    }
}

pub fn accounts() -> MemoryRepository<Account> {
    MemoryRepository::new().with_id_generator(|_| Uuid::new_v4())
}

// ========== Fault injection ==========

/// Failure injected for a specific id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Backend,
    Timeout,
    Cancelled,
}

/// Wraps a [`MemoryRepository`] with per-id faults and delays.
///
/// Faults and delays apply to `insert` (for entities that carry an id),
/// `find_by_id` and `delete_by_id`.
pub struct FaultyRepository<E: EntityModel> {
    inner: MemoryRepository<E>,
    faults: HashMap<E::Id, Fault>,
    delays: HashMap<E::Id, Duration>,
    stale_saves: bool,
    blind: bool,
    saves: AtomicUsize,
    finished: Mutex<Vec<E::Id>>,
}

impl<E: EntityModel> FaultyRepository<E> {
    pub fn new(inner: MemoryRepository<E>) -> Self {
        Self {
            inner,
            faults: HashMap::new(),
            delays: HashMap::new(),
            stale_saves: false,
            blind: false,
            saves: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(mut self, id: E::Id, fault: Fault) -> Self {
        self.faults.insert(id, fault);
        self
    }

    pub fn delay(mut self, id: E::Id, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    /// Report every save as a lost optimistic-lock race.
    pub fn stale_saves(mut self) -> Self {
        self.stale_saves = true;
        self
    }

    /// Answer every existence check with `false`, so duplicates only
    /// surface as insert-time constraint violations.
    pub fn blind(mut self) -> Self {
        self.blind = true;
        self
    }

    pub fn inner(&self) -> &MemoryRepository<E> {
        &self.inner
    }

    /// Number of `save` calls that reached the repository.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Ids in the order their delayed calls completed.
    pub fn finished(&self) -> Vec<E::Id> {
        self.finished.lock().unwrap().clone()
    }

    async fn intercept(&self, id: Option<&E::Id>) -> RepoResult<()> {
        let Some(id) = id else {
            return Ok(());
        };
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
            self.finished.lock().unwrap().push(id.clone());
        }
        match self.faults.get(id) {
            Some(Fault::Backend) => Err(RepositoryError::Backend(format!("injected failure for {id}"))),
            Some(Fault::Timeout) => Err(RepositoryError::Timeout(format!("call for {id}"))),
            Some(Fault::Cancelled) => Err(RepositoryError::Cancelled),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<E: EntityModel> Repository<E> for FaultyRepository<E> {
    async fn insert(&self, entity: E, key: Option<UniqueKey>) -> RepoResult<E> {
        self.intercept(entity.id()).await?;
        self.inner.insert(entity, key).await
    }

    async fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        self.intercept(Some(id)).await?;
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        self.inner.find_all(sort).await
    }

    async fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        self.inner.find_page(request).await
    }

    async fn save(&self, entity: E, key: Option<UniqueKey>) -> RepoResult<E> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.stale_saves {
            if let (Some(id), Some(version)) = (entity.id(), entity.version()) {
                return Err(RepositoryError::Conflict {
                    id: id.to_string(),
                    expected: version,
                    actual: version + 1,
                });
            }
        }
        self.inner.save(entity, key).await
    }

    async fn delete_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        self.intercept(Some(id)).await?;
        self.inner.delete_by_id(id).await
    }

    async fn count(&self) -> RepoResult<u64> {
        self.inner.count().await
    }

    async fn exists_by_id(&self, id: &E::Id) -> RepoResult<bool> {
        if self.blind {
            return Ok(false);
        }
        self.inner.exists_by_id(id).await
    }

    async fn exists_by_key(&self, key: &UniqueKey) -> RepoResult<bool> {
        if self.blind {
            return Ok(false);
        }
        self.inner.exists_by_key(key).await
    }
}
