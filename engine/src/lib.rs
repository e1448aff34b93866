//! # crudkit engine
//!
//! The IO-free half of crudkit: the semantics of batch operations and
//! partial updates over an arbitrary entity type.
//!
//! This crate never talks to storage. It defines what an entity looks like,
//! how a sparse patch is validated and merged, and how per-item batch
//! outcomes are assembled. The async orchestration that drives a repository
//! lives in `crudkit-service`.
//!
//! ## Core Concepts
//!
//! ### Entities
//!
//! Any type implementing [`EntityModel`]:
//! - Typed identifier, assigned by the caller or by the repository
//! - Optional version counter for optimistic locking
//! - A precomputed [`EntitySchema`] of [`FieldDescriptor`]s
//!
//! ### Patches
//!
//! A [`Patch`] maps field names to JSON values. [`PatchApplier`] rejects
//! empty patches and every identifier, read-only or unknown key in one
//! error, then coerces each value to its declared [`FieldType`].
//!
//! ### Batches
//!
//! Batch calls are best-effort. Each item yields an [`Outcome`]; a
//! [`BatchResult`] partitions them into succeeded, skipped and failed,
//! preserving input order within each partition.
//!
//! ## Quick Start
//!
//! ```rust
//! use crudkit_engine::{
//!     EntityModel, EntitySchema, FieldDescriptor, FieldType, Patch, PatchApplier,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct User {
//!     id: Option<u64>,
//!     name: String,
//!     age: i64,
//! }
//!
//! impl EntityModel for User {
//!     type Id = u64;
//!
//!     fn id(&self) -> Option<&u64> {
//!         self.id.as_ref()
//!     }
//!
//!     fn set_id(&mut self, id: u64) {
//!         self.id = Some(id);
//!     }
//!
//!     fn schema() -> EntitySchema<Self> {
//!         EntitySchema::new(
//!             "user",
//!             vec![
//!                 FieldDescriptor::identifier("id", FieldType::Int, |u: &User| &u.id, |u: &mut User| &mut u.id),
//!                 FieldDescriptor::attribute("name", FieldType::String, |u: &User| &u.name, |u: &mut User| &mut u.name),
//!                 FieldDescriptor::attribute("age", FieldType::Int, |u: &User| &u.age, |u: &mut User| &mut u.age),
//!             ],
//!         )
//!     }
//! }
//!
//! let applier = PatchApplier::new(Arc::new(User::schema()));
//! let user = User { id: Some(5), name: "Alice".into(), age: 30 };
//!
//! let older = applier.apply(&user, &Patch::new().set("age", 31)).unwrap();
//! assert_eq!(older.age, 31);
//! assert_eq!(user.age, 30);
//!
//! assert!(applier.apply(&user, &Patch::new().set("age", "thirty")).is_err());
//! ```

pub mod batch;
pub mod entity;
pub mod error;
pub mod patch;
pub mod query;
pub mod schema;

// Re-export main types at crate root
pub use batch::{BatchResult, Entry, Failure, Outcome};
pub use entity::{EntityId, EntityModel};
pub use error::{Error, ErrorKind, FieldViolation, Result, ValidationError, ViolationKind};
pub use patch::{Patch, PatchApplier, UnknownFieldPolicy};
pub use query::{Direction, Order, Page, PageRequest, Sort};
pub use schema::{EntitySchema, FieldDescriptor, FieldRole, FieldType, UniqueKey, UniquenessRule};

/// Optimistic-lock counter.
pub type Version = u64;
