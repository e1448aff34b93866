//! # crudkit service
//!
//! Async orchestration over `crudkit-engine`: the [`CrudEngine`] issues
//! repository calls for single-item and best-effort batch operations.
//!
//! ```rust
//! use crudkit_engine::{EntityModel, EntitySchema, FieldDescriptor, FieldType, Patch};
//! use crudkit_service::{CrudEngine, MemoryRepository, OnDuplicate};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Tag {
//!     id: Option<u32>,
//!     label: String,
//! }
//!
//! impl EntityModel for Tag {
//!     type Id = u32;
//!
//!     fn id(&self) -> Option<&u32> {
//!         self.id.as_ref()
//!     }
//!
//!     fn set_id(&mut self, id: u32) {
//!         self.id = Some(id);
//!     }
//!
//!     fn schema() -> EntitySchema<Self> {
//!         EntitySchema::new(
//!             "tag",
//!             vec![
//!                 FieldDescriptor::identifier("id", FieldType::Int, |t: &Tag| &t.id, |t: &mut Tag| &mut t.id),
//!                 FieldDescriptor::attribute("label", FieldType::String, |t: &Tag| &t.label, |t: &mut Tag| &mut t.label),
//!             ],
//!         )
//!         .with_natural_key(["label"])
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let repository = MemoryRepository::new().with_id_generator(|seq| seq as u32);
//! let engine = CrudEngine::new(repository).unwrap();
//!
//! let tag = |label: &str| Tag { id: None, label: label.into() };
//! let result = engine
//!     .create_batch(vec![tag("rust"), tag("async"), tag("rust")], OnDuplicate::Skip)
//!     .await
//!     .unwrap();
//! assert_eq!(result.success_count(), 2);
//! assert_eq!(result.skip_count(), 1);
//!
//! let rust = result.succeeded_items().find(|t| t.label == "rust").unwrap();
//! let id = rust.id.unwrap();
//! let renamed = engine.update(&id, &Patch::new().set("label", "tokio")).await.unwrap();
//! assert_eq!(renamed.label, "tokio");
//! # });
//! ```

pub mod config;
pub mod crud;
pub mod memory;
pub mod repository;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig};
pub use crud::{CreateBatch, CrudEngine, DeleteBatch, OnDuplicate, UpdateBatch};
pub use memory::MemoryRepository;
pub use repository::{RepoResult, Repository, RepositoryError};
pub use telemetry::init_tracing;
