//! Integration tests for single-item engine operations.

mod common;

use common::{accounts, people, Account, Fault, FaultyRepository, Person};
use crudkit_engine::{
    Error, ErrorKind, FieldType, Order, PageRequest, Patch, Sort, UnknownFieldPolicy,
    ValidationError, ViolationKind,
};
use crudkit_service::{CrudEngine, EngineConfig, MemoryRepository, Repository, RepositoryError};
use serde_json::json;
use std::sync::Arc;

type People = CrudEngine<Person, MemoryRepository<Person>>;

fn engine() -> People {
    CrudEngine::new(people()).unwrap()
}

async fn seeded() -> People {
    let engine = engine();
    engine.create(Person::with_id(5, "Alice", 30)).await.unwrap();
    engine
}

#[cfg(test)]
mod create_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_find_round_trip() {
        let engine = engine();

        let stored = engine.create(Person::new("Bob", 41)).await.unwrap();
        let id = stored.id.expect("repository assigns an id");
        assert_eq!(stored.version, 1);

        let found = engine.find_by_id(&id).await.unwrap();
        assert_eq!(found, stored);
        assert_eq!(engine.count().await.unwrap(), 1);
        assert!(engine.exists_by_id(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_with_taken_id_is_duplicate() {
        let engine = seeded().await;

        let result = engine.create(Person::with_id(5, "Mallory", 20)).await;
        assert!(matches!(result, Err(Error::DuplicateEntity(_))));
        assert_eq!(engine.find_by_id(&5).await.unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn test_create_with_taken_natural_key_is_duplicate() {
        let engine = CrudEngine::new(accounts()).unwrap();
        engine.create(Account::new("a@example.com", 10)).await.unwrap();

        let result = engine.create(Account::new("a@example.com", 99)).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateEntity);
        assert_eq!(engine.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_allowing_duplicates_skips_key_check_only() {
        let engine = CrudEngine::new(accounts()).unwrap();
        let first = engine.create(Account::new("a@example.com", 10)).await.unwrap();

        let second = engine
            .create_allowing_duplicates(Account::new("a@example.com", 20))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(engine.count().await.unwrap(), 2);

        let same_id = Account {
            id: first.id,
            ..Account::new("b@example.com", 0)
        };
        let result = engine.create_allowing_duplicates(same_id).await;
        assert!(matches!(result, Err(Error::DuplicateEntity(_))));
    }

    #[tokio::test]
    async fn test_allowed_duplicate_still_blocks_plain_create() {
        let engine = CrudEngine::new(accounts()).unwrap();
        engine
            .create_allowing_duplicates(Account::new("x@example.com", 1))
            .await
            .unwrap();

        let result = engine.create(Account::new("x@example.com", 2)).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateEntity);
        assert_eq!(engine.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_key_stays_taken_while_a_duplicate_remains() {
        let engine = CrudEngine::new(accounts()).unwrap();
        let first = engine.create(Account::new("x@example.com", 1)).await.unwrap();
        let second = engine
            .create_allowing_duplicates(Account::new("x@example.com", 2))
            .await
            .unwrap();

        engine.delete(&first.id.unwrap()).await.unwrap();
        let result = engine.create(Account::new("x@example.com", 3)).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateEntity);
        assert_eq!(engine.count().await.unwrap(), 1);

        engine.delete(&second.id.unwrap()).await.unwrap();
        engine.create(Account::new("x@example.com", 4)).await.unwrap();
        assert_eq!(engine.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_uuid_ids_are_generated() {
        let engine = CrudEngine::new(accounts()).unwrap();
        let a = engine.create(Account::new("a@example.com", 1)).await.unwrap();
        let b = engine.create(Account::new("b@example.com", 2)).await.unwrap();

        assert!(a.id.is_some());
        assert_ne!(a.id, b.id);
        assert_eq!(engine.find_by_id(&a.id.unwrap()).await.unwrap(), a);
    }
}

#[cfg(test)]
mod update_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_merges_and_bumps_version() {
        let engine = seeded().await;

        let updated = engine
            .update(&5, &Patch::new().set("age", 31).set("email", "alice@example.com"))
            .await
            .unwrap();

        assert_eq!(updated.age, 31);
        assert_eq!(updated.email.as_deref(), Some("alice@example.com"));
        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.version, 2);
        assert_eq!(engine.find_by_id(&5).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_type_mismatch() {
        let engine = seeded().await;

        let result = engine.update(&5, &Patch::new().set("age", "thirty")).await;
        assert_eq!(
            result,
            Err(Error::TypeMismatch {
                field: "age".into(),
                expected: FieldType::Int,
                got: "String".into(),
            })
        );
        assert_eq!(engine.find_by_id(&5).await.unwrap().age, 30);
    }

    #[tokio::test]
    async fn test_update_identifier_leaves_state_untouched() {
        let engine = seeded().await;
        let before = engine.find_by_id(&5).await.unwrap();

        let result = engine.update(&5, &Patch::new().set("id", 6)).await;
        match result {
            Err(Error::Validation(ValidationError::Fields(violations))) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "id");
                assert_eq!(violations[0].kind, ViolationKind::Identifier);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(engine.find_by_id(&5).await.unwrap(), before);
        assert!(!engine.exists_by_id(&6).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_reports_every_offending_key() {
        let engine = seeded().await;
        let patch = Patch::new()
            .set("id", 9)
            .set("nickname", "Al")
            .set("version", 7)
            .set("age", 99);

        let err = engine.update(&5, &patch).await.unwrap_err();
        match err {
            Error::Validation(violation) => {
                assert_eq!(violation.fields(), vec!["id", "nickname", "version"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(engine.find_by_id(&5).await.unwrap().age, 30);
    }

    #[tokio::test]
    async fn test_update_with_empty_patch() {
        let engine = seeded().await;
        let result = engine.update(&5, &Patch::new()).await;
        assert_eq!(result, Err(Error::Validation(ValidationError::EmptyPatch)));
    }

    #[tokio::test]
    async fn test_update_missing_entity() {
        let engine = seeded().await;
        let result = engine.update(&404, &Patch::new().set("age", 1)).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let repository = FaultyRepository::new(people());
        let engine = CrudEngine::new(repository).unwrap();
        engine.create(Person::with_id(5, "Alice", 30)).await.unwrap();
        let patch = Patch::new().set("age", 31);

        let first = engine.update(&5, &patch).await.unwrap();
        let second = engine.update(&5, &patch).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.version, 2);
        assert_eq!(engine.repository().save_count(), 1);
    }

    #[tokio::test]
    async fn test_update_nullable_field() {
        let engine = seeded().await;
        engine
            .update(&5, &Patch::new().set("email", "alice@example.com"))
            .await
            .unwrap();

        let cleared = engine.update(&5, &Patch::new().set("email", json!(null))).await.unwrap();
        assert_eq!(cleared.email, None);

        let result = engine.update(&5, &Patch::new().set("age", json!(null))).await;
        assert!(matches!(result, Err(Error::TypeMismatch { ref field, .. }) if field == "age"));
    }

    #[tokio::test]
    async fn test_update_ignoring_unknown_fields() {
        let config = EngineConfig::default().with_unknown_fields(UnknownFieldPolicy::Ignore);
        let engine = CrudEngine::with_config(people(), config).unwrap();
        engine.create(Person::with_id(5, "Alice", 30)).await.unwrap();

        let updated = engine
            .update(&5, &Patch::new().set("age", 40).set("nickname", "Al"))
            .await
            .unwrap();
        assert_eq!(updated.age, 40);

        // identifiers are still rejected
        let result = engine.update(&5, &Patch::new().set("id", 1)).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);

        // nothing left to assign
        let result = engine.update(&5, &Patch::new().set("nickname", "Al")).await;
        assert!(matches!(result, Err(Error::Validation(ValidationError::EmptyPatch))));
        assert_eq!(engine.find_by_id(&5).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_update_natural_key_collision() {
        let engine = CrudEngine::new(accounts()).unwrap();
        let a = engine.create(Account::new("a@example.com", 1)).await.unwrap();
        engine.create(Account::new("b@example.com", 2)).await.unwrap();
        let id = a.id.unwrap();

        let result = engine.update(&id, &Patch::new().set("email", "b@example.com")).await;
        assert!(matches!(result, Err(Error::DuplicateEntity(_))));
        assert_eq!(engine.find_by_id(&id).await.unwrap().email, "a@example.com");

        let moved = engine
            .update(&id, &Patch::new().set("email", "c@example.com"))
            .await
            .unwrap();
        assert_eq!(moved.email, "c@example.com");
        engine.create(Account::new("a@example.com", 3)).await.unwrap();
    }

    #[tokio::test]
    async fn test_version_conflict_is_retryable() {
        let repository = FaultyRepository::new(people()).stale_saves();
        let engine = CrudEngine::new(repository).unwrap();
        engine.create(Person::with_id(5, "Alice", 30)).await.unwrap();

        let err = engine.update(&5, &Patch::new().set("age", 31)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(engine.find_by_id(&5).await.unwrap().age, 30);
    }

    #[tokio::test]
    async fn test_stale_entity_conflicts_in_memory() {
        let repository = Arc::new(people());
        let engine = CrudEngine::new(Arc::clone(&repository)).unwrap();
        let stored = engine.create(Person::with_id(5, "Alice", 30)).await.unwrap();
        engine.update(&5, &Patch::new().set("age", 31)).await.unwrap();

        let mut stale = stored;
        stale.age = 50;
        let result = repository.save(stale, None).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Conflict { expected: 1, actual: 2, .. })
        ));
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_and_cancellation_are_distinct() {
        let repository = FaultyRepository::new(people())
            .fail(7, Fault::Timeout)
            .fail(8, Fault::Cancelled)
            .fail(9, Fault::Backend);
        let engine = CrudEngine::new(repository).unwrap();

        let timeout = engine.find_by_id(&7).await.unwrap_err();
        let cancelled = engine.find_by_id(&8).await.unwrap_err();
        let storage = engine.find_by_id(&9).await.unwrap_err();

        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(storage.kind(), ErrorKind::Storage);
        assert!(timeout.is_retryable());
        assert!(cancelled.is_retryable());
        assert!(!storage.is_retryable());
    }
}

#[cfg(test)]
mod query_tests {
    use super::*;

    async fn roster() -> People {
        let engine = engine();
        for (name, age) in [("Carol", 35), ("Alice", 30), ("Bob", 41), ("Dave", 30)] {
            engine.create(Person::new(name, age)).await.unwrap();
        }
        engine
    }

    fn names(people: &[Person]) -> Vec<&str> {
        people.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_find_all_keeps_repository_order() {
        let engine = roster().await;
        let all = engine.find_all().await.unwrap();
        assert_eq!(names(&all), ["Carol", "Alice", "Bob", "Dave"]);
    }

    #[tokio::test]
    async fn test_find_all_sorted() {
        let engine = roster().await;
        let sort = Sort::by(Order::asc("age")).then(Order::desc("name"));
        let sorted = engine.find_all_sorted(&sort).await.unwrap();
        assert_eq!(names(&sorted), ["Dave", "Alice", "Carol", "Bob"]);
    }

    #[tokio::test]
    async fn test_sort_on_unknown_field() {
        let engine = roster().await;
        let result = engine.find_all_sorted(&Sort::by(Order::asc("salary"))).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);

        let request = PageRequest::new(0, 2).sorted(Sort::by(Order::asc("salary")));
        assert_eq!(engine.find_page(&request).await.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_find_page() {
        let engine = roster().await;
        let request = PageRequest::new(1, 3).sorted(Sort::by(Order::asc("name")));

        let page = engine.find_page(&request).await.unwrap();
        assert_eq!(names(&page.items), ["Dave"]);
        assert_eq!(page.total_elements, 4);
        assert_eq!(page.total_pages(), 2);
        assert!(!page.has_next());
    }

    #[tokio::test]
    async fn test_delete_returns_pre_image() {
        let engine = seeded().await;
        engine.update(&5, &Patch::new().set("age", 31)).await.unwrap();

        let deleted = engine.delete(&5).await.unwrap();
        assert_eq!(deleted.age, 31);
        assert_eq!(deleted.version, 2);

        assert_eq!(engine.delete(&5).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.find_by_id(&5).await.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
