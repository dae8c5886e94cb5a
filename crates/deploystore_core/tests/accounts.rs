use deploystore_core::model::now_epoch_ms;
use deploystore_core::{
    Account, AccountUpdate, ErrorKind, FsBlobStore, SqliteEntityStore, Storage,
};
use serde_json::json;
use std::collections::HashSet;
use tempfile::TempDir;

type TestStorage = Storage<SqliteEntityStore, FsBlobStore>;

fn storage() -> (TempDir, TestStorage) {
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::open(dir.path().join("bucket"), "bucket", None, None).unwrap();
    let storage = Storage::new(SqliteEntityStore::open_in_memory().unwrap(), blobs);
    (dir, storage)
}

#[test]
fn added_account_is_readable_by_id_and_email() {
    let (_dir, storage) = storage();

    let before = now_epoch_ms();
    let id = storage
        .add_account(&Account::new("a@x.com", "Alice"))
        .unwrap();
    assert_eq!(id.len(), 16);

    let by_id = storage.get_account(&id).unwrap();
    assert_eq!(by_id.id, id);
    assert_eq!(by_id.email, "a@x.com");
    assert_eq!(by_id.name, "Alice");
    assert!(by_id.created_time >= before);
    assert_eq!(by_id.version, 1);

    let by_email = storage.get_account_by_email("a@x.com").unwrap();
    assert_eq!(by_email, by_id);
}

#[test]
fn ids_are_unique_across_many_adds() {
    let (_dir, storage) = storage();
    let ids: HashSet<String> = (0..50)
        .map(|n| {
            storage
                .add_account(&Account::new(format!("user{n}@x.com"), "User"))
                .unwrap()
        })
        .collect();
    assert_eq!(ids.len(), 50);
}

#[test]
fn duplicate_email_is_rejected() {
    let (_dir, storage) = storage();
    storage
        .add_account(&Account::new("a@x.com", "Alice"))
        .unwrap();

    let err = storage
        .add_account(&Account::new("a@x.com", "Impostor"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
    assert!(!err.message.contains("a@x.com"));
}

#[test]
fn unknown_account_is_not_found() {
    let (_dir, storage) = storage();

    assert_eq!(
        storage.get_account("missing").unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(
        storage.get_account_by_email("nobody@x.com").unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[test]
fn update_merges_fields_and_keeps_the_rest() {
    let (_dir, storage) = storage();
    let mut account = Account::new("a@x.com", "Alice");
    account.linked_providers = vec!["GitHub".to_string()];
    account
        .profile
        .insert("azureAdId".to_string(), json!("aad-1"));
    let id = storage.add_account(&account).unwrap();

    let update = AccountUpdate {
        name: Some("Alice B".to_string()),
        ..AccountUpdate::default()
    };
    storage.update_account("a@x.com", &update).unwrap();

    let loaded = storage.get_account(&id).unwrap();
    assert_eq!(loaded.name, "Alice B");
    assert_eq!(loaded.linked_providers, ["GitHub"]);
    assert_eq!(loaded.profile.get("azureAdId"), Some(&json!("aad-1")));
    assert_eq!(loaded.version, 2);
}

#[test]
fn update_with_stale_version_conflicts() {
    let (_dir, storage) = storage();
    let id = storage
        .add_account(&Account::new("a@x.com", "Alice"))
        .unwrap();

    let fresh = AccountUpdate {
        name: Some("first".to_string()),
        expected_version: Some(1),
        ..AccountUpdate::default()
    };
    storage.update_account("a@x.com", &fresh).unwrap();

    let stale = AccountUpdate {
        name: Some("second".to_string()),
        expected_version: Some(1),
        ..AccountUpdate::default()
    };
    let err = storage.update_account("a@x.com", &stale).unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
    assert_eq!(storage.get_account(&id).unwrap().name, "first");
}

#[test]
fn update_cannot_steal_another_email() {
    let (_dir, storage) = storage();
    storage
        .add_account(&Account::new("a@x.com", "Alice"))
        .unwrap();
    storage.add_account(&Account::new("b@x.com", "Bob")).unwrap();

    let update = AccountUpdate {
        email: Some("a@x.com".to_string()),
        ..AccountUpdate::default()
    };
    let err = storage.update_account("b@x.com", &update).unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
}

#[test]
fn update_of_unknown_email_is_not_found() {
    let (_dir, storage) = storage();
    let err = storage
        .update_account("nobody@x.com", &AccountUpdate::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn profile_cannot_shadow_stored_fields_on_add() {
    let (_dir, storage) = storage();
    storage
        .add_account(&Account::new("taken@x.com", "Owner"))
        .unwrap();

    for (key, value) in [
        ("email", json!("taken@x.com")),
        ("createdTime", json!(0)),
        ("linkedProviders", json!(5)),
    ] {
        let mut account = Account::new("fresh@x.com", "Fresh");
        account.profile.insert(key.to_string(), value);
        let err = storage.add_account(&account).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other, "profile key {key}");
        assert!(err.message.contains(key));
    }
    assert_eq!(
        storage.get_account_by_email("fresh@x.com").unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[test]
fn profile_cannot_shadow_stored_fields_on_update() {
    let (_dir, storage) = storage();
    storage
        .add_account(&Account::new("taken@x.com", "Owner"))
        .unwrap();
    let id = storage
        .add_account(&Account::new("mine@x.com", "Mine"))
        .unwrap();

    let mut update = AccountUpdate::default();
    update
        .profile
        .insert("email".to_string(), json!("taken@x.com"));
    let err = storage.update_account("mine@x.com", &update).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Other);

    let unchanged = storage.get_account(&id).unwrap();
    assert_eq!(unchanged.email, "mine@x.com");
    assert_eq!(storage.get_account_by_email("taken@x.com").unwrap().name, "Owner");
}
