use deploystore_core::{BlobStore, Credentials, ErrorKind, LocalStorage, StorageConfig, UrlSigner};
use std::io::{self, Cursor, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn credentials() -> Credentials {
    Credentials {
        client_email: "svc@example.com".to_string(),
        private_key: "signing-secret".to_string(),
    }
}

fn config(dir: &std::path::Path) -> StorageConfig {
    let mut config =
        StorageConfig::new("demo-project", "releases", dir).with_credentials(credentials());
    config.public_base_url = Some("https://cdn.example.com".to_string());
    config
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

struct BrokenStream;

impl Read for BrokenStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"))
    }
}

#[test]
fn open_lays_out_database_and_bucket_under_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let storage = LocalStorage::open(&config).unwrap();
    storage.check_health().unwrap();

    assert!(dir.path().join("demo-project.sqlite3").is_file());
    assert!(dir.path().join("buckets/releases/blobs").is_dir());
}

#[test]
fn uploaded_blob_gets_a_verifiable_hour_long_url() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(&config(dir.path())).unwrap();

    let id = storage
        .add_blob("pkg-1", Cursor::new(b"zip bytes".to_vec()), Some(9))
        .unwrap();
    assert_eq!(id, "pkg-1");

    let mut stored = String::new();
    storage
        .blob_store()
        .open_blob("pkg-1")
        .unwrap()
        .read_to_string(&mut stored)
        .unwrap();
    assert_eq!(stored, "zip bytes");

    let url = storage.get_blob_url("pkg-1").unwrap();
    let signer = UrlSigner::new(&credentials(), "releases").unwrap();
    let object = signer
        .verify_url("https://cdn.example.com", &url, now_secs())
        .unwrap();
    assert_eq!(object, "blobs/pkg-1");

    let expires: u64 = url
        .split("expires=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .parse()
        .unwrap();
    let ttl = expires - now_secs();
    assert!((3_590..=3_600).contains(&ttl), "ttl was {ttl}");

    assert!(signer
        .verify_url("https://cdn.example.com", &url, expires + 1)
        .is_err());
}

#[test]
fn custom_ttl_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(&config(dir.path())).unwrap();
    storage
        .add_blob("pkg-1", Cursor::new(b"x".to_vec()), None)
        .unwrap();

    let url = storage
        .get_blob_url_with_ttl("pkg-1", Duration::from_secs(60))
        .unwrap();
    let expires: u64 = url
        .split("expires=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .parse()
        .unwrap();
    assert!(expires <= now_secs() + 60);
}

#[test]
fn failed_upload_is_not_visible() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(&config(dir.path())).unwrap();

    let err = storage.add_blob("pkg-1", BrokenStream, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Other);
    assert!(storage.blob_store().open_blob("pkg-1").is_err());

    let leftovers = std::fs::read_dir(dir.path().join("buckets/releases/blobs"))
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn remove_blob_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(&config(dir.path())).unwrap();
    storage
        .add_blob("pkg-1", Cursor::new(b"x".to_vec()), None)
        .unwrap();

    storage.remove_blob("pkg-1").unwrap();
    storage.remove_blob("pkg-1").unwrap();
    storage.remove_blob("never-existed").unwrap();
}

#[test]
fn blob_url_without_credentials_is_access_denied() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::new("demo-project", "releases", dir.path());
    let storage = LocalStorage::open(&config).unwrap();

    let err = storage.get_blob_url("pkg-1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionFailed);
    assert!(err.message.starts_with("access denied"));
}

#[test]
fn health_fails_naming_the_missing_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(&config(dir.path())).unwrap();

    std::fs::remove_dir_all(dir.path().join("buckets/releases")).unwrap();
    let err = storage.check_health().unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionFailed);
    assert!(err.message.contains("releases"));
}

#[test]
fn invalid_config_is_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::new("bad/project", "releases", dir.path());
    assert!(LocalStorage::open(&config).is_err());
}
