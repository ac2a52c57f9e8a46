use std::time::Duration;
use thesis_docx::error::TokenError;
use thesis_docx::storage::{LocalStorage, Storage};
use thesis_docx::token::TokenService;

#[test]
fn publish_then_fetch_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(dir.path(), Duration::from_secs(600)).unwrap();
    let tokens = TokenService::new("dev_secret_key", 300, 3600);

    let docx = thesis_docx::convert("<h1>Title</h1><p>text</p>").unwrap();
    let id = storage.save(&docx).unwrap();
    let token = tokens.issue(&id, Some(120)).unwrap();

    let resolved = tokens.verify(&token).unwrap();
    assert_eq!(resolved, id);
    assert_eq!(storage.get(&resolved).unwrap().unwrap(), docx);
}

#[test]
fn token_for_another_secret_is_refused() {
    let issued = TokenService::new("one", 300, 3600).issue("abcdefghij", None).unwrap();
    assert!(matches!(
        TokenService::new("two", 300, 3600).verify(&issued),
        Err(TokenError::BadSignature)
    ));
}

#[test]
fn separate_handles_share_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let id = LocalStorage::open(dir.path(), Duration::from_secs(600))
        .unwrap()
        .save(b"bytes")
        .unwrap();
    let other = LocalStorage::open(dir.path(), Duration::from_secs(600)).unwrap();
    assert!(other.list_ids().contains(&id));
    assert!(other.delete(&id).unwrap());
    assert!(other.list_ids().is_empty());
}
