//! Message-ID index behaviour through the repository

use std::collections::HashSet;
use std::fs;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use nntp_store::{Locations, RepositoryError};

use super::support::{article, manual_repo, submit};

#[test]
fn test_generated_ids_are_unique_and_unused() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &[]);
    let index = repo.article_id_index();

    let ids: HashSet<String> = (0..100).map(|_| index.generate_article_id()).collect();
    assert_eq!(ids.len(), 100);
    for id in &ids {
        assert!(id.starts_with('<') && id.ends_with("@news.example.com>"), "{id}");
        assert!(!index.exists(id));
    }
}

#[test]
fn test_record_is_named_by_encoded_id() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    submit(&repo, &article("alpha", Some("<named@example.com>"), "x"));
    repo.spooler().sweep();

    let record = dir
        .path()
        .join("articleid")
        .join(URL_SAFE_NO_PAD.encode("<named@example.com>"));
    let text = fs::read_to_string(record).unwrap();
    assert!(text.starts_with("#Created "));
    assert!(text.lines().any(|l| l == "alpha=1"));
}

#[test]
fn test_article_from_id_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    assert!(repo.article_from_id("<missing@example.com>").is_none());
    assert!(repo.article_from_id("").is_none());
}

#[test]
fn test_corrupt_record_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    let record = dir
        .path()
        .join("articleid")
        .join(URL_SAFE_NO_PAD.encode("<corrupt@example.com>"));
    fs::write(record, "this is not a properties file\n").unwrap();

    assert!(repo.article_id_index().exists("<corrupt@example.com>"));
    assert!(repo.article_from_id("<corrupt@example.com>").is_none());
}

#[test]
fn test_missing_copy_falls_back_to_next_location() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha", "beta"]);
    submit(&repo, &article("alpha, beta", Some("<both@example.com>"), "x"));
    repo.spooler().sweep();

    fs::remove_file(dir.path().join("groups/alpha/1")).unwrap();
    let found = repo.article_from_id("<both@example.com>").unwrap();
    assert_eq!(found.group_name(), "beta");
    assert_eq!(found.article_number(), 1);

    fs::remove_file(dir.path().join("groups/beta/1")).unwrap();
    assert!(repo.article_from_id("<both@example.com>").is_none());
}

#[test]
fn test_index_records_are_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &[]);
    let index = repo.article_id_index();
    let locations = Locations::from([("alpha".to_string(), 3)]);

    let id = index.add_article(Some("<once@example.com>"), &locations).unwrap();
    assert_eq!(id, "<once@example.com>");

    let err = index
        .add_article(Some("<once@example.com>"), &Locations::new())
        .unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyIndexed(_)));
    assert_eq!(index.locations(&id), Some(locations));
}

#[test]
fn test_index_generates_id_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &[]);
    let index = repo.article_id_index();

    let id = index
        .add_article(None, &Locations::from([("alpha".to_string(), 1)]))
        .unwrap();
    assert!(id.ends_with("@news.example.com>"));
    assert!(index.exists(&id));
}

#[test]
fn test_index_leaves_no_temporary_files() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &[]);
    for i in 0..5 {
        repo.article_id_index()
            .add_article(
                Some(&format!("<tmp{i}@example.com>")),
                &Locations::from([("alpha".to_string(), i + 1)]),
            )
            .unwrap();
    }

    let names: Vec<String> = fs::read_dir(dir.path().join("articleid"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names.len(), 5);
    assert!(names.iter().all(|n| !n.starts_with('.')));
}
