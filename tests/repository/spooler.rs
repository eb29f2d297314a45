//! Spooler distribution scenarios

use std::fs;

use nntp_store::{Locations, Repository, RepositoryConfig, SpoolerConfig};

use super::support::{article, group_numbers, manual_config, manual_repo, spool_len, submit};

#[test]
fn test_distributed_article_is_indexed_and_copied() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha", "beta"]);
    let content = article("alpha, beta", Some("<first@example.com>"), "hello");
    let name = submit(&repo, &content);

    let report = repo.spooler().sweep();
    assert_eq!(report.distributed, 1);
    assert_eq!(report.failed, 0);

    let index = repo.article_id_index();
    assert!(index.exists("<first@example.com>"));
    let locations = index.locations("<first@example.com>").unwrap();
    assert_eq!(locations.len(), 2);
    for (group, number) in &locations {
        let stored = repo.get_group(group).unwrap().article(*number).unwrap();
        assert_eq!(stored.read().unwrap(), content);
    }
    assert!(!repo.spooler().spool_path().join(name).exists());
}

#[test]
fn test_unlabeled_article_partial_distribution() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    let name = submit(&repo, &article("alpha, beta", None, "no id"));

    let report = repo.spooler().sweep();
    assert_eq!(report.distributed, 1);

    // alpha was empty, so the copy is article 1
    assert_eq!(group_numbers(dir.path(), "alpha"), vec![1]);
    assert!(!dir.path().join("groups/beta").exists());
    assert!(!repo.spooler().spool_path().join(name).exists());

    let stored = repo.get_group("alpha").unwrap().article(1).unwrap();
    let id = stored.unique_id().unwrap();
    assert!(id.starts_with('<'));
    assert!(id.ends_with("@news.example.com>"));

    assert_eq!(
        repo.article_id_index().locations(&id),
        Some(Locations::from([("alpha".to_string(), 1)]))
    );
    assert_eq!(repo.article_from_id(&id).unwrap(), stored);
}

#[test]
fn test_generated_id_is_written_back_before_distribution() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &[]);
    // no group exists, so the file stays in the spool after its rewrite
    let name = submit(&repo, &article("nowhere", None, "body"));

    let report = repo.spooler().sweep();
    assert_eq!(report.failed, 1);

    let rewritten = fs::read_to_string(repo.spooler().spool_path().join(&name)).unwrap();
    let id_line = rewritten
        .lines()
        .find(|l| l.starts_with("Message-ID: "))
        .unwrap();
    assert!(id_line.ends_with("@news.example.com>"));
    assert!(rewritten.ends_with("\r\n\r\nbody\r\n"));

    // the retry keeps the same identifier
    repo.spooler().sweep();
    let again = fs::read_to_string(repo.spooler().spool_path().join(&name)).unwrap();
    assert_eq!(again, rewritten);
}

#[test]
fn test_duplicate_submission_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    let content = article("alpha", Some("<same@example.com>"), "once");

    submit(&repo, &content);
    assert_eq!(repo.spooler().sweep().distributed, 1);

    let second = submit(&repo, &content);
    let report = repo.spooler().sweep();
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.distributed, 0);
    assert_eq!(group_numbers(dir.path(), "alpha"), vec![1]);
    assert!(!repo.spooler().spool_path().join(second).exists());
}

#[test]
fn test_orphaned_spool_file_is_reprocessed_as_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    submit(&repo, &article("alpha", None, "orphan"));
    repo.spooler().sweep();

    // simulate a failed spool delete: the stored copy reappears in the spool
    let stored = repo.get_group("alpha").unwrap().article(1).unwrap();
    fs::write(
        repo.spooler().spool_path().join("orphan"),
        stored.read().unwrap(),
    )
    .unwrap();

    let report = repo.spooler().sweep();
    assert_eq!(report.duplicates, 1);
    assert_eq!(spool_len(&repo), 0);
    assert_eq!(group_numbers(dir.path(), "alpha"), vec![1]);
}

#[test]
fn test_malformed_file_is_retried_forever_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    let bad = repo.spooler().spool_path().join("bad");
    fs::write(&bad, "this line has no colon\r\n\r\nbody").unwrap();

    for attempt in 1..=5 {
        let report = repo.spooler().sweep();
        assert_eq!(report.failed, 1);
        assert_eq!(report.dead_lettered, 0);
        assert_eq!(repo.spooler().attempts("bad"), attempt);
    }
    assert!(bad.exists());
}

#[test]
fn test_malformed_file_is_dead_lettered_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let failed = dir.path().join("failed");
    let config = manual_config(dir.path(), &["alpha"]).with_spooler(SpoolerConfig {
        threads: 0,
        max_attempts: Some(3),
        dead_letter_path: Some(failed.clone()),
        ..Default::default()
    });
    let repo = Repository::open(config).unwrap();
    let bad = repo.spooler().spool_path().join("bad");
    fs::write(&bad, "garbage").unwrap();

    assert_eq!(repo.spooler().sweep().failed, 1);
    assert_eq!(repo.spooler().sweep().failed, 1);
    let report = repo.spooler().sweep();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.failed, 0);

    assert!(!bad.exists());
    assert_eq!(fs::read_to_string(failed.join("bad")).unwrap(), "garbage");
    assert_eq!(repo.spooler().attempts("bad"), 0);
}

#[test]
fn test_good_files_unaffected_by_bad_neighbour() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    fs::write(repo.spooler().spool_path().join("bad"), "garbage").unwrap();
    submit(&repo, &article("alpha", Some("<good@example.com>"), "ok"));

    let report = repo.spooler().sweep();
    assert_eq!(report.distributed, 1);
    assert_eq!(report.failed, 1);
    assert!(repo.article_from_id("<good@example.com>").is_some());
}

#[test]
fn test_invalid_message_id_is_a_processing_error() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    submit(&repo, &article("alpha", Some("no-brackets"), "x"));

    assert_eq!(repo.spooler().sweep().failed, 1);
    assert!(group_numbers(dir.path(), "alpha").is_empty());
}

#[test]
fn test_spooler_writes_bypass_group_cache() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    let group = repo.get_group("alpha").unwrap();
    assert_eq!(group.number_of_articles(), 0);

    submit(&repo, &article("alpha", None, "one"));
    submit(&repo, &article("alpha", None, "two"));
    assert_eq!(repo.spooler().sweep().distributed, 2);

    // accepted staleness: the cached snapshot predates the spooler writes
    assert_eq!(group.number_of_articles(), 0);
    assert_eq!(group_numbers(dir.path(), "alpha"), vec![1, 2]);

    group.refresh();
    assert_eq!(group.number_of_articles(), 2);
    assert_eq!(group.first_article_number(), 1);
    assert_eq!(group.last_article_number(), 2);
}

#[test]
fn test_read_only_repository_still_distributes_existing_spool() {
    let dir = tempfile::tempdir().unwrap();
    {
        let repo = manual_repo(dir.path(), &["alpha"]);
        submit(&repo, &article("alpha", Some("<ro@example.com>"), "x"));
    }

    let config = RepositoryConfig::new(dir.path())
        .with_newsgroups(["alpha"])
        .with_read_only(true)
        .with_spooler(SpoolerConfig {
            threads: 0,
            ..Default::default()
        });
    let repo = Repository::open(config).unwrap();
    assert_eq!(repo.spooler().sweep().distributed, 1);
    assert!(repo.article_from_id("<ro@example.com>").is_some());
}

#[test]
fn test_unlabeled_8bit_article_is_stored_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let repo = manual_repo(dir.path(), &["alpha"]);
    let head: &[u8] = b"From: poster@example.com\r\nNewsgroups: alpha\r\nSubject: caf\xe9\r\n";
    let body: &[u8] = b"na\xefve body\r\n";
    submit(&repo, &[head, &b"\r\n"[..], body].concat());
    assert_eq!(repo.spooler().sweep().distributed, 1);

    let stored = repo.get_group("alpha").unwrap().article(1).unwrap();
    let id = stored.unique_id().unwrap();
    let expected = [
        head,
        format!("Message-ID: {id}\r\n\r\n").as_bytes(),
        body,
    ]
    .concat();
    assert_eq!(stored.read().unwrap(), expected);
    assert!(repo.article_id_index().exists(&id));
}
