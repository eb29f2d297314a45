//! Background workers racing over the same spool directory

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::support::{article, group_numbers, spool_len, submit, threaded_repo, wait_for_empty_spool};

const TIMEOUT: Duration = Duration::from_secs(20);

#[test]
fn test_workers_distribute_each_file_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = threaded_repo(dir.path(), &["alpha"], 4);
    assert_eq!(repo.spooler().worker_count(), 4);

    let total = 50;
    for i in 0..total {
        submit(&repo, &article("alpha", Some(&format!("<m{i}@example.com>")), "x"));
    }
    assert!(wait_for_empty_spool(&repo, TIMEOUT));

    let numbers = group_numbers(dir.path(), "alpha");
    assert_eq!(numbers.len(), total);
    let unique: HashSet<u64> = numbers.iter().copied().collect();
    assert_eq!(unique.len(), total);

    for i in 0..total {
        let id = format!("<m{i}@example.com>");
        let stored = repo.article_from_id(&id).unwrap();
        assert_eq!(stored.unique_id().as_deref(), Some(id.as_str()));
    }
}

#[test]
fn test_concurrent_submissions_to_one_group() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(threaded_repo(dir.path(), &["gamma"], 2));

    let submitters: Vec<_> = ["<a@example.com>", "<b@example.com>"]
        .into_iter()
        .map(|id| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                submit(&repo, &article("gamma", Some(id), id));
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }
    assert!(wait_for_empty_spool(&repo, TIMEOUT));

    let a = repo.article_from_id("<a@example.com>").unwrap();
    let b = repo.article_from_id("<b@example.com>").unwrap();
    assert_ne!(a.article_number(), b.article_number());
    assert_eq!(group_numbers(dir.path(), "gamma"), vec![1, 2]);
}

#[test]
fn test_unlabeled_articles_get_distinct_ids_under_contention() {
    let dir = tempfile::tempdir().unwrap();
    let repo = threaded_repo(dir.path(), &["alpha", "beta"], 3);

    let total = 20;
    for i in 0..total {
        submit(&repo, &article("alpha, beta", None, &i.to_string()));
    }
    assert!(wait_for_empty_spool(&repo, TIMEOUT));

    let group = repo.get_group("alpha").unwrap();
    let ids: HashSet<String> = group.articles().filter_map(|a| a.unique_id()).collect();
    assert_eq!(ids.len(), total);
    for id in &ids {
        let locations = repo.article_id_index().locations(id).unwrap();
        assert_eq!(locations.keys().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    }
}

#[test]
fn test_shutdown_stops_workers() {
    let dir = tempfile::tempdir().unwrap();
    let repo = threaded_repo(dir.path(), &["alpha"], 2);
    repo.shutdown();
    assert_eq!(repo.spooler().worker_count(), 0);

    // nothing picks the file up any more
    submit(&repo, &article("alpha", Some("<late@example.com>"), "x"));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(spool_len(&repo), 1);

    // a second shutdown is a no-op, and so is the one on drop
    repo.shutdown();
    drop(repo);
}

#[test]
fn test_drop_joins_workers() {
    let dir = tempfile::tempdir().unwrap();
    let repo = threaded_repo(dir.path(), &["alpha"], 3);
    submit(&repo, &article("alpha", Some("<d@example.com>"), "x"));
    assert!(wait_for_empty_spool(&repo, TIMEOUT));
    drop(repo);

    assert_eq!(group_numbers(dir.path(), "alpha"), vec![1]);
}
