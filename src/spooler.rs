//! Spool directory workers
//!
//! A fixed pool of OS threads sweeps the spool directory. For every file a
//! worker tries to claim the file's name in a process-wide [`NamedLock`];
//! the winner distributes the article, losers move straight on. After each
//! full sweep a worker sleeps for the idle interval. Dropping the shutdown
//! channel wakes every sleeping worker; a worker in the middle of a file
//! finishes that file first.
//!
//! Distribution of one file:
//!
//! 1. Parse the file.
//! 2. A Message-ID already in the index makes the file a duplicate: it is
//!    deleted and nothing is copied.
//! 3. Without a Message-ID one is generated and the spool file is rewritten
//!    with it before any copy is made, so a retry reuses the same id.
//! 4. The article is copied into every existing group named in its
//!    Newsgroups header. Unknown groups are skipped.
//! 5. The locations are recorded in the index, then the spool file is
//!    deleted. If another file with the same Message-ID was indexed in the
//!    meantime, the copies just made are removed and the file counts as a
//!    duplicate.
//!
//! Any error removes the copies made so far and leaves the file in place
//! for the next sweep. Files are retried
//! forever unless `max_attempts` and `dead_letter_path` are configured.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::article::Message;
use crate::article_id::Locations;
use crate::named_lock::NamedLock;
use crate::repository::RepositoryState;
use crate::validation::validate_message_id;
use crate::{RepositoryError, Result};

/// Claims on spool files, shared by every spooler in the process
static SPOOL_LOCKS: LazyLock<NamedLock> = LazyLock::new(NamedLock::new);

/// Result of distributing one spool file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpoolOutcome {
    /// The article was copied into its groups and indexed
    Distributed {
        /// Message-ID the article was indexed under
        message_id: String,
        /// Groups and numbers the article was stored at
        locations: Locations,
    },
    /// The Message-ID was already indexed; the file was discarded
    Duplicate {
        /// The already known Message-ID
        message_id: String,
    },
}

/// Counts from one sweep of the spool directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files distributed into at least one group
    pub distributed: usize,
    /// Files discarded as duplicates
    pub duplicates: usize,
    /// Files that failed and stay in the spool directory
    pub failed: usize,
    /// Files moved to the dead-letter directory
    pub dead_lettered: usize,
    /// Files claimed by another worker
    pub skipped: usize,
}

impl SweepReport {
    /// Files this sweep handled, successfully or not
    pub fn processed(&self) -> usize {
        self.distributed + self.duplicates + self.failed + self.dead_lettered
    }
}

#[derive(Debug)]
struct SpoolerShared {
    state: Arc<RepositoryState>,
    attempts: Mutex<HashMap<String, u32>>,
}

/// Pool of spool directory workers
#[derive(Debug)]
pub struct Spooler {
    shared: Arc<SpoolerShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<Option<flume::Sender<()>>>,
}

impl Spooler {
    pub(crate) fn start(state: Arc<RepositoryState>) -> Result<Self> {
        let threads = state.config.spool.threads;
        let idle = state.config.spool.idle_interval();
        let shared = Arc::new(SpoolerShared {
            state,
            attempts: Mutex::new(HashMap::new()),
        });

        let (tx, rx) = flume::bounded::<()>(0);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("nntp-spooler-{i}"))
                .spawn(move || run_worker(i, &shared, &rx, idle))?;
            workers.push(handle);
        }

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            shutdown: Mutex::new(Some(tx)),
        })
    }

    /// Directory the workers pick articles up from
    pub fn spool_path(&self) -> &Path {
        &self.shared.state.config.spool_path
    }

    /// Number of running worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run one sweep on the calling thread
    ///
    /// Competes with the background workers through the same named locks.
    pub fn sweep(&self) -> SweepReport {
        self.shared.sweep(|| false)
    }

    /// Failed attempts recorded for a spool file
    pub fn attempts(&self, name: &str) -> u32 {
        self.shared
            .attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Signal every worker to stop and wait for them
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                error!("Spooler worker panicked");
            }
        }
    }
}

fn run_worker(id: usize, shared: &SpoolerShared, shutdown: &flume::Receiver<()>, idle: Duration) {
    info!("Spooler worker {} started", id);
    loop {
        let report = shared.sweep(|| shutdown.is_disconnected());
        if report.processed() > 0 {
            debug!("Spooler worker {} sweep: {:?}", id, report);
        }
        match shutdown.recv_timeout(idle) {
            Err(flume::RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
    info!("Spooler worker {} stopped", id);
}

impl SpoolerShared {
    fn sweep(&self, stop: impl Fn() -> bool) -> SweepReport {
        let mut report = SweepReport::default();
        let spool_path = &self.state.config.spool_path;
        let entries = match fs::read_dir(spool_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list spool directory {}: {}", spool_path.display(), e);
                return report;
            }
        };

        for entry in entries {
            if stop() {
                break;
            }
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let key = path.to_string_lossy();
            let Some(_claim) = SPOOL_LOCKS.try_lock(&key) else {
                report.skipped += 1;
                continue;
            };
            // another worker may have finished it since the listing
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match self.process_file(&path) {
                Ok(SpoolOutcome::Distributed { .. }) => {
                    report.distributed += 1;
                    self.clear_attempts(&name);
                }
                Ok(SpoolOutcome::Duplicate { .. }) => {
                    report.duplicates += 1;
                    self.clear_attempts(&name);
                }
                Err(e) => {
                    if self.record_failure(&name, &path, &e) {
                        report.dead_lettered += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    fn process_file(&self, path: &Path) -> Result<SpoolOutcome> {
        let index = &self.state.index;
        let raw = fs::read(path)?;
        let mut message = Message::parse(&raw)?;

        let (message_id, content) = match message.message_id() {
            Some(id) => {
                let id = id.to_string();
                if index.exists(&id) {
                    debug!("Discarding duplicate {} from {}", id, path.display());
                    remove_spool_file(path);
                    return Ok(SpoolOutcome::Duplicate { message_id: id });
                }
                validate_message_id(&id)?;
                (id, raw)
            }
            None => {
                let id = index.generate_article_id();
                message.set_header("Message-ID", &id);
                let content = message.to_bytes();
                self.rewrite(path, &content)?;
                debug!("Assigned {} to {}", id, path.display());
                (id, content)
            }
        };

        let mut locations = Locations::new();
        for name in message.newsgroups() {
            if locations.contains_key(&name) {
                continue;
            }
            let Some(group) = self.state.get_group(&name) else {
                warn!("Skipping unknown newsgroup {} for {}", name, message_id);
                continue;
            };

            let (number, mut file) = match group.claim_next_file() {
                Ok(claimed) => claimed,
                Err(e) => {
                    self.discard_copies(&locations);
                    return Err(e);
                }
            };
            locations.insert(name, number);
            if let Err(e) = file.write_all(&content).and_then(|()| file.sync_data()) {
                drop(file);
                self.discard_copies(&locations);
                return Err(e.into());
            }
            debug!("Stored {} as {}:{}", message_id, group.name(), number);
        }

        if locations.is_empty() {
            return Err(RepositoryError::NoTargetGroups(message_id));
        }

        match index.add_article(Some(&message_id), &locations) {
            Ok(_) => {}
            Err(RepositoryError::AlreadyIndexed(_)) => {
                // another spool file with the same id was indexed first
                warn!(
                    "{} was indexed concurrently, discarding copies {:?}",
                    message_id, locations
                );
                self.discard_copies(&locations);
                remove_spool_file(path);
                return Ok(SpoolOutcome::Duplicate { message_id });
            }
            Err(e) => {
                warn!(
                    "Cannot index {}, discarding copies {:?}: {}",
                    message_id, locations, e
                );
                self.discard_copies(&locations);
                return Err(e);
            }
        }
        remove_spool_file(path);

        Ok(SpoolOutcome::Distributed {
            message_id,
            locations,
        })
    }

    /// Replace the spool file through the temp directory
    fn rewrite(&self, path: &Path, content: &[u8]) -> Result<()> {
        let mut temp = NamedTempFile::new_in(&self.state.config.temp_path)?;
        temp.write_all(content)?;
        temp.as_file_mut().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove group copies that never made it into the index
    fn discard_copies(&self, locations: &Locations) {
        for (name, number) in locations {
            let Some(group) = self.state.get_group(name) else {
                continue;
            };
            let copy = group.path().join(number.to_string());
            if let Err(e) = fs::remove_file(&copy) {
                warn!("Cannot delete unindexed copy {}: {}", copy.display(), e);
            }
        }
    }

    fn clear_attempts(&self, name: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    /// Count a failure; returns true if the file was dead-lettered
    fn record_failure(&self, name: &str, path: &Path, err: &RepositoryError) -> bool {
        let attempts = {
            let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
            let count = attempts.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let spool = &self.state.config.spool;
        let (Some(max), Some(dead_letter)) = (spool.max_attempts, &spool.dead_letter_path) else {
            warn!("Failed to process spool file {} (attempt {}): {}", name, attempts, err);
            return false;
        };
        if attempts < max {
            warn!(
                "Failed to process spool file {} (attempt {} of {}): {}",
                name, attempts, max, err
            );
            return false;
        }

        let target: PathBuf = dead_letter.join(name);
        match fs::rename(path, &target) {
            Ok(()) => {
                error!(
                    "Moved spool file {} to {} after {} failed attempts: {}",
                    name,
                    target.display(),
                    attempts,
                    err
                );
                self.clear_attempts(name);
                true
            }
            Err(e) => {
                error!("Cannot move spool file {} to {}: {}", name, target.display(), e);
                false
            }
        }
    }
}

fn remove_spool_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Cannot delete spool file {}: {}", path.display(), e);
    }
}
