//! On-disk fit cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! {target}/{epoch}/{model_id}/run{run_id}/info/results.json   posterior summary
//! {target}/{epoch}/{model_id}/run{run_id}/.claim              exclusive claim
//! ```
//!
//! A summary only becomes visible under its final name after a complete write
//! (temp file + rename). Before fitting, a worker takes the run's claim file
//! with `create_new`; whoever loses the race gets `ClaimHeld` for that cell.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::domain::{FitKey, PosteriorSummary};
use crate::error::FitError;
use crate::io::write_json_atomic;

pub const SUMMARY_FILE: &str = "results.json";
pub const CLAIM_FILE: &str = ".claim";

/// Filesystem store of posterior summaries keyed by `FitKey`.
#[derive(Debug, Clone)]
pub struct FitCache {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClaimRecord {
    pid: u32,
    created_at: DateTime<Utc>,
}

impl FitCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory of a run (sampler output goes here).
    pub fn run_dir(&self, key: &FitKey) -> PathBuf {
        self.root.join(key.run_dir())
    }

    pub fn summary_path(&self, key: &FitKey) -> PathBuf {
        self.run_dir(key).join("info").join(SUMMARY_FILE)
    }

    /// True iff a complete, parseable summary is stored for `key`.
    pub fn has(&self, key: &FitKey) -> bool {
        self.load(key).is_ok()
    }

    /// Read a stored summary.
    ///
    /// `CacheMiss` when nothing is stored; `MalformedCache` when the file
    /// exists but is truncated, unparseable or has ragged arrays.
    pub fn load(&self, key: &FitKey) -> Result<PosteriorSummary, FitError> {
        let path = self.summary_path(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(FitError::CacheMiss(path)),
            Err(e) => return Err(FitError::io(path, e)),
        };
        let summary: PosteriorSummary =
            serde_json::from_slice(&bytes).map_err(|e| FitError::MalformedCache {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if !summary.is_consistent() {
            return Err(FitError::MalformedCache {
                path,
                reason: "array lengths do not match paramnames".into(),
            });
        }
        Ok(summary)
    }

    /// Persist a summary atomically.
    pub fn store(&self, key: &FitKey, summary: &PosteriorSummary) -> Result<(), FitError> {
        let path = self.summary_path(key);
        write_json_atomic(&path, summary)?;
        debug!("stored {key}");
        Ok(())
    }

    /// Take the exclusive claim on a run directory.
    ///
    /// A claim older than `timeout` is considered abandoned (its process died)
    /// and is taken over.
    pub fn claim(&self, key: &FitKey, timeout: Duration) -> Result<ClaimGuard, FitError> {
        let dir = self.run_dir(key);
        fs::create_dir_all(&dir).map_err(|e| FitError::io(&dir, e))?;
        let path = dir.join(CLAIM_FILE);

        match create_claim(&path) {
            Ok(guard) => return Ok(guard),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(FitError::io(path, e)),
        }

        let (pid, age) = inspect_claim(&path);
        match age {
            Some(age) if age > timeout => {
                warn!(
                    "taking over stale claim on {key} (pid {pid}, {}s old)",
                    age.as_secs()
                );
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(FitError::io(path, e)),
                }
                create_claim(&path).map_err(|e| {
                    if e.kind() == ErrorKind::AlreadyExists {
                        FitError::ClaimHeld {
                            path: path.clone(),
                            pid,
                        }
                    } else {
                        FitError::io(&path, e)
                    }
                })
            }
            _ => Err(FitError::ClaimHeld { path, pid }),
        }
    }

    /// Remove every claim file under the cache root. Returns how many were removed.
    pub fn clear_claims(&self) -> Result<usize, FitError> {
        if !self.root.exists() {
            return Ok(0);
        }
        clear_claims_in(&self.root)
    }
}

/// Holds a run's claim file; removes it on drop.
#[derive(Debug)]
pub struct ClaimGuard {
    path: PathBuf,
}

impl ClaimGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("failed to release claim '{}': {e}", self.path.display());
            }
        }
    }
}

fn create_claim(path: &Path) -> std::io::Result<ClaimGuard> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let guard = ClaimGuard {
        path: path.to_path_buf(),
    };
    let record = ClaimRecord {
        pid: std::process::id(),
        created_at: Utc::now(),
    };
    let body = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
    file.write_all(&body)?;
    Ok(guard)
}

/// Owner pid (0 if unknown) and age of an existing claim.
///
/// The age falls back to the file's mtime when the record is unreadable, e.g.
/// when the claimer died between creating and writing it.
fn inspect_claim(path: &Path) -> (u32, Option<Duration>) {
    let record = fs::read(path)
        .ok()
        .and_then(|b| serde_json::from_slice::<ClaimRecord>(&b).ok());
    match record {
        Some(r) => {
            let age = (Utc::now() - r.created_at).to_std().unwrap_or(Duration::ZERO);
            (r.pid, Some(age))
        }
        None => {
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok());
            (0, age)
        }
    }
}

fn clear_claims_in(dir: &Path) -> Result<usize, FitError> {
    let mut removed = 0;
    let entries = fs::read_dir(dir).map_err(|e| FitError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FitError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| FitError::io(&path, e))?;
        if file_type.is_dir() {
            removed += clear_claims_in(&path)?;
        } else if entry.file_name() == CLAIM_FILE {
            fs::remove_file(&path).map_err(|e| FitError::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(logz: f64) -> PosteriorSummary {
        PosteriorSummary {
            param_names: vec!["Snorm".into(), "beta".into()],
            max_likelihood_point: vec![1.0, 2.0],
            median: vec![1.1, 2.1],
            stdev: vec![0.1, 0.2],
            errlo: vec![0.05, 0.1],
            errup: vec![0.06, 0.3],
            logz,
        }
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let key = FitKey::new("J1", "Jan20", "singSSA", 1);
        assert!(!cache.has(&key));
        assert!(matches!(cache.load(&key), Err(FitError::CacheMiss(_))));

        cache.store(&key, &summary(-20.1)).unwrap();
        assert!(cache.has(&key));
        assert_eq!(cache.load(&key).unwrap(), summary(-20.1));
        assert!(cache.summary_path(&key).ends_with("J1/Jan20/singSSA/run1/info/results.json"));
    }

    #[test]
    fn truncated_file_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let key = FitKey::new("J1", "Jan20", "singSSA", 1);
        let path = cache.summary_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, br#"{"paramnames": ["Snorm", "be"#).unwrap();

        assert!(!cache.has(&key));
        assert!(matches!(cache.load(&key), Err(FitError::MalformedCache { .. })));
    }

    #[test]
    fn ragged_summary_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let key = FitKey::new("J1", "Jan20", "singSSA", 1);
        let mut bad = summary(-1.0);
        bad.errup.pop();
        cache.store(&key, &bad).unwrap();
        assert!(!cache.has(&key));
    }

    #[test]
    fn run_ids_are_separate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        cache.store(&FitKey::new("J1", "e1", "m", 1), &summary(-1.0)).unwrap();
        assert!(!cache.has(&FitKey::new("J1", "e1", "m", 2)));
    }

    #[test]
    fn claim_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let key = FitKey::new("J1", "e1", "m", 1);
        let timeout = Duration::from_secs(3600);

        let guard = cache.claim(&key, timeout).unwrap();
        assert!(guard.path().exists());
        match cache.claim(&key, timeout) {
            Err(FitError::ClaimHeld { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected ClaimHeld, got {other:?}"),
        }
        drop(guard);
        assert!(cache.claim(&key, timeout).is_ok());
    }

    #[test]
    fn stale_claim_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let key = FitKey::new("J1", "e1", "m", 1);
        let path = cache.run_dir(&key).join(CLAIM_FILE);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let old = ClaimRecord {
            pid: 4242,
            created_at: Utc::now() - chrono::Duration::hours(7),
        };
        fs::write(&path, serde_json::to_vec(&old).unwrap()).unwrap();

        assert!(matches!(
            cache.claim(&key, Duration::from_secs(8 * 3600)),
            Err(FitError::ClaimHeld { pid: 4242, .. })
        ));
        assert!(cache.claim(&key, Duration::from_secs(6 * 3600)).is_ok());
    }

    #[test]
    fn clear_claims_walks_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let a = cache.claim(&FitKey::new("J1", "e1", "m", 1), Duration::from_secs(60)).unwrap();
        let b = cache.claim(&FitKey::new("J2", "e2", "n", 1), Duration::from_secs(60)).unwrap();
        std::mem::forget(a);
        std::mem::forget(b);
        assert_eq!(cache.clear_claims().unwrap(), 2);
        assert_eq!(cache.clear_claims().unwrap(), 0);
    }
}
