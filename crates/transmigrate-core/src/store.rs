//! On-disk audit trail for a migration job.
//!
//! Layout under the job output directory:
//!
//! ```text
//! attempt_<n>/candidate/<files>
//! attempt_<n>/build_report.json
//! attempt_<n>/build.log
//! attempt_<n>/verification_report.json
//! attempt_<n>/attempt.json
//! attempt_<n>/SUCCESS
//! debug/attempt_<n>/oracle.json
//! final/<files>
//! ledger.json + ledger.digest
//! summary.json
//! ```
//!
//! Attempts are persisted as soon as they are appended; the ledger, its
//! digest, the summary and the final copy are written when the job ends.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    Attempt, AttemptSummary, Candidate, JobResult, JobStatus, LedgerError, Result,
};
use crate::ledger::Ledger;
use crate::workspace::safe_relative_path;

pub const LEDGER_FILE: &str = "ledger.json";
pub const LEDGER_DIGEST_FILE: &str = "ledger.digest";
pub const SUMMARY_FILE: &str = "summary.json";
pub const SUCCESS_MARKER: &str = "SUCCESS";
pub const FINAL_DIR: &str = "final";
pub const DEBUG_DIR: &str = "debug";

/// Persisted form of a finalized job.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerRecord {
    job_id: Uuid,
    source_name: String,
    status: JobStatus,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    attempts: Vec<Attempt>,
}

#[derive(Serialize)]
struct AttemptMeta<'a> {
    #[serde(flatten)]
    summary: AttemptSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `contents` to `path` via a temp file in the same directory.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

fn write_tree(root: &Path, candidate: &Candidate) -> Result<()> {
    for (rel, contents) in &candidate.files {
        match safe_relative_path(rel) {
            Some(rel_path) => write_atomic(&root.join(rel_path), contents.as_bytes())?,
            None => warn!(path = %rel, "skipping candidate file with unsafe path"),
        }
    }
    Ok(())
}

/// Filesystem store for one job's attempts and final ledger.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    root: PathBuf,
}

impl LedgerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn attempt_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("attempt_{}", index))
    }

    pub fn final_dir(&self) -> PathBuf {
        self.root.join(FINAL_DIR)
    }

    /// Create the output directory and remove artifacts of a previous run.
    ///
    /// Only paths this store writes are removed; other files are left alone.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let stale_dir = name.starts_with("attempt_") || name == FINAL_DIR || name == DEBUG_DIR;
            let stale_file =
                name == LEDGER_FILE || name == LEDGER_DIGEST_FILE || name == SUMMARY_FILE;
            if stale_dir && entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(entry.path())?;
            } else if stale_file {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Persist one finalized attempt.
    pub fn persist_attempt(&self, attempt: &Attempt) -> Result<PathBuf> {
        let dir = self.attempt_dir(attempt.index);
        std::fs::create_dir_all(&dir)?;

        write_tree(&dir.join("candidate"), &attempt.candidate)?;
        write_json(&dir.join("build_report.json"), &attempt.build_report)?;
        write_atomic(
            &dir.join("build.log"),
            attempt.build_report.render_log().as_bytes(),
        )?;
        if let Some(report) = &attempt.verification_report {
            write_json(&dir.join("verification_report.json"), report)?;
        }
        write_json(
            &dir.join("attempt.json"),
            &AttemptMeta {
                summary: attempt.summary(),
                error: attempt.error.as_deref(),
            },
        )?;
        if attempt.succeeded() {
            write_atomic(&dir.join(SUCCESS_MARKER), b"")?;
        }

        write_json(
            &self
                .root
                .join(DEBUG_DIR)
                .join(format!("attempt_{}", attempt.index))
                .join("oracle.json"),
            &attempt.usage.oracle,
        )?;

        Ok(dir)
    }

    /// Write `ledger.json`, its digest, `summary.json`, and `final/` when accepted.
    pub fn finalize(&self, result: &JobResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;

        let record = LedgerRecord {
            job_id: result.job_id,
            source_name: result.source_name.clone(),
            status: result.status.clone(),
            started_at: result.started_at,
            finished_at: result.finished_at,
            attempts: result.ledger.attempts().to_vec(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        let ledger_path = self.root.join(LEDGER_FILE);
        write_atomic(&ledger_path, &json)?;
        write_atomic(
            &self.root.join(LEDGER_DIGEST_FILE),
            sha256_hex(&json).as_bytes(),
        )?;

        write_json(&self.root.join(SUMMARY_FILE), &result.summary())?;

        if let Some(accepted) = result.accepted_attempt() {
            write_tree(&self.final_dir(), &accepted.candidate)?;
        }

        Ok(ledger_path)
    }

    /// Load a finalized job, verifying the ledger digest and invariants.
    pub fn load(&self) -> Result<JobResult> {
        let json = std::fs::read(self.root.join(LEDGER_FILE))?;
        let expected = std::fs::read_to_string(self.root.join(LEDGER_DIGEST_FILE))?;
        let actual = sha256_hex(&json);
        if expected.trim() != actual {
            return Err(LedgerError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            }
            .into());
        }

        let record: LedgerRecord = serde_json::from_slice(&json)?;
        let ledger = Ledger::from_attempts(record.attempts)?;
        Ok(JobResult {
            job_id: record.job_id,
            source_name: record.source_name,
            status: record.status,
            ledger,
            started_at: record.started_at,
            finished_at: record.finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AttemptOutcome, AttemptUsage, BuildReport, CategoryResult, MigrationError,
        VerificationReport,
    };
    use crate::rules::{Category, LintPolicy};

    fn accepted_job() -> JobResult {
        let candidate = Candidate::default()
            .with_file("Cargo.toml", "[package]\nname = \"app\"\n")
            .with_file("src/main.rs", "fn main() { println!(\"24\"); }\n");
        let mut report = BuildReport::failed_with("ok", LintPolicy::Advisory);
        report.verdict = crate::domain::BuildVerdict::Pass;
        report.diagnostics.clear();

        let attempt = Attempt {
            index: 1,
            timestamp: Utc::now(),
            outcome: AttemptOutcome::Succeeded,
            candidate,
            build_report: report,
            verification_report: Some(
                VerificationReport::new().with_result(CategoryResult::pass(Category::Core, "24")),
            ),
            usage: AttemptUsage::default(),
            error: None,
        };
        let ledger = Ledger::from_attempts(vec![attempt]).expect("ledger");
        JobResult {
            job_id: Uuid::new_v4(),
            source_name: "factorial.py".into(),
            status: JobStatus::Accepted { attempt: 1 },
            ledger,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_persist_and_finalize_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LedgerStore::new(dir.path());
        let job = accepted_job();

        store
            .persist_attempt(job.ledger.get(1).expect("attempt"))
            .expect("persist");
        store.finalize(&job).expect("finalize");

        let attempt_dir = store.attempt_dir(1);
        assert!(attempt_dir.join("candidate/src/main.rs").is_file());
        assert!(attempt_dir.join("build_report.json").is_file());
        assert!(attempt_dir.join("build.log").is_file());
        assert!(attempt_dir.join("verification_report.json").is_file());
        assert!(attempt_dir.join("attempt.json").is_file());
        assert!(attempt_dir.join(SUCCESS_MARKER).is_file());
        assert!(dir.path().join("debug/attempt_1/oracle.json").is_file());
        assert!(dir.path().join("final/Cargo.toml").is_file());
        assert!(dir.path().join(SUMMARY_FILE).is_file());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LedgerStore::new(dir.path());
        let job = accepted_job();
        store.finalize(&job).expect("finalize");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.status, job.status);
        assert_eq!(loaded.ledger.len(), 1);
        assert!(loaded.is_accepted());
    }

    #[test]
    fn test_load_detects_tampering() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LedgerStore::new(dir.path());
        store.finalize(&accepted_job()).expect("finalize");

        let path = dir.path().join(LEDGER_FILE);
        let tampered = std::fs::read_to_string(&path)
            .expect("read")
            .replace("factorial.py", "other.py");
        std::fs::write(&path, tampered).expect("write");

        let err = store.load().expect_err("tampered");
        assert!(matches!(
            err,
            MigrationError::Ledger(LedgerError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_prepare_removes_stale_artifacts_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("attempt_7")).expect("mkdir");
        std::fs::write(dir.path().join(SUMMARY_FILE), "{}").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "keep").expect("write");

        LedgerStore::new(dir.path()).prepare().expect("prepare");

        assert!(!dir.path().join("attempt_7").exists());
        assert!(!dir.path().join(SUMMARY_FILE).exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
