/**
 * Event Log Store
 *
 * One append-only log per session plus an optional snapshot sidecar:
 *
 * ```text
 * data/<session_id>.log            newline-delimited JSON records
 * data/<session_id>.snapshot.json  serialized state + covered seq
 * ```
 *
 * # Durability
 *
 * `append` flushes and `sync_data`s the log before returning, so an entry
 * that was acknowledged survives power loss. Snapshots are crash-safe by
 * construction: written to a temp path, fsynced, atomically renamed, and
 * only then is the log truncated. A partial snapshot or a torn trailing log
 * line is simply ignored on recovery.
 *
 * The record format is self-delimiting (one JSON document per line), which
 * is what makes partial trailing writes detectable.
 */

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::error::BackendError;
use crate::backend::session::state::{MutationOp, SessionSnapshot};

/// One durable log entry: an accepted mutation with its session sequence
/// number.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LogRecord {
    pub seq: u64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    pub user_id: String,
    #[serde(flatten)]
    pub op: MutationOp,
}

fn log_path(data_dir: &Path, session_id: &str) -> PathBuf {
    data_dir.join(format!("{session_id}.log"))
}

fn snapshot_path(data_dir: &Path, session_id: &str) -> PathBuf {
    data_dir.join(format!("{session_id}.snapshot.json"))
}

/// Append-only log handle for one session. Touched only by the owning
/// session actor.
pub struct EventLogStore {
    session_id: String,
    log_path: PathBuf,
    snapshot_path: PathBuf,
    file: File,
    appended_since_snapshot: u64,
}

impl EventLogStore {
    /// Read the persisted state for a session: the latest valid snapshot (if
    /// any) and every log record with `seq > snapshot.seq`, in order.
    ///
    /// A record that fails to parse ends replay at that point: it is either
    /// a torn trailing write or trailing corruption, and everything after it
    /// is untrustworthy.
    pub fn replay(
        data_dir: &Path,
        session_id: &str,
    ) -> Result<(Option<SessionSnapshot>, Vec<LogRecord>), BackendError> {
        let snapshot = match fs::read_to_string(snapshot_path(data_dir, session_id)) {
            Ok(text) => match serde_json::from_str::<SessionSnapshot>(&text) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "ignoring unreadable snapshot"
                    );
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let min_seq = snapshot.as_ref().map_or(0, |s| s.seq);

        let mut records = Vec::new();
        match File::open(log_path(data_dir, session_id)) {
            Ok(file) => {
                for (line_no, line) in BufReader::new(file).lines().enumerate() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogRecord>(&line) {
                        Ok(record) => {
                            if record.seq > min_seq {
                                records.push(record);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                session_id = %session_id,
                                line = line_no + 1,
                                error = %e,
                                "truncated or corrupt log tail; stopping replay here"
                            );
                            break;
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok((snapshot, records))
    }

    /// Open (or create) the append handle for a session's log.
    pub fn open(data_dir: &Path, session_id: &str) -> Result<Self, BackendError> {
        fs::create_dir_all(data_dir)?;
        let log_path = log_path(data_dir, session_id);
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        Ok(Self {
            session_id: session_id.to_string(),
            log_path,
            snapshot_path: snapshot_path(data_dir, session_id),
            file,
            appended_since_snapshot: 0,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Records appended since the last snapshot (or open). Drives the
    /// compaction trigger.
    pub fn appended_since_snapshot(&self) -> u64 {
        self.appended_since_snapshot
    }

    /// Durably append one record.
    ///
    /// On return the record has reached the disk. Fails only on underlying
    /// I/O error; the caller logs and continues with durability degraded.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), BackendError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;
        self.appended_since_snapshot += 1;
        Ok(())
    }

    /// Write a full snapshot and truncate the log to entries it covers.
    ///
    /// Sequence: temp file, fsync, atomic rename, then truncate. A crash at
    /// any point leaves either the old snapshot + full log or the new
    /// snapshot + (possibly still untruncated) log; both replay to the same
    /// state because replay skips records with `seq <= snapshot.seq`.
    pub fn snapshot(&mut self, snapshot: &SessionSnapshot) -> Result<(), BackendError> {
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(serde_json::to_string(snapshot)?.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.snapshot_path)?;

        self.file.set_len(0)?;
        self.file.sync_data()?;
        self.appended_since_snapshot = 0;

        tracing::debug!(
            session_id = %self.session_id,
            seq = snapshot.seq,
            objects = snapshot.objects.len(),
            "snapshot written, log truncated"
        );
        Ok(())
    }

    /// Path of the log file (for diagnostics).
    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
