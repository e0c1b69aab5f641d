//! Append-only line-delimited JSON audit log.
//!
//! Every repository mutation is mirrored here before the writer returns.
//! Each line is a complete object `{timestamp, type, data}`; files live
//! under the project's snapshot directory with date-stamped names.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{CoreError, CoreResult};

/// One audit line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl AuditRecord {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: kind.into(),
            data,
        }
    }
}

/// Append-only writer over one audit channel file.
#[derive(Clone)]
pub struct AuditLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl AuditLog {
    /// Open (creating parents as needed) the channel file in append mode.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Date-stamped channel file under `dir`.
    pub fn daily(dir: impl AsRef<Path>, channel: &str) -> CoreResult<Self> {
        let name = format!("{}-{}.jsonl", channel, Utc::now().format("%Y%m%d"));
        Self::open(dir.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn append(&self, kind: impl Into<String>, data: Value) -> CoreResult<()> {
        self.append_batch(vec![AuditRecord::new(kind, data)])
    }

    /// Append many records as a single write.
    pub fn append_batch(&self, records: Vec<AuditRecord>) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for record in &records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        let mut file = self
            .file
            .lock()
            .map_err(|e| CoreError::External(format!("audit log mutex poisoned: {e}")))?;
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Scan every line back into records. Malformed lines are skipped.
    pub fn read_all(&self) -> CoreResult<Vec<AuditRecord>> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Records whose `type` matches exactly.
    pub fn filter_by_type(&self, kind: &str) -> CoreResult<Vec<AuditRecord>> {
        Ok(self.read_all()?.into_iter().filter(|r| r.kind == kind).collect())
    }

    /// Total number of well-formed lines.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.read_all()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn append_writes_complete_json_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path().join("snapshots/audit.jsonl")).unwrap();

        log.append("trace.add", json!({"id": "abc"})).unwrap();
        log.append("knowledge_item.add", json!({"id": "def"})).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "trace.add");
        assert_eq!(records[1].data["id"], "def");
    }

    #[test]
    fn batch_append_is_one_write() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();

        let batch = vec![
            AuditRecord::new("a.add", json!(1)),
            AuditRecord::new("b.add", json!(2)),
            AuditRecord::new("a.add", json!(3)),
        ];
        log.append_batch(batch).unwrap();

        assert_eq!(log.count().unwrap(), 3);
        assert_eq!(log.filter_by_type("a.add").unwrap().len(), 2);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/audit.jsonl");
        let _log = AuditLog::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn malformed_lines_are_skipped_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.append("ok.add", json!({})).unwrap();
        std::fs::write(&path, "not json\n{\"timestamp\":\"2026-01-01T00:00:00Z\",\"type\":\"ok.add\",\"data\":{}}\n").unwrap();
        assert_eq!(log.count().unwrap(), 1);
    }
}
