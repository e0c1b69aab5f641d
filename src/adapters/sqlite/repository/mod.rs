//! Typed repository over the engram store.
//!
//! The repository is the only surface that touches the pool. Every `add` is
//! idempotent: the content id is computed from creation inputs, the insert
//! is conflict-tolerant, and a no-op insert returns the existing row.
//! Successful mutations are mirrored to the audit log before returning.

mod bbon;
mod knowledge;
mod memory;
mod traces;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::adapters::audit::AuditLog;
use crate::domain::errors::CoreResult;

pub struct EngramRepository {
    pool: SqlitePool,
    audit: AuditLog,
}

impl EngramRepository {
    pub fn new(pool: SqlitePool, audit: AuditLog) -> Self {
        Self { pool, audit }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Mirror one mutation to the audit channel as `{timestamp, type, data}`
    /// with the full row image.
    fn record<T: Serialize>(&self, kind: &str, row: &T) -> CoreResult<()> {
        self.audit.append(kind, serde_json::to_value(row)?)
    }
}
