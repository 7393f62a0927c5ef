//! Migrations: named, chained, persisted batches of changesets for one phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::changeset::{Changeset, DdlOp, Phase};

/// Timestamp format of generated migration names. Sorts lexicographically.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A persisted migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Sortable identifier, `<timestamp>_<suffix>`.
    pub name: String,
    /// Phase the migration belongs to.
    pub phase: Phase,
    /// Previous migration of the phase, `None` for the first one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Run all statements inside one transaction.
    pub transaction: bool,
    /// Created by hand rather than by the planner.
    #[serde(default)]
    pub scaffolded: bool,
    /// Log every statement at info level.
    #[serde(default)]
    pub debug: bool,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// SHA-256 of the up statements.
    pub checksum: String,
    /// Forward statements.
    pub up: Vec<DdlOp>,
    /// Undo statements, in execution order.
    pub down: Vec<DdlOp>,
}

impl Migration {
    /// Combine ordered changesets of one phase.
    ///
    /// `up` concatenates the changesets in order; `down` undoes them last
    /// first. The migration is transactional only if every changeset is.
    pub fn from_changesets(
        name: impl Into<String>,
        phase: Phase,
        depends_on: Option<String>,
        changesets: &[&Changeset],
    ) -> Self {
        let up: Vec<DdlOp> = changesets
            .iter()
            .flat_map(|cs| cs.up.iter().cloned())
            .collect();
        let down = changesets
            .iter()
            .rev()
            .flat_map(|cs| cs.down.iter().cloned())
            .collect();

        Self {
            name: name.into(),
            phase,
            depends_on,
            transaction: changesets.iter().all(|cs| cs.transaction),
            scaffolded: false,
            debug: changesets.iter().any(|cs| cs.debug),
            description: None,
            checksum: compute_checksum(&up),
            up,
            down,
        }
    }

    /// An empty, hand-written migration.
    pub fn scaffold(name: impl Into<String>, phase: Phase, depends_on: Option<String>) -> Self {
        Self {
            name: name.into(),
            phase,
            depends_on,
            transaction: true,
            scaffolded: true,
            debug: false,
            description: None,
            checksum: compute_checksum(&[]),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a forward statement and refresh the checksum.
    pub fn push_up(&mut self, sql: impl Into<String>) {
        self.up.push(DdlOp::new(sql));
        self.checksum = compute_checksum(&self.up);
    }

    /// Append an undo statement.
    pub fn push_down(&mut self, sql: impl Into<String>) {
        self.down.push(DdlOp::new(sql));
    }

    /// Whether the stored checksum matches the up statements.
    pub fn verify_checksum(&self) -> bool {
        compute_checksum(&self.up) == self.checksum
    }

    /// Whether the migration can be rolled back.
    pub fn is_reversible(&self) -> bool {
        self.up.is_empty() || !self.down.is_empty()
    }
}

/// Name for a migration generated at `timestamp` with `suffix`.
pub fn migration_name(timestamp: DateTime<Utc>, suffix: &str) -> String {
    format!("{}_{}", timestamp.format(NAME_TIMESTAMP_FORMAT), slug(suffix))
}

/// SHA-256 hex digest of the statements, one per line.
pub fn compute_checksum(up: &[DdlOp]) -> String {
    let mut hasher = Sha256::new();
    for op in up {
        hasher.update(op.sql.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
