//! Audit record types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{ActorId, HexString};

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
    Warning,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "success"),
            AuditStatus::Failure => write!(f, "failure"),
            AuditStatus::Warning => write!(f, "warning"),
        }
    }
}

/// Optional request metadata attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

/// One audited event, as covered by the HMAC.
///
/// Optional fields are always serialized (as `null`) so the canonical form
/// does not depend on which of them are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub actor_id: ActorId,
    pub action: String,
    pub resource: String,
    pub status: AuditStatus,
    /// Redacted details.
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl AuditRecord {
    /// Canonical JSON: compact, object keys sorted at every depth.
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&sorted(value))
    }
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub record: AuditRecord,
    pub hmac: HexString,
}

/// Result of checking every line of an audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Non-empty lines read.
    pub total: usize,
    /// Lines whose HMAC verified.
    pub valid: usize,
    /// 1-based line numbers whose HMAC did not verify.
    pub tampered: Vec<usize>,
    /// 1-based line numbers that did not parse as an entry.
    pub malformed: Vec<usize>,
}

impl AuditReport {
    /// True when every line parsed and verified.
    pub fn is_clean(&self) -> bool {
        self.tampered.is_empty() && self.malformed.is_empty()
    }
}
