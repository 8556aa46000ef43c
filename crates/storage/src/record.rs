use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Surrogate key of a flag. Assigned by the backend, never reused.
pub type FlagId = i64;

/// Actor recorded for system-initiated changes.
pub const SYSTEM_ACTOR: &str = "system";

/// A flag row together with its outgoing dependency edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub id: FlagId,
    pub name: String,
    pub is_active: bool,
    /// Ids this flag depends on, in insertion order.
    pub dependencies: Vec<FlagId>,
}

impl FlagRecord {
    /// Detached copy of the state this record carries right now.
    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            name: self.name.clone(),
            is_active: self.is_active,
            dependencies: self.dependencies.clone(),
        }
    }
}

/// Point-in-time copy of a flag, stored inside audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    pub name: String,
    pub is_active: bool,
    pub dependencies: Vec<FlagId>,
}

/// The kind of state change an audit entry documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditOperation {
    Create,
    Activate,
    Deactivate,
    AutoDisable,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOperation::Create => "create",
            AuditOperation::Activate => "activate",
            AuditOperation::Deactivate => "deactivate",
            AuditOperation::AutoDisable => "auto-disable",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit operation: {0}")]
pub struct ParseOperationError(pub String);

impl FromStr for AuditOperation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditOperation::Create),
            "activate" => Ok(AuditOperation::Activate),
            "deactivate" => Ok(AuditOperation::Deactivate),
            "auto-disable" => Ok(AuditOperation::AutoDisable),
            other => Err(ParseOperationError(other.to_string())),
        }
    }
}

/// An audit entry as handed to the backend. Id and timestamp are assigned
/// on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditLogEntry {
    pub flag_id: FlagId,
    pub flag_name: String,
    pub operation: AuditOperation,
    pub previous_state: Option<FlagSnapshot>,
    pub new_state: Option<FlagSnapshot>,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

/// A persisted, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub flag_id: FlagId,
    /// Denormalized so history survives renames.
    pub flag_name: String,
    pub operation: AuditOperation,
    pub previous_state: Option<FlagSnapshot>,
    pub new_state: Option<FlagSnapshot>,
    pub reason: Option<String>,
    pub actor: Option<String>,
    /// RFC 3339 timestamp string, non-decreasing in id order.
    pub timestamp: String,
}

impl AuditLogEntry {
    /// Build the persisted form of `entry` with backend-assigned fields.
    pub fn from_new(id: i64, timestamp: String, entry: NewAuditLogEntry) -> Self {
        AuditLogEntry {
            id,
            flag_id: entry.flag_id,
            flag_name: entry.flag_name,
            operation: entry.operation,
            previous_state: entry.previous_state,
            new_state: entry.new_state,
            reason: entry.reason,
            actor: entry.actor,
            timestamp,
        }
    }
}

/// Filters for audit log queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub flag_id: Option<FlagId>,
    pub operation: Option<AuditOperation>,
    pub actor: Option<String>,
}

impl AuditLogFilter {
    pub fn for_flag(flag_id: FlagId) -> Self {
        AuditLogFilter {
            flag_id: Some(flag_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.flag_id.map_or(true, |id| entry.flag_id == id)
            && self.operation.map_or(true, |op| entry.operation == op)
            && self
                .actor
                .as_deref()
                .map_or(true, |actor| entry.actor.as_deref() == Some(actor))
    }
}
