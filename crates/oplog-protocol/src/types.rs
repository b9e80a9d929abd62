use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-assigned identifier of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub i64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OperationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Groups the operations of one logical run (a backup plus the hooks it
/// triggered, for example). An empty id marks a malformed record.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_missing(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FlowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Status reported by the backup engine for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Unknown,
    /// Queued, not started yet
    Pending,
    InProgress,
    Success,
    /// Finished, but with recoverable problems
    Warning,
    Error,
    UserCancelled,
    SystemCancelled,
}

impl OperationStatus {
    /// Rank used when folding the statuses of a flow: the highest rank wins.
    pub fn severity(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Success => 1,
            Self::Pending => 2,
            Self::InProgress => 3,
            Self::SystemCancelled => 4,
            Self::UserCancelled => 5,
            Self::Warning => 6,
            Self::Error => 7,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::UserCancelled => "cancelled by user",
            Self::SystemCancelled => "cancelled by system",
        };
        write!(f, "{s}")
    }
}

/// Last progress report of a running or finished backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum BackupProgress {
    Status {
        /// Fraction in `0.0..=1.0`
        percent_done: f64,
        bytes_done: u64,
        total_bytes: u64,
    },
    Summary {
        total_bytes_processed: u64,
        snapshot_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub total_bytes_processed: u64,
    pub total_duration_secs: f64,
}

/// A snapshot as indexed from the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    #[serde(default)]
    pub summary: Option<SnapshotSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMessageType {
    Status,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreProgress {
    pub message_type: RestoreMessageType,
    pub percent_done: f64,
    pub total_bytes: u64,
}

/// Kind of work an operation performs, with the kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Backup {
        #[serde(default)]
        last_status: Option<BackupProgress>,
    },
    IndexSnapshot {
        #[serde(default)]
        snapshot: Option<SnapshotInfo>,
        /// Set once the snapshot has been forgotten from the repository.
        #[serde(default)]
        forgot: bool,
    },
    Forget,
    Prune {
        #[serde(default)]
        output: String,
    },
    Check {
        #[serde(default)]
        output: String,
    },
    Restore {
        #[serde(default)]
        last_status: Option<RestoreProgress>,
        #[serde(default)]
        target: String,
    },
    Stats,
    RunCommand {
        command: String,
    },
    RunHook {
        name: String,
        #[serde(default)]
        condition: String,
        /// The operation whose lifecycle triggered this hook.
        #[serde(default)]
        parent_op: Option<OperationId>,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Backup { .. } => "backup",
            Self::IndexSnapshot { .. } => "index_snapshot",
            Self::Forget => "forget",
            Self::Prune { .. } => "prune",
            Self::Check { .. } => "check",
            Self::Restore { .. } => "restore",
            Self::Stats => "stats",
            Self::RunCommand { .. } => "run_command",
            Self::RunHook { .. } => "run_hook",
        }
    }

    pub fn is_run_hook(&self) -> bool {
        matches!(self, Self::RunHook { .. })
    }
}

/// A single unit of backend-reported work, as cached by the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    /// Backend revision of this record; higher wins.
    #[serde(default)]
    pub modno: i64,
    #[serde(default)]
    pub flow_id: FlowId,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub repo_id: String,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub display_message: Option<String>,
    pub op: OperationKind,
}

impl OperationRecord {
    pub fn new(id: i64, flow_id: impl Into<FlowId>, op: OperationKind) -> Self {
        Self {
            id: OperationId(id),
            modno: 0,
            flow_id: flow_id.into(),
            instance_id: String::new(),
            plan_id: String::new(),
            repo_id: String::new(),
            snapshot_id: None,
            status: OperationStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            display_message: None,
            op,
        }
    }

    /// Records without a flow id cannot be grouped and are dropped by views.
    pub fn validate(&self) -> Result<(), crate::ProtocolError> {
        if self.flow_id.is_missing() {
            return Err(crate::ProtocolError::InvalidRecord {
                id: self.id.0,
                reason: "missing flow id".into(),
            });
        }
        Ok(())
    }

    /// Wall-clock duration in milliseconds, zero while the operation has no end time.
    pub fn duration_ms(&self) -> i64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0))
            .unwrap_or(0)
    }
}
