//! Derivation of the display summary of a flow from its operations.
//!
//! The primary operation of a flow is the one with the lowest id: it is the
//! operation that started the run, everything after it (hooks, the snapshot
//! index, a follow-up forget) was triggered by it. The primary operation
//! decides the display type, time and subtitle; the status is folded over
//! every operation so that a failed hook still marks the whole flow.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use oplog_protocol::{
    BackupProgress, FlowId, OperationKind, OperationRecord, OperationStatus, RestoreMessageType,
};

use crate::formatting::{format_bytes, format_duration, normalize_snapshot_id};

/// Durations at or below this are not worth a "took ..." subtitle.
const MIN_REPORTED_DURATION_MS: i64 = 100;

/// Display classification of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    Unknown,
    Backup,
    Snapshot,
    Forget,
    Prune,
    Check,
    Restore,
    Stats,
    RunHook,
    RunCommand,
}

impl DisplayType {
    pub fn for_operation(op: &OperationKind) -> Self {
        match op {
            OperationKind::Backup { .. } => Self::Backup,
            OperationKind::IndexSnapshot { .. } => Self::Snapshot,
            OperationKind::Forget => Self::Forget,
            OperationKind::Prune { .. } => Self::Prune,
            OperationKind::Check { .. } => Self::Check,
            OperationKind::Restore { .. } => Self::Restore,
            OperationKind::Stats => Self::Stats,
            OperationKind::RunHook { .. } => Self::RunHook,
            OperationKind::RunCommand { .. } => Self::RunCommand,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Backup => "Backup",
            Self::Snapshot => "Snapshot",
            Self::Forget => "Forget",
            Self::Prune => "Prune",
            Self::Check => "Check",
            Self::Restore => "Restore",
            Self::Stats => "Stats",
            Self::RunHook => "Run Hook",
            Self::RunCommand => "Run Command",
        }
    }
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display-ready summary of one flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDisplayInfo {
    pub flow_id: FlowId,
    pub instance_id: String,
    pub plan_id: String,
    pub repo_id: String,
    pub snapshot_id: Option<String>,
    /// Worst status across every operation of the flow.
    pub status: OperationStatus,
    pub display_time: DateTime<Utc>,
    pub display_type: DisplayType,
    pub subtitle_components: Vec<String>,
    pub hidden: bool,
    /// Ordered by operation id.
    pub operations: Vec<OperationRecord>,
    /// Aggregator revision this info was derived at; bumps whenever the
    /// flow's operations change. Zero outside an aggregator.
    pub revision: u64,
}

impl FlowDisplayInfo {
    /// The operation that started the flow.
    pub fn primary(&self) -> Option<&OperationRecord> {
        self.operations.first()
    }

    /// The snapshot-index operation of the flow, if one was recorded.
    pub fn snapshot_operation(&self) -> Option<&OperationRecord> {
        self.operations
            .iter()
            .find(|op| matches!(op.op, OperationKind::IndexSnapshot { .. }))
    }
}

/// Operations a view never displays: stats runs, hooks that succeeded and
/// anything the system cancelled before it ran.
pub fn should_hide_operation(op: &OperationRecord) -> bool {
    match op.op {
        OperationKind::Stats => true,
        OperationKind::RunHook { .. } if op.status == OperationStatus::Success => true,
        _ => op.status == OperationStatus::SystemCancelled,
    }
}

/// Derive the display summary of a flow. Input order does not matter.
/// Returns `None` for an empty operation set.
pub fn display_info_for_flow(ops: &[OperationRecord]) -> Option<FlowDisplayInfo> {
    let mut operations = ops.to_vec();
    operations.sort_by_key(|op| op.id);
    let first = operations.first()?;

    let mut info = FlowDisplayInfo {
        flow_id: first.flow_id.clone(),
        instance_id: first.instance_id.clone(),
        plan_id: first.plan_id.clone(),
        repo_id: first.repo_id.clone(),
        snapshot_id: first.snapshot_id.clone(),
        status: first.status,
        display_time: first.start_time,
        display_type: DisplayType::for_operation(&first.op),
        subtitle_components: subtitle_for(first),
        // Hooks sort after the operation that triggered them, so a hook in
        // first position means its parent is gone.
        hidden: first.op.is_run_hook(),
        operations: Vec::new(),
        revision: 0,
    };

    for op in &operations {
        if let OperationKind::IndexSnapshot { snapshot, forgot } = &op.op {
            if let Some(snapshot) = snapshot {
                info.snapshot_id = Some(snapshot.id.clone());
            }
            if *forgot {
                info.hidden = true;
            }
        }
        if let Some(ref snapshot_id) = op.snapshot_id {
            info.snapshot_id = Some(snapshot_id.clone());
        }
        info.status = info.status.worst(op.status);
    }

    info.operations = operations;
    Some(info)
}

fn subtitle_for(op: &OperationRecord) -> Vec<String> {
    let duration = op.duration_ms();
    let mut parts = Vec::new();

    match &op.op {
        OperationKind::Backup { last_status: Some(progress) } => {
            match progress {
                BackupProgress::Status { percent_done, bytes_done, total_bytes } => {
                    parts.push(format!("{:.2}% processed", percent_done * 100.0));
                    parts.push(format!(
                        "{}/{}",
                        format_bytes(*bytes_done),
                        format_bytes(*total_bytes)
                    ));
                }
                BackupProgress::Summary { total_bytes_processed, snapshot_id } => {
                    parts.push(format!(
                        "{} in {}",
                        format_bytes(*total_bytes_processed),
                        format_duration(duration)
                    ));
                    parts.push(format!("ID: {}", normalize_snapshot_id(snapshot_id)));
                }
            }
            return parts;
        }
        OperationKind::Backup { last_status: None } => return parts,
        OperationKind::Restore { last_status, .. } => {
            if let Some(progress) = last_status {
                match progress.message_type {
                    RestoreMessageType::Summary => parts.push(format!(
                        "{} in {}",
                        format_bytes(progress.total_bytes),
                        format_duration(duration)
                    )),
                    RestoreMessageType::Status => parts.push(format!(
                        "{:.2}% processed",
                        progress.percent_done * 100.0
                    )),
                }
            }
            return parts;
        }
        OperationKind::IndexSnapshot { snapshot: Some(snapshot), .. } => {
            if let Some(summary) = snapshot.summary.as_ref().filter(|s| s.total_bytes_processed > 0) {
                parts.push(format!(
                    "{} in {}",
                    format_bytes(summary.total_bytes_processed),
                    format_duration((summary.total_duration_secs * 1000.0) as i64)
                ));
            }
            parts.push(format!("ID: {}", normalize_snapshot_id(&snapshot.id)));
        }
        _ => {}
    }

    match op.status {
        OperationStatus::InProgress => parts.push("running".to_string()),
        OperationStatus::UserCancelled => parts.push("cancelled by user".to_string()),
        OperationStatus::SystemCancelled => parts.push("cancelled by system".to_string()),
        _ if duration > MIN_REPORTED_DURATION_MS => {
            parts.push(format!("took {}", format_duration(duration)))
        }
        _ => {}
    }
    parts
}
