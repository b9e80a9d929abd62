use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{OperationId, OperationRecord};

/// Kind of change carried by an [`OperationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// A batch of changes delivered by the backend change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum OperationEvent {
    Created(Vec<OperationRecord>),
    Updated(Vec<OperationRecord>),
    Deleted(Vec<OperationId>),
}

impl OperationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Deleted(_) => EventKind::Deleted,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Created(records) | Self::Updated(records) => records.len(),
            Self::Deleted(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse one event from a JSON line.
    pub fn from_json(line: &str) -> Result<Self, crate::ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}
