//! Replaying a JSON-lines log of operation events.

use std::io::BufRead;

use oplog_protocol::OperationEvent;
use oplog_state::FlowAggregator;

use crate::ConnectorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    /// Events that changed the aggregator.
    pub applied: usize,
    /// Lines that did not parse as an event.
    pub skipped: usize,
}

/// Ingest one event per line. Blank lines are ignored and unparseable
/// lines are logged and skipped; only read errors abort the replay.
pub fn replay_lines<R: BufRead>(
    aggregator: &mut FlowAggregator,
    reader: R,
) -> Result<ReplayStats, ConnectorError> {
    let mut stats = ReplayStats::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match OperationEvent::from_json(&line) {
            Ok(event) => {
                stats.events += 1;
                if aggregator.ingest(event).is_some() {
                    stats.applied += 1;
                }
            }
            Err(e) => {
                stats.skipped += 1;
                tracing::warn!(line = index + 1, error = %e, "Skipping malformed event");
            }
        }
    }
    tracing::info!(
        events = stats.events,
        applied = stats.applied,
        skipped = stats.skipped,
        "Event log replayed"
    );
    Ok(stats)
}
