//! Seeding and following the backend operation log.
//!
//! A sync session subscribes to the change stream, fetches the current
//! operations matching the selector and then applies stream events as they
//! arrive. When the stream ends or fails the session starts over after
//! `resync_delay`; replayed records are absorbed by the aggregator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use oplog_protocol::{OperationEvent, OperationRecord, OperationSelector};
use oplog_state::FlowAggregator;

use crate::ConnectorError;

/// Aggregator shared between the sync task, rebuilders and readers.
pub type SharedAggregator = Arc<Mutex<FlowAggregator>>;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<OperationEvent, ConnectorError>> + Send>>;

pub fn shared(aggregator: FlowAggregator) -> SharedAggregator {
    Arc::new(Mutex::new(aggregator))
}

/// Backend that owns the operation log.
pub trait OperationSource: Send + Sync {
    /// Fetch every operation currently matching `selector`.
    fn fetch<'a>(
        &'a self,
        selector: &'a OperationSelector,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OperationRecord>, ConnectorError>> + Send + 'a>>;

    /// Open the change stream. Events are unscoped; the caller filters them.
    fn subscribe<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ConnectorError>> + Send + 'a>>;
}

/// Running sync session. Dropping the handle stops it.
#[derive(Debug)]
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task that seeds `aggregator` from `source` and keeps it current.
pub fn sync_from_source<S>(
    aggregator: SharedAggregator,
    source: Arc<S>,
    selector: OperationSelector,
    resync_delay: Duration,
) -> SyncHandle
where
    S: OperationSource + 'static,
{
    let task = tokio::spawn(async move {
        let mut session: u64 = 0;
        loop {
            session += 1;
            match sync_session(&aggregator, source.as_ref(), &selector).await {
                Ok(()) => tracing::info!(session, "Operation stream closed, resyncing"),
                Err(e) => tracing::warn!(session, error = %e, "Operation sync failed, retrying"),
            }
            tokio::time::sleep(resync_delay).await;
        }
    });
    SyncHandle { task }
}

async fn sync_session<S: OperationSource>(
    aggregator: &SharedAggregator,
    source: &S,
    selector: &OperationSelector,
) -> Result<(), ConnectorError> {
    // Subscribe first so changes made while fetching are not lost.
    let mut stream = source.subscribe().await?;
    let records = source.fetch(selector).await?;
    tracing::info!(operations = records.len(), "Seeding operation log");
    aggregator.lock().await.ingest(OperationEvent::Created(records));

    while let Some(event) = stream.next().await {
        if let Some(event) = scope_event(event?, selector) {
            aggregator.lock().await.ingest(event);
        }
    }
    Ok(())
}

/// Restrict a stream event to the records matching `selector`.
///
/// Deletes carry only ids and pass through unchanged; deleting an id the
/// view never tracked is a no-op. Returns `None` when nothing is left.
pub fn scope_event(event: OperationEvent, selector: &OperationSelector) -> Option<OperationEvent> {
    let scoped = match event {
        OperationEvent::Created(records) => {
            OperationEvent::Created(records.into_iter().filter(|r| selector.matches(r)).collect())
        }
        OperationEvent::Updated(records) => {
            OperationEvent::Updated(records.into_iter().filter(|r| selector.matches(r)).collect())
        }
        deleted @ OperationEvent::Deleted(_) => deleted,
    };
    (!scoped.is_empty()).then_some(scoped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oplog_protocol::{OperationId, OperationKind};

    fn record(id: i64, plan: &str) -> OperationRecord {
        let mut op = OperationRecord::new(id, format!("flow-{id}"), OperationKind::Forget);
        op.repo_id = "repo".into();
        op.plan_id = plan.into();
        op
    }

    #[test]
    fn test_scope_event_filters_records() {
        let selector = OperationSelector::for_plan("repo", "daily");
        let event = OperationEvent::Updated(vec![record(1, "daily"), record(2, "weekly")]);

        let Some(OperationEvent::Updated(kept)) = scope_event(event, &selector) else {
            panic!("expected an update");
        };
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, OperationId(1));
    }

    #[test]
    fn test_scope_event_drops_empty_batches() {
        let selector = OperationSelector::for_plan("repo", "daily");
        let event = OperationEvent::Created(vec![record(2, "weekly")]);
        assert!(scope_event(event, &selector).is_none());
    }

    #[test]
    fn test_scope_event_keeps_deletes() {
        let selector = OperationSelector::for_plan("repo", "daily");
        let event = OperationEvent::Deleted(vec![OperationId(9)]);
        assert_eq!(scope_event(event.clone(), &selector), Some(event));
    }
}
