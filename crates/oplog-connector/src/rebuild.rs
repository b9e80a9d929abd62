//! Debounced tree rebuilds.
//!
//! Change notifications tend to come in bursts (a running backup reports
//! progress several times a second), so the rebuilder waits `debounce`
//! after the first notification and folds everything that arrived in the
//! meantime into a single rebuild. The first tree is built immediately.
//! Leaves of flows whose revision did not change are reused from a
//! [`LeafCache`] kept for the lifetime of the rebuilder.
//!
//! Dropping the rebuilder stops the task and removes its listener from the
//! aggregator.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use oplog_hierarchy::{LeafCache, OperationTree, TreeBuilder};
use oplog_state::SubscriptionId;

use crate::sync::SharedAggregator;
use crate::ConnectorError;

/// Latest operation tree, republished after every coalesced change.
#[derive(Debug)]
pub struct TreeRebuilder {
    tree: watch::Receiver<Arc<OperationTree>>,
    task: JoinHandle<()>,
    aggregator: SharedAggregator,
    subscription: SubscriptionId,
}

impl TreeRebuilder {
    pub fn current(&self) -> Arc<OperationTree> {
        self.tree.borrow().clone()
    }

    /// Wait for the next rebuild and return its tree.
    pub async fn changed(&mut self) -> Result<Arc<OperationTree>, ConnectorError> {
        self.tree
            .changed()
            .await
            .map_err(|_| ConnectorError::RebuilderStopped)?;
        Ok(self.tree.borrow_and_update().clone())
    }

    /// Additional receiver for another consumer of the tree.
    pub fn watch(&self) -> watch::Receiver<Arc<OperationTree>> {
        self.tree.clone()
    }
}

impl Drop for TreeRebuilder {
    fn drop(&mut self) {
        self.task.abort();
        let subscription = self.subscription;
        match self.aggregator.try_lock() {
            Ok(mut aggregator) => {
                aggregator.unsubscribe(subscription);
            }
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let aggregator = Arc::clone(&self.aggregator);
                    runtime.spawn(async move {
                        aggregator.lock().await.unsubscribe(subscription);
                    });
                }
                Err(_) => tracing::warn!(
                    subscription = ?subscription,
                    "Aggregator busy and no runtime, rebuilder listener left subscribed"
                ),
            },
        }
    }
}

/// Build the tree for the current contents of `aggregator` and rebuild it
/// whenever the aggregator reports a change.
pub async fn spawn_tree_rebuilder<Tz>(
    aggregator: SharedAggregator,
    builder: TreeBuilder<Tz>,
    debounce: Duration,
) -> TreeRebuilder
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: fmt::Display,
{
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<()>();
    let mut cache = LeafCache::new();
    let (initial, subscription) = {
        let mut guard = aggregator.lock().await;
        let subscription = guard.subscribe(move |_| {
            let _ = notify_tx.send(());
        });
        (builder.build_cached(&guard.flows(), &mut cache), subscription)
    };
    let (tree_tx, tree_rx) = watch::channel(Arc::new(initial));

    let shared = Arc::clone(&aggregator);
    let task = tokio::spawn(async move {
        let mut rebuilds: u64 = 0;
        while notify_rx.recv().await.is_some() {
            tokio::time::sleep(debounce).await;
            let mut coalesced = 1;
            while notify_rx.try_recv().is_ok() {
                coalesced += 1;
            }

            let flows = shared.lock().await.flows();
            let tree = builder.build_cached(&flows, &mut cache);
            rebuilds += 1;
            tracing::debug!(
                rebuilds,
                coalesced,
                flows = flows.len(),
                reused = cache.hits(),
                "Operation tree rebuilt"
            );
            if tree_tx.send(Arc::new(tree)).is_err() {
                break;
            }
        }
        shared.lock().await.unsubscribe(subscription);
    });

    TreeRebuilder { tree: tree_rx, task, aggregator, subscription }
}
