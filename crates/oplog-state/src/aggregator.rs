//! Incremental flow aggregation over the operation change stream.
//!
//! The aggregator is a best-effort cache in front of a backend-owned log:
//! events may arrive out of order, be replayed after a reconnect, or refer
//! to operations it never saw. None of these are errors. Each ingest only
//! recomputes the flows it touched, and subscribers are told exactly which
//! operations and flows changed. Every derived [`FlowDisplayInfo`] carries
//! the revision of its flow, so caches further down can key on
//! `(flow_id, revision)` instead of recomputing unchanged flows.
//!
//! Lifecycle:
//! 1. `new()` / `default()` - create an aggregator owned by one view
//! 2. `subscribe()` - register listeners for change notifications
//! 3. `ingest()` - feed created/updated/deleted batches
//! 4. `dispose()` - drop listeners and cached state when the view closes

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use oplog_protocol::{EventKind, FlowId, OperationEvent, OperationId, OperationRecord};

use crate::display::{display_info_for_flow, should_hide_operation, FlowDisplayInfo};

/// Decides which operations are tracked at all.
pub type OperationFilter = Box<dyn Fn(&OperationRecord) -> bool + Send + Sync>;

/// Invoked synchronously after every ingest that changed something.
pub type Listener = Box<dyn FnMut(&OperationChange) + Send>;

/// What a single ingest changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationChange {
    /// Operations whose cached copy was added, replaced or removed.
    pub ids: Vec<OperationId>,
    /// Flows that were recomputed, in first-touched order.
    pub flow_ids: Vec<FlowId>,
    pub kind: EventKind,
}

/// Handle returned by [`FlowAggregator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct FlowState {
    ops: BTreeSet<OperationId>,
    /// Bumped whenever `ops` or one of its records changes.
    revision: u64,
}

/// Maintains `flow id -> FlowDisplayInfo` over a stream of operation events.
pub struct FlowAggregator {
    filter: OperationFilter,
    by_id: HashMap<OperationId, OperationRecord>,
    by_flow: HashMap<FlowId, FlowState>,
    /// Flows that should be displayed.
    visible: BTreeMap<FlowId, Arc<FlowDisplayInfo>>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    next_revision: u64,
}

impl FlowAggregator {
    /// Create an aggregator that only tracks operations accepted by `filter`.
    pub fn new(filter: impl Fn(&OperationRecord) -> bool + Send + Sync + 'static) -> Self {
        Self {
            filter: Box::new(filter),
            by_id: HashMap::new(),
            by_flow: HashMap::new(),
            visible: BTreeMap::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            next_revision: 0,
        }
    }

    /// Track every well-formed operation.
    pub fn tracking_all() -> Self {
        Self::new(|_| true)
    }

    /// Register a listener. Every listener receives every change.
    pub fn subscribe(&mut self, listener: impl FnMut(&OperationChange) + Send + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        tracing::debug!(subscription = id.0, listeners = self.listeners.len(), "Listener subscribed");
        id
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    /// Drop all listeners and cached state.
    pub fn dispose(&mut self) {
        tracing::debug!(
            listeners = self.listeners.len(),
            operations = self.by_id.len(),
            "Disposing flow aggregator"
        );
        self.listeners.clear();
        self.by_id.clear();
        self.by_flow.clear();
        self.visible.clear();
    }

    /// Apply one batch of changes and notify listeners.
    ///
    /// Returns the change that was broadcast, or `None` when the batch did
    /// not alter anything (a replay of known content, a stale revision,
    /// deletes of unknown ids).
    pub fn ingest(&mut self, event: OperationEvent) -> Option<OperationChange> {
        let kind = event.kind();
        let mut ids = Vec::new();
        let mut touched = Vec::new();

        match event {
            OperationEvent::Created(records) | OperationEvent::Updated(records) => {
                for record in records {
                    self.upsert(record, &mut ids, &mut touched);
                }
            }
            OperationEvent::Deleted(deleted) => {
                for id in deleted {
                    self.remove(id, &mut ids, &mut touched);
                }
            }
        }

        if touched.is_empty() {
            tracing::trace!(%kind, "Ingest changed nothing");
            return None;
        }

        for flow_id in &touched {
            self.refresh_flow(flow_id);
        }

        let change = OperationChange { ids, flow_ids: touched, kind };
        tracing::debug!(
            %kind,
            operations = change.ids.len(),
            flows = change.flow_ids.len(),
            "Operation log updated"
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change);
        }
        Some(change)
    }

    /// Operations of a flow ordered by id; empty if the flow is unknown.
    pub fn get_by_flow_id(&self, flow_id: &FlowId) -> Vec<&OperationRecord> {
        self.by_flow
            .get(flow_id)
            .map(|state| state.ops.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Display info of a visible flow.
    pub fn flow(&self, flow_id: &FlowId) -> Option<Arc<FlowDisplayInfo>> {
        self.visible.get(flow_id).cloned()
    }

    /// Snapshot of all visible flows, ordered by flow id.
    pub fn flows(&self) -> Vec<Arc<FlowDisplayInfo>> {
        self.visible.values().cloned().collect()
    }

    pub fn operation(&self, id: OperationId) -> Option<&OperationRecord> {
        self.by_id.get(&id)
    }

    /// Number of visible flows.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.by_id.len()
    }

    fn upsert(&mut self, record: OperationRecord, ids: &mut Vec<OperationId>, touched: &mut Vec<FlowId>) {
        if let Err(err) = record.validate() {
            tracing::warn!(error = %err, "Dropping malformed operation");
            return;
        }
        let id = record.id;

        if !(self.filter)(&record) {
            // An update may move a tracked operation out of the filter.
            let tracked = self
                .by_id
                .get(&id)
                .is_some_and(|existing| existing.modno <= record.modno);
            if tracked {
                self.remove(id, ids, touched);
            }
            return;
        }

        if let Some(existing) = self.by_id.get(&id) {
            if existing.modno > record.modno {
                tracing::debug!(
                    op_id = %id,
                    cached = existing.modno,
                    received = record.modno,
                    "Ignoring stale operation revision"
                );
                return;
            }
            if *existing == record {
                return;
            }
            if existing.flow_id != record.flow_id {
                let old_flow = existing.flow_id.clone();
                self.detach(&old_flow, id, touched);
            }
        }

        let flow_id = record.flow_id.clone();
        self.by_id.insert(id, record);
        let revision = self.bump_revision();
        let state = self.by_flow.entry(flow_id.clone()).or_default();
        state.ops.insert(id);
        state.revision = revision;

        push_unique(ids, id);
        push_unique(touched, flow_id);
    }

    fn remove(&mut self, id: OperationId, ids: &mut Vec<OperationId>, touched: &mut Vec<FlowId>) {
        match self.by_id.remove(&id) {
            Some(record) => {
                self.detach(&record.flow_id, id, touched);
                push_unique(ids, id);
            }
            None => tracing::debug!(op_id = %id, "Ignoring delete of unknown operation"),
        }
    }

    fn detach(&mut self, flow_id: &FlowId, id: OperationId, touched: &mut Vec<FlowId>) {
        let revision = self.bump_revision();
        if let Some(state) = self.by_flow.get_mut(flow_id) {
            state.ops.remove(&id);
            state.revision = revision;
            push_unique(touched, flow_id.clone());
        }
    }

    /// Recompute one flow from its own operations, or drop it once empty.
    fn refresh_flow(&mut self, flow_id: &FlowId) {
        let revision = match self.by_flow.get(flow_id) {
            Some(state) if !state.ops.is_empty() => state.revision,
            _ => {
                self.by_flow.remove(flow_id);
                self.visible.remove(flow_id);
                return;
            }
        };

        let ops: Vec<OperationRecord> = self
            .get_by_flow_id(flow_id)
            .into_iter()
            .cloned()
            .collect();
        let Some(mut info) = display_info_for_flow(&ops) else {
            return;
        };
        info.revision = revision;

        if info.hidden {
            tracing::trace!(flow_id = %flow_id, "Flow hidden");
            self.visible.remove(flow_id);
        } else {
            self.visible.insert(flow_id.clone(), Arc::new(info));
        }
    }

    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

impl Default for FlowAggregator {
    /// Tracks everything [`should_hide_operation`] does not hide.
    fn default() -> Self {
        Self::new(|op| !should_hide_operation(op))
    }
}

impl fmt::Debug for FlowAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowAggregator")
            .field("operations", &self.by_id.len())
            .field("flows", &self.by_flow.len())
            .field("visible", &self.visible.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}
