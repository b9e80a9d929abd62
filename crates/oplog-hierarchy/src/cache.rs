//! Leaf nodes memoized across rebuilds.
//!
//! A leaf depends only on its flow's content and the builder's timezone, so
//! it is cached under `(flow_id, revision)`. Entries for flows missing from
//! a build are expired at the end of that build. A cache belongs to one
//! [`TreeBuilder`](crate::TreeBuilder); titles from another timezone would
//! otherwise leak in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use oplog_protocol::FlowId;
use oplog_state::FlowDisplayInfo;

use crate::tree::TreeNode;

#[derive(Debug, Default)]
pub struct LeafCache {
    entries: HashMap<FlowId, (u64, TreeNode)>,
    hits: usize,
    misses: usize,
}

impl LeafCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Leaves reused during the last build.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Leaves created during the last build.
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub(crate) fn begin(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    pub(crate) fn leaf(
        &mut self,
        flow: &Arc<FlowDisplayInfo>,
        make: impl FnOnce() -> TreeNode,
    ) -> TreeNode {
        let cached = self
            .entries
            .get(&flow.flow_id)
            .filter(|(revision, _)| *revision == flow.revision)
            .map(|(_, node)| node.clone());
        if let Some(node) = cached {
            self.hits += 1;
            return node;
        }
        self.misses += 1;
        let node = make();
        self.entries
            .insert(flow.flow_id.clone(), (flow.revision, node.clone()));
        node
    }

    /// Drop entries for flows that were not part of the last build.
    pub(crate) fn expire(&mut self, live: &HashSet<&FlowId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|flow_id, _| live.contains(flow_id));
        before - self.entries.len()
    }
}
