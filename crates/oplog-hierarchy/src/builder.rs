//! Grouping of flows into the instance / plan / day / flow hierarchy.
//!
//! Every level is grouped through a `BTreeMap` and then sorted explicitly,
//! so the same input always yields the same tree.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use oplog_protocol::{FlowId, SYSTEM_PLAN_ID, UNASSOCIATED_ID};
use oplog_state::FlowDisplayInfo;

use crate::cache::LeafCache;
use crate::expansion::ExpansionPolicy;
use crate::tree::{FlowLeaf, GroupLabel, NodeContent, OperationTree, TreeMode, TreeNode};

/// Separates the plan and instance parts of a plan node key.
const KEY_SEPARATOR: char = '\x01';

const UNASSOCIATED_INSTANCE_HELP: &str = "The _unassociated_ instance collects operations \
     without a created-by tag naming the installation that created them.";
const UNASSOCIATED_PLAN_HELP: &str = "The _unassociated_ plan collects operations without \
     a plan tag naming the backup plan that created them.";
const SYSTEM_PLAN_HELP: &str = "The _system_ plan collects repository-level operations \
     not tied to any single plan, such as checks or prune runs.";

#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Overrides the per-mode expansion defaults.
    pub expansion: Option<ExpansionPolicy>,
    /// Only expand nodes under this instance (repo-scoped trees).
    pub expand_instance: Option<String>,
}

/// Builds an [`OperationTree`] from a snapshot of flows.
///
/// Days are calendar days in the builder's timezone, the viewer's local
/// one unless given explicitly.
#[derive(Debug, Clone)]
pub struct TreeBuilder<Tz: TimeZone = Local> {
    mode: TreeMode,
    options: TreeOptions,
    tz: Tz,
}

impl TreeBuilder<Local> {
    pub fn new(mode: TreeMode) -> Self {
        Self::with_timezone(mode, Local)
    }
}

impl<Tz> TreeBuilder<Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    pub fn with_timezone(mode: TreeMode, tz: Tz) -> Self {
        Self { mode, options: TreeOptions::default(), tz }
    }

    pub fn with_options(mut self, options: TreeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mode(&self) -> TreeMode {
        self.mode
    }

    pub fn expansion(&self) -> ExpansionPolicy {
        self.options
            .expansion
            .unwrap_or_else(|| ExpansionPolicy::for_mode(self.mode))
    }

    /// Group `flows` and pick the nodes to pre-expand. Pure: the result
    /// depends only on the input, the mode and the options.
    pub fn build(&self, flows: &[Arc<FlowDisplayInfo>]) -> OperationTree {
        self.build_cached(flows, &mut LeafCache::new())
    }

    /// Like [`build`](Self::build), reusing leaves from `cache` for flows
    /// whose revision has not changed since the previous build.
    pub fn build_cached(&self, flows: &[Arc<FlowDisplayInfo>], cache: &mut LeafCache) -> OperationTree {
        cache.begin();
        let live: HashSet<&FlowId> = flows.iter().map(|flow| &flow.flow_id).collect();
        let members: Vec<&Arc<FlowDisplayInfo>> = flows.iter().collect();
        let roots = match self.mode {
            TreeMode::PlanScoped => self.build_days("", members, cache),
            TreeMode::RepoScoped => self.build_instances(members, cache),
        };
        let expired = cache.expire(&live);

        let policy = self.expansion();
        let expanded = match (&self.options.expand_instance, self.mode) {
            (Some(instance), TreeMode::RepoScoped) => roots
                .iter()
                .find(|root| root.instance_id() == Some(instance.as_str()))
                .map(|root| policy.expand(std::slice::from_ref(root)))
                .unwrap_or_default(),
            _ => policy.expand(&roots),
        };

        tracing::debug!(
            mode = ?self.mode,
            roots = roots.len(),
            expanded = expanded.len(),
            reused = cache.hits(),
            rebuilt = cache.misses(),
            expired,
            "Operation tree built"
        );
        OperationTree { mode: self.mode, roots, expanded }
    }

    fn build_instances(&self, flows: Vec<&Arc<FlowDisplayInfo>>, cache: &mut LeafCache) -> Vec<TreeNode> {
        let mut nodes: Vec<TreeNode> = group_by(flows, |flow| flow.instance_id.clone())
            .into_iter()
            .map(|(instance_id, members)| {
                let description =
                    (instance_id == UNASSOCIATED_ID).then_some(UNASSOCIATED_INSTANCE_HELP);
                TreeNode {
                    key: format!("i{instance_id}"),
                    children: self.build_plans(members, cache),
                    content: NodeContent::Instance {
                        label: GroupLabel { title: instance_id.clone(), description },
                        instance_id,
                    },
                }
            })
            .collect();
        sort_by_key_descending(&mut nodes);
        nodes
    }

    fn build_plans(&self, flows: Vec<&Arc<FlowDisplayInfo>>, cache: &mut LeafCache) -> Vec<TreeNode> {
        let mut nodes: Vec<TreeNode> = group_by(flows, |flow| flow.plan_id.clone())
            .into_iter()
            .map(|(plan_id, members)| {
                let instance_id = members[0].instance_id.clone();
                let key = format!("{plan_id}{KEY_SEPARATOR}{instance_id}{KEY_SEPARATOR}");
                let description = match plan_id.as_str() {
                    UNASSOCIATED_ID => Some(UNASSOCIATED_PLAN_HELP),
                    SYSTEM_PLAN_ID => Some(SYSTEM_PLAN_HELP),
                    _ => None,
                };
                TreeNode {
                    children: self.build_days(&key, members, cache),
                    key,
                    content: NodeContent::Plan {
                        label: GroupLabel { title: plan_id.clone(), description },
                        plan_id,
                    },
                }
            })
            .collect();
        sort_by_key_descending(&mut nodes);
        nodes
    }

    fn build_days(
        &self,
        prefix: &str,
        flows: Vec<&Arc<FlowDisplayInfo>>,
        cache: &mut LeafCache,
    ) -> Vec<TreeNode> {
        let mut nodes: Vec<TreeNode> = group_by(flows, |flow| {
            flow.display_time
                .with_timezone(&self.tz)
                .format("%Y-%m-%d")
                .to_string()
        })
        .into_iter()
        .map(|(day, members)| {
            let title = members[0]
                .display_time
                .with_timezone(&self.tz)
                .format("%a %Y-%m-%d")
                .to_string();
            TreeNode {
                key: format!("{prefix}{day}"),
                children: self.build_leaves(members, cache),
                content: NodeContent::Day { day, label: GroupLabel::plain(title) },
            }
        })
        .collect();
        // YYYY-MM-DD keys sort chronologically, so descending puts the most
        // recent day first.
        sort_by_key_descending(&mut nodes);
        nodes
    }

    fn build_leaves(&self, mut flows: Vec<&Arc<FlowDisplayInfo>>, cache: &mut LeafCache) -> Vec<TreeNode> {
        flows.sort_by(|a, b| {
            b.display_time
                .cmp(&a.display_time)
                .then_with(|| b.flow_id.cmp(&a.flow_id))
        });
        flows
            .into_iter()
            .map(|flow| {
                cache.leaf(flow, || TreeNode {
                    key: flow.flow_id.to_string(),
                    content: NodeContent::Flow(FlowLeaf {
                        title: self.leaf_title(flow),
                        flow: Arc::clone(flow),
                    }),
                    children: Vec::new(),
                })
            })
            .collect()
    }

    fn leaf_title(&self, flow: &FlowDisplayInfo) -> String {
        let time = flow
            .display_time
            .with_timezone(&self.tz)
            .format("%Y-%m-%d %H:%M:%S");
        if flow.subtitle_components.is_empty() {
            format!("{} {}", flow.display_type, time)
        } else {
            format!(
                "{} {} [{}]",
                flow.display_type,
                time,
                flow.subtitle_components.join(", ")
            )
        }
    }
}

fn group_by<'a, K, F>(
    flows: Vec<&'a Arc<FlowDisplayInfo>>,
    key: F,
) -> BTreeMap<K, Vec<&'a Arc<FlowDisplayInfo>>>
where
    K: Ord,
    F: Fn(&FlowDisplayInfo) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a Arc<FlowDisplayInfo>>> = BTreeMap::new();
    for flow in flows {
        groups.entry(key(&**flow)).or_default().push(flow);
    }
    groups
}

fn sort_by_key_descending(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| b.key.cmp(&a.key));
}
