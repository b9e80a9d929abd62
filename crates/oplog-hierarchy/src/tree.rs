use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;

use oplog_state::FlowDisplayInfo;

/// Which view the tree is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeMode {
    /// Scoped to one plan: flows are grouped by day only.
    PlanScoped,
    /// Scoped to a repository: instance, then plan, then day.
    RepoScoped,
}

/// Title of a group node, with an explanation for the reserved ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupLabel {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

impl GroupLabel {
    pub fn plain(title: impl Into<String>) -> Self {
        Self { title: title.into(), description: None }
    }
}

/// A flow at the bottom of the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowLeaf {
    /// Display type, local start time and subtitle, ready to print.
    pub title: String,
    pub flow: Arc<FlowDisplayInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum NodeContent {
    Instance { instance_id: String, label: GroupLabel },
    Plan { plan_id: String, label: GroupLabel },
    Day { day: String, label: GroupLabel },
    Flow(FlowLeaf),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub key: String,
    pub content: NodeContent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn title(&self) -> &str {
        match &self.content {
            NodeContent::Instance { label, .. }
            | NodeContent::Plan { label, .. }
            | NodeContent::Day { label, .. } => &label.title,
            NodeContent::Flow(leaf) => &leaf.title,
        }
    }

    pub fn flow(&self) -> Option<&Arc<FlowDisplayInfo>> {
        match &self.content {
            NodeContent::Flow(leaf) => Some(&leaf.flow),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, NodeContent::Flow(_))
    }

    pub(crate) fn instance_id(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Instance { instance_id, .. } => Some(instance_id.as_str()),
            _ => None,
        }
    }

    fn flow_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(TreeNode::flow_count).sum()
        }
    }
}

/// Grouped flows plus the keys of nodes that start out expanded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationTree {
    pub mode: TreeMode,
    pub roots: Vec<TreeNode>,
    pub expanded: Vec<String>,
}

impl OperationTree {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn flow_count(&self) -> usize {
        self.roots.iter().map(TreeNode::flow_count).sum()
    }

    /// Depth-first lookup by node key.
    pub fn find(&self, key: &str) -> Option<&TreeNode> {
        fn walk<'a>(nodes: &'a [TreeNode], key: &str) -> Option<&'a TreeNode> {
            for node in nodes {
                if node.key == key {
                    return Some(node);
                }
                if let Some(found) = walk(&node.children, key) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.roots, key)
    }

    /// Expanded keys together with every ancestor that must be open for
    /// them to be visible.
    pub fn expanded_paths(&self) -> BTreeSet<String> {
        fn walk(
            nodes: &[TreeNode],
            path: &mut Vec<String>,
            wanted: &HashSet<&str>,
            out: &mut BTreeSet<String>,
        ) {
            for node in nodes {
                path.push(node.key.clone());
                if wanted.contains(node.key.as_str()) {
                    out.extend(path.iter().cloned());
                }
                walk(&node.children, path, wanted, out);
                path.pop();
            }
        }

        let wanted: HashSet<&str> = self.expanded.iter().map(String::as_str).collect();
        let mut out = BTreeSet::new();
        walk(&self.roots, &mut Vec::new(), &wanted, &mut out);
        out
    }
}
