//! Auto-expansion of a freshly built tree.
//!
//! A budget of nodes is handed out to every sibling list found at
//! `start_depth`. Starting there, a depth-first walk marks nodes at
//! `target_depth`, earliest siblings first, until that list's budget runs
//! out. With the default budget of 5 this opens the most recent few runs
//! of every plan and leaves older history collapsed.

use crate::tree::{TreeMode, TreeNode};

pub const DEFAULT_EXPAND_BUDGET: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionPolicy {
    pub budget: usize,
    pub start_depth: usize,
    pub target_depth: usize,
}

impl ExpansionPolicy {
    /// Plan-scoped trees start at the day level; repo-scoped trees carry
    /// the instance and plan levels above it.
    pub fn for_mode(mode: TreeMode) -> Self {
        match mode {
            TreeMode::PlanScoped => Self {
                budget: DEFAULT_EXPAND_BUDGET,
                start_depth: 0,
                target_depth: 1,
            },
            TreeMode::RepoScoped => Self {
                budget: DEFAULT_EXPAND_BUDGET,
                start_depth: 2,
                target_depth: 3,
            },
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Keys to expand in `nodes`, which sit at depth 0.
    pub fn expand(&self, nodes: &[TreeNode]) -> Vec<String> {
        let mut expanded = Vec::new();
        if self.budget > 0 {
            self.allocate(nodes, 0, &mut expanded);
        }
        expanded
    }

    fn allocate(&self, nodes: &[TreeNode], depth: usize, out: &mut Vec<String>) {
        if depth >= self.start_depth {
            let mut budget = self.budget;
            self.mark(nodes, depth, &mut budget, out);
            return;
        }
        for node in nodes {
            self.allocate(&node.children, depth + 1, out);
        }
    }

    fn mark(&self, nodes: &[TreeNode], depth: usize, budget: &mut usize, out: &mut Vec<String>) {
        for node in nodes {
            if *budget == 0 {
                return;
            }
            if depth >= self.target_depth {
                out.push(node.key.clone());
                *budget -= 1;
            } else {
                self.mark(&node.children, depth + 1, budget, out);
            }
        }
    }
}
