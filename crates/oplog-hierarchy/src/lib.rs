//! Operation log hierarchy - grouping flows into a display tree
//!
//! Turns a snapshot of flow summaries into an instance → plan → day →
//! flow tree (day → flow for plan-scoped views) and decides which nodes
//! start out expanded.

pub mod builder;
pub mod cache;
pub mod expansion;
pub mod tree;

pub use builder::{TreeBuilder, TreeOptions};
pub use cache::LeafCache;
pub use expansion::{ExpansionPolicy, DEFAULT_EXPAND_BUDGET};
pub use tree::{FlowLeaf, GroupLabel, NodeContent, OperationTree, TreeMode, TreeNode};
