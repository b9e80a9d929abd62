//! Plain-text rendering of an operation tree.

use std::collections::BTreeSet;

use oplog_hierarchy::{OperationTree, TreeNode};
use oplog_protocol::OperationStatus;

/// Render `tree` as box-drawn lines. Nodes outside the expanded set are
/// shown collapsed with a child count unless `show_all` is set.
pub fn render_tree(tree: &OperationTree, show_all: bool) -> Vec<String> {
    let open = tree.expanded_paths();
    let mut lines = Vec::new();
    let count = tree.roots.len();
    for (i, root) in tree.roots.iter().enumerate() {
        render_node(root, "", i + 1 == count, true, &open, show_all, &mut lines);
    }
    lines
}

fn render_node(
    node: &TreeNode,
    prefix: &str,
    is_last: bool,
    is_root: bool,
    open: &BTreeSet<String>,
    show_all: bool,
    lines: &mut Vec<String>,
) {
    let branch = if is_root {
        String::new()
    } else if is_last {
        format!("{prefix}└── ")
    } else {
        format!("{prefix}├── ")
    };

    let expanded = show_all || open.contains(&node.key);
    let mut line = format!("{branch}{}", node.title());
    match node.flow() {
        Some(flow) if flow.status != OperationStatus::Success => {
            line.push_str(&format!(" <{}>", flow.status));
        }
        Some(_) => {}
        None if !expanded => line.push_str(&format!(" (+{})", node.children.len())),
        None => {}
    }
    lines.push(line);

    if !expanded {
        return;
    }
    let child_prefix = if is_root {
        String::new()
    } else if is_last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render_node(child, &child_prefix, i + 1 == count, false, open, show_all, lines);
    }
}
