//! Operation log connector - keeps a flow aggregator in sync with a
//! backend change stream and republishes the operation tree as it changes.
//!
//! Also hosts the `oplog-view` binary, which replays a JSON-lines event
//! log and prints the resulting tree.

pub mod config;
pub mod error;
pub mod rebuild;
pub mod render;
pub mod replay;
pub mod sync;

pub use config::ViewConfig;
pub use error::ConnectorError;
pub use rebuild::{spawn_tree_rebuilder, TreeRebuilder};
pub use render::render_tree;
pub use replay::{replay_lines, ReplayStats};
pub use sync::{scope_event, shared, sync_from_source, EventStream, OperationSource, SharedAggregator, SyncHandle};
