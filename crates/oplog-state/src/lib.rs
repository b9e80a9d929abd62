//! Operation log state - flow aggregation and derived display info
//!
//! Groups operation records into flows, keeps one display summary per
//! flow up to date as change events arrive, and tells subscribers which
//! flows changed.

pub mod aggregator;
pub mod display;
pub mod formatting;

pub use aggregator::{FlowAggregator, Listener, OperationChange, OperationFilter, SubscriptionId};
pub use display::{display_info_for_flow, should_hide_operation, DisplayType, FlowDisplayInfo};
