//! Operation log protocol - record and event types
//!
//! Defines the operation records reported by the backup engine, the
//! created/updated/deleted change events that carry them, and the
//! selectors used to scope a view to one repository or plan.

pub mod types;
pub mod messages;
pub mod selector;
pub mod error;

pub use types::*;
pub use messages::*;
pub use selector::*;
pub use error::*;

/// Instance/plan id collecting operations without an owning tag.
pub const UNASSOCIATED_ID: &str = "_unassociated_";
/// Plan id collecting repository-level operations not tied to one plan.
pub const SYSTEM_PLAN_ID: &str = "_system_";
