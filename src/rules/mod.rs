//! Rule definitions and the registry that owns them.

pub mod model;
pub mod store;

pub use model::{CompositeStep, ForwardingRule, ReplacementKind, ReplacementRule, ReplacementSpec};
pub use store::RuleStore;
