//! Node identity: references, compact short ids, roles and the immutable
//! `NodeInfo` snapshot every membership structure is built from.

mod info;
mod reference;
mod role;

pub use info::NodeInfo;
pub use reference::{NodeReference, ShortNodeId, REFERENCE_LENGTH};
pub use role::{DynamicRole, StaticRole};
