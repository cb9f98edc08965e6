//! Types shared by every crate of the pulse workspace: node identity,
//! the signing capability and the pulse clock.

pub mod auth;
pub mod error;
pub mod node;
pub mod pulse;
pub mod utils;

pub use error::{CommonError, Result};
pub use node::{DynamicRole, NodeInfo, NodeReference, ShortNodeId, StaticRole};
pub use pulse::{Pulse, PulseNumber};
