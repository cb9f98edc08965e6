//! Request/response plumbing used for every inter-node call of a
//! consensus round.
//!
//! Transport framing is not part of this crate: peers exchange whole
//! [`Envelope`]s. The in-memory transport is what tests and local
//! simulations run on.

pub mod builder;
pub mod error;
pub mod future;
pub mod future_manager;
pub mod in_memory;
pub mod message;
pub mod ports;

pub use builder::EnvelopeBuilder;
pub use error::{FutureError, NetworkError};
pub use future::{CancelCallback, Future, FutureState};
pub use future_manager::FutureManager;
pub use in_memory::{DropFilter, InMemoryEndpoint, InMemoryNetwork};
pub use message::{decode, encode, Envelope, PayloadType, RequestId};
pub use ports::{Messenger, RequestHandler};
