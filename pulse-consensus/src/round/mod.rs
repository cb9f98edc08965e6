//! Per-round working state: the candidate mapper, liveness bitsets, the
//! round proposal and its merge, and the cloud hash of the result.

mod cloud_hash;
mod mapper;
mod unsync;

pub use cloud_hash::CloudHash;
pub use mapper::{BitSetMapper, Bitset, MapperDigest};
pub use unsync::{MergeResult, UnsyncList};
