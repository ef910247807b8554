//! Umbrella crate for Hamlet.
//!
//! Re-exports the engine and protocol crates so downstream code can depend on a
//! single crate name (`hamlet`).

pub use hamlet_engine as engine;
pub use hamlet_protocol as protocol;
