//! hf-core: stable foundation for hydroflow.
//!
//! Contains:
//! - ids (compact handles for network elements)
//! - numeric (Real, tolerances, the `NO_FLOW` sentinel)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{HfError, HfResult};
pub use ids::*;
pub use numeric::*;
