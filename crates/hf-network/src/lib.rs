//! hf-network: hydraulic network model and simulator for hydroflow.
//!
//! Provides:
//! - Flow elements (Source, Tap, Split, Multisplit, Sink) with their arithmetic
//! - A network arena that propagates flows from every Source and reports
//!   each element to an observer, optionally checking flow thresholds
//! - Element deletion that splices the topology back together
//! - A fluent builder with explicit branch navigation
//!
//! # Example
//!
//! ```
//! use hf_network::{Network, RecordingObserver};
//!
//! let mut network = Network::builder()
//!     .add_source("S").with_flow(10.0)
//!     .link_to_tap("T").open()
//!     .link_to_sink("A")
//!     .complete()
//!     .unwrap();
//!
//! let mut observer = RecordingObserver::new();
//! network.simulate(&mut observer);
//!
//! assert_eq!(network.get("A").unwrap().flow(), 10.0);
//! assert_eq!(observer.events().len(), 3);
//! ```

pub mod builder;
pub mod error;
pub mod network;
pub mod node;
pub mod observer;
pub mod options;
mod propagate;
mod validate;

// Re-exports for ergonomics
pub use builder::{HydraulicBuilder, NavState};
pub use error::{NetworkError, NetworkResult};
pub use hf_core::{NO_FLOW, NodeId, Real, is_no_flow};
pub use network::Network;
pub use node::{FlowNode, NodeKind};
pub use observer::{FlowEvent, RecordingObserver, SimulationObserver, TracingObserver};
pub use options::{SimulationOptions, SimulationSummary};
