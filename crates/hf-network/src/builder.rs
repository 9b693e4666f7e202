//! Fluent network builder.
//!
//! ```
//! use hf_network::Network;
//!
//! let network = Network::builder()
//!     .add_source("S").with_flow(10.0)
//!     .link_to_split("X")
//!     .with_outputs()
//!         .link_to_sink("A")
//!     .then()
//!         .link_to_tap("T").open()
//!         .link_to_sink("B")
//!     .done()
//!     .complete()
//!     .unwrap();
//!
//! assert_eq!(network.size(), 5);
//! ```

use hf_core::{NodeId, Real, ensure_finite};
use tracing::{debug, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::network::Network;
use crate::node::FlowNode;

/// Where the builder currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// No source added yet.
    Empty,
    /// Outside any branch; new elements attach below `tip`.
    Linear { tip: NodeId },
    /// Describing output `index` of `parent`. `tip` is the latest element
    /// on that branch, `None` right after `with_outputs`/`then`.
    Branch {
        parent: NodeId,
        index: usize,
        tip: Option<NodeId>,
        depth: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Branch {
    parent: NodeId,
    index: usize,
    arity: usize,
    tip: Option<NodeId>,
}

/// Branch-navigation state: the chain tip outside branches plus one frame
/// per open `with_outputs`.
///
/// Transitions:
/// - `start`: any state -> `Linear(source)`, frames dropped
/// - `advance`: moves the innermost tip
/// - `open`: pushes a frame at output 0 of the current element
/// - `next`: innermost frame moves to the next output, tip cleared
/// - `close`: pops the innermost frame; the enclosing tip is the split again
#[derive(Debug, Clone, Default)]
struct Navigation {
    root: Option<NodeId>,
    branches: Vec<Branch>,
}

impl Navigation {
    fn start(&mut self, source: NodeId) {
        self.root = Some(source);
        self.branches.clear();
    }

    fn state(&self) -> NavState {
        match (self.branches.last(), self.root) {
            (Some(b), _) => NavState::Branch {
                parent: b.parent,
                index: b.index,
                tip: b.tip,
                depth: self.branches.len(),
            },
            (None, Some(tip)) => NavState::Linear { tip },
            (None, None) => NavState::Empty,
        }
    }

    /// Element that configuration calls apply to.
    fn current(&self) -> NetworkResult<NodeId> {
        match self.state() {
            NavState::Empty => Err(NetworkError::Navigation {
                what: "add a source first",
            }),
            NavState::Linear { tip } => Ok(tip),
            NavState::Branch { parent, tip, .. } => Ok(tip.unwrap_or(parent)),
        }
    }

    /// Element and output index the next linked element attaches to.
    fn attach_point(&self, network: &Network) -> NetworkResult<(NodeId, usize)> {
        let tip = match self.state() {
            NavState::Empty => {
                return Err(NetworkError::Navigation {
                    what: "add a source before linking",
                });
            }
            NavState::Branch {
                parent,
                index,
                tip: None,
                ..
            } => return Ok((parent, index)),
            NavState::Branch { tip: Some(tip), .. } | NavState::Linear { tip } => tip,
        };
        let multi = network
            .element(tip)
            .is_some_and(|node| node.kind().is_multi_output());
        if multi {
            return Err(NetworkError::Navigation {
                what: "call with_outputs() before linking below a split",
            });
        }
        Ok((tip, 0))
    }

    fn advance(&mut self, id: NodeId) {
        match self.branches.last_mut() {
            Some(branch) => branch.tip = Some(id),
            None => self.root = Some(id),
        }
    }

    fn open(&mut self, network: &Network) -> NetworkResult<()> {
        let parent = match self.state() {
            NavState::Linear { tip } | NavState::Branch { tip: Some(tip), .. } => tip,
            NavState::Empty | NavState::Branch { tip: None, .. } => {
                return Err(NetworkError::Navigation {
                    what: "with_outputs() must follow a split or multisplit",
                });
            }
        };
        let node = network.node(parent)?;
        if !node.kind().is_multi_output() {
            return Err(NetworkError::Navigation {
                what: "with_outputs() must follow a split or multisplit",
            });
        }
        self.branches.push(Branch {
            parent,
            index: 0,
            arity: node.arity(),
            tip: None,
        });
        Ok(())
    }

    fn next(&mut self) -> NetworkResult<()> {
        let branch = self.branches.last_mut().ok_or(NetworkError::Navigation {
            what: "then() without an open with_outputs()",
        })?;
        if branch.index + 1 >= branch.arity {
            return Err(NetworkError::Navigation {
                what: "then() past the last output",
            });
        }
        branch.index += 1;
        branch.tip = None;
        Ok(())
    }

    fn close(&mut self) -> NetworkResult<()> {
        self.branches
            .pop()
            .map(|_| ())
            .ok_or(NetworkError::Navigation {
                what: "done() without an open with_outputs()",
            })
    }
}

/// Builds a [`Network`] one element at a time.
///
/// Every call returns the builder; the first failure is kept and returned by
/// [`complete`](Self::complete), and later calls are ignored.
#[derive(Debug, Default)]
pub struct HydraulicBuilder {
    network: Network,
    nav: Navigation,
    error: Option<NetworkError>,
}

impl HydraulicBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn step(mut self, f: impl FnOnce(&mut Self) -> NetworkResult<()>) -> Self {
        if self.error.is_none() {
            if let Err(err) = f(&mut self) {
                warn!(error = %err, "builder step failed");
                self.error = Some(err);
            }
        }
        self
    }

    /// Add a Source and make it the insertion point. Calling it again starts
    /// another tree in the same network.
    pub fn add_source(self, name: impl Into<String>) -> Self {
        let node = FlowNode::source(name);
        self.step(|b| {
            let id = b.network.add_element(node)?;
            b.nav.start(id);
            debug!(id = %id, "source added");
            Ok(())
        })
    }

    pub fn link_to_tap(self, name: impl Into<String>) -> Self {
        self.link(FlowNode::tap(name))
    }

    pub fn link_to_sink(self, name: impl Into<String>) -> Self {
        self.link(FlowNode::sink(name))
    }

    pub fn link_to_split(self, name: impl Into<String>) -> Self {
        self.link(FlowNode::split(name))
    }

    pub fn link_to_multisplit(self, name: impl Into<String>, outputs: usize) -> Self {
        self.link(FlowNode::multisplit(name, outputs))
    }

    fn link(self, node: FlowNode) -> Self {
        self.step(|b| {
            let (from, index) = b.nav.attach_point(&b.network)?;
            let kind = node.kind();
            let id = b.network.add_element(node)?;
            b.network.connect_at(from, id, index)?;
            b.nav.advance(id);
            debug!(id = %id, kind = %kind, from = %from, index, "linked");
            Ok(())
        })
    }

    /// Start describing output 0 of the split/multisplit just added.
    pub fn with_outputs(self) -> Self {
        self.step(|b| b.nav.open(&b.network))
    }

    /// Move on to the next output of the innermost open split.
    pub fn then(self) -> Self {
        self.step(|b| b.nav.next())
    }

    /// Stop describing the innermost open split.
    pub fn done(self) -> Self {
        self.step(|b| b.nav.close())
    }

    /// Flow of the current element (the configured flow on a Source).
    pub fn with_flow(self, flow: Real) -> Self {
        self.step(|b| {
            let flow = ensure_finite(flow, "flow")?;
            b.current_mut()?.set_flow(flow);
            Ok(())
        })
    }

    /// Open the current tap.
    pub fn open(self) -> Self {
        self.step(|b| b.current_mut()?.set_open(true))
    }

    /// Close the current tap.
    pub fn closed(self) -> Self {
        self.step(|b| b.current_mut()?.set_open(false))
    }

    /// Proportions of the current multisplit.
    pub fn with_proportions(self, props: &[Real]) -> Self {
        self.step(|b| b.current_mut()?.set_proportions(props))
    }

    /// Threshold of the current element.
    pub fn max_flow(self, max: Real) -> Self {
        self.step(|b| {
            let max = ensure_finite(max, "max_flow")?;
            b.current_mut()?.set_max_flow(max);
            Ok(())
        })
    }

    /// Current navigation state.
    pub fn state(&self) -> NavState {
        self.nav.state()
    }

    /// First error recorded so far.
    pub fn error(&self) -> Option<&NetworkError> {
        self.error.as_ref()
    }

    /// Finish building. Open `with_outputs` contexts are closed implicitly.
    pub fn complete(self) -> NetworkResult<Network> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if !self.nav.branches.is_empty() {
            debug!(open = self.nav.branches.len(), "completing with open branches");
        }
        self.network.validate()?;
        Ok(self.network)
    }

    fn current_mut(&mut self) -> NetworkResult<&mut FlowNode> {
        let id = self.nav.current()?;
        self.network.node_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn linear_chain() {
        let net = HydraulicBuilder::new()
            .add_source("S")
            .with_flow(10.0)
            .link_to_tap("T")
            .open()
            .link_to_sink("A")
            .complete()
            .unwrap();

        let names: Vec<_> = net.elements().map(FlowNode::name).collect();
        assert_eq!(names, ["S", "T", "A"]);
        let s = net.find("S").unwrap();
        let t = net.find("T").unwrap();
        assert_eq!(net.element(s).unwrap().downstream(), Some(t));
        assert_eq!(net.get("T").unwrap().is_open(), Some(true));
        assert_eq!(net.get("S").unwrap().flow(), 10.0);
    }

    #[test]
    fn branches_attach_to_their_output() {
        let net = HydraulicBuilder::new()
            .add_source("S")
            .link_to_split("X")
            .with_outputs()
            .link_to_tap("T1")
            .link_to_sink("A")
            .then()
            .link_to_sink("B")
            .done()
            .complete()
            .unwrap();

        let x = net.get("X").unwrap();
        assert_eq!(x.downstream_at(0), net.find("T1"));
        assert_eq!(x.downstream_at(1), net.find("B"));
        assert_eq!(net.get("T1").unwrap().downstream(), net.find("A"));
    }

    #[test]
    fn nested_branches() {
        let net = HydraulicBuilder::new()
            .add_source("S")
            .link_to_multisplit("M", 3)
            .with_proportions(&[0.5, 0.25, 0.25])
            .with_outputs()
            .link_to_split("X")
            .with_outputs()
            .link_to_sink("A")
            .then()
            .link_to_sink("B")
            .done()
            .then()
            .link_to_sink("C")
            .then()
            .link_to_sink("D")
            .done()
            .complete()
            .unwrap();

        let m = net.get("M").unwrap();
        assert_eq!(m.outputs(), &[net.find("X"), net.find("C"), net.find("D")]);
        let x = net.get("X").unwrap();
        assert_eq!(x.outputs(), &[net.find("A"), net.find("B")]);
    }

    #[test]
    fn navigation_states() {
        let b = HydraulicBuilder::new();
        assert_eq!(b.state(), NavState::Empty);

        let b = b.add_source("S").link_to_split("X");
        let x = b.network.find("X").unwrap();
        assert_eq!(b.state(), NavState::Linear { tip: x });

        let b = b.with_outputs().then();
        assert_eq!(
            b.state(),
            NavState::Branch {
                parent: x,
                index: 1,
                tip: None,
                depth: 1
            }
        );

        let b = b.done();
        assert_eq!(b.state(), NavState::Linear { tip: x });
    }

    #[test]
    fn second_source_starts_new_tree() {
        let net = HydraulicBuilder::new()
            .add_source("S1")
            .link_to_sink("A")
            .add_source("S2")
            .link_to_sink("B")
            .complete()
            .unwrap();
        assert_eq!(net.get("B").unwrap().upstream(), net.find("S2"));
        assert_eq!(net.get("A").unwrap().upstream(), net.find("S1"));
    }

    #[test]
    fn wrong_variant_configuration_is_reported() {
        let err = HydraulicBuilder::new()
            .add_source("S")
            .link_to_sink("A")
            .open()
            .complete()
            .unwrap_err();
        assert_eq!(
            err,
            NetworkError::Unsupported {
                kind: NodeKind::Sink,
                what: "set_open"
            }
        );

        let err = HydraulicBuilder::new()
            .add_source("S")
            .link_to_tap("T")
            .with_proportions(&[1.0])
            .complete()
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Unsupported {
                kind: NodeKind::Tap,
                ..
            }
        ));
    }

    #[test]
    fn navigation_misuse_is_reported() {
        let cases = [
            HydraulicBuilder::new().link_to_sink("A"),
            HydraulicBuilder::new().add_source("S").then(),
            HydraulicBuilder::new().add_source("S").done(),
            HydraulicBuilder::new().add_source("S").with_outputs(),
            HydraulicBuilder::new()
                .add_source("S")
                .link_to_split("X")
                .link_to_sink("A"),
            HydraulicBuilder::new()
                .add_source("S")
                .link_to_split("X")
                .with_outputs()
                .then()
                .then(),
        ];
        for builder in cases {
            assert!(matches!(
                builder.complete(),
                Err(NetworkError::Navigation { .. })
            ));
        }
    }

    #[test]
    fn first_error_wins() {
        let builder = HydraulicBuilder::new()
            .add_source("S")
            .add_source("S")
            .link_to_sink("A")
            .done();
        assert_eq!(
            builder.error(),
            Some(&NetworkError::DuplicateName { name: "S".into() })
        );
        let net = builder.complete();
        assert!(net.is_err());
    }

    #[test]
    fn non_finite_flow_is_rejected() {
        let err = HydraulicBuilder::new()
            .add_source("S")
            .with_flow(Real::INFINITY)
            .complete()
            .unwrap_err();
        assert!(matches!(err, NetworkError::Core(_)));
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let builder = HydraulicBuilder::new()
            .add_source("S")
            .link_to_sink("A")
            .max_flow(Real::NAN);
        assert!(matches!(builder.error(), Some(NetworkError::Core(_))));
        assert!(builder.complete().is_err());
    }

    #[test]
    fn linking_below_sink_fails() {
        let err = HydraulicBuilder::new()
            .add_source("S")
            .link_to_sink("A")
            .link_to_sink("B")
            .complete()
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Unsupported {
                kind: NodeKind::Sink,
                ..
            }
        ));
    }
}
