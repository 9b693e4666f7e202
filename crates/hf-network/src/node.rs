//! Flow node variants and their per-variant arithmetic.
//!
//! A [`FlowNode`] only knows its own state and the handles of its neighbours.
//! Anything that has to look at a neighbour (propagation, splicing) lives on
//! [`Network`](crate::Network), which owns every node.

use std::fmt;

use hf_core::{NO_FLOW, NodeId, Real, Tolerances, is_no_flow, nearly_equal};
use tracing::warn;

use crate::error::{NetworkError, NetworkResult};
use crate::observer::SimulationObserver;

/// Fraction of the input a split sends down each of its two outputs.
const SPLIT_SHARE: Real = 0.5;

/// The closed set of element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    Source,
    Tap,
    Split,
    Multisplit,
    Sink,
}

impl NodeKind {
    /// Label handed to observers. A multisplit reports as a `"Split"`.
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Source => "Source",
            NodeKind::Tap => "Tap",
            NodeKind::Split | NodeKind::Multisplit => "Split",
            NodeKind::Sink => "Sink",
        }
    }

    /// True for kinds whose outputs are addressed by index.
    pub fn is_multi_output(self) -> bool {
        matches!(self, NodeKind::Split | NodeKind::Multisplit)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Multisplit => "Multisplit",
            other => other.label(),
        };
        f.write_str(name)
    }
}

/// Variant-specific state.
#[derive(Debug, Clone, PartialEq)]
enum Variant {
    Source { flow: Real },
    Tap { open: bool },
    Split,
    Multisplit { proportions: Vec<Real> },
    Sink,
}

/// An element of a hydraulic network.
///
/// Output arity is fixed at construction: Source and Tap have one output,
/// Split two, Multisplit `n`, Sink none. Slots may stay empty while a
/// network is being wired.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    name: String,
    input: Real,
    max_flow: Option<Real>,
    upstream: Option<NodeId>,
    downstream: Vec<Option<NodeId>>,
    variant: Variant,
}

impl FlowNode {
    fn with_variant(name: impl Into<String>, arity: usize, variant: Variant) -> Self {
        Self {
            name: name.into(),
            input: NO_FLOW,
            max_flow: None,
            upstream: None,
            downstream: vec![None; arity],
            variant,
        }
    }

    /// A root element. Its flow starts as `NO_FLOW` until configured.
    pub fn source(name: impl Into<String>) -> Self {
        Self::with_variant(name, 1, Variant::Source { flow: NO_FLOW })
    }

    /// A tap, closed until opened.
    pub fn tap(name: impl Into<String>) -> Self {
        Self::with_variant(name, 1, Variant::Tap { open: false })
    }

    /// A T element halving its input on both outputs.
    pub fn split(name: impl Into<String>) -> Self {
        Self::with_variant(name, 2, Variant::Split)
    }

    /// A split with `outputs` outputs. All proportions start at zero.
    pub fn multisplit(name: impl Into<String>, outputs: usize) -> Self {
        Self::with_variant(
            name,
            outputs,
            Variant::Multisplit {
                proportions: vec![0.0; outputs],
            },
        )
    }

    /// A terminal element.
    pub fn sink(name: impl Into<String>) -> Self {
        Self::with_variant(name, 0, Variant::Sink)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        match self.variant {
            Variant::Source { .. } => NodeKind::Source,
            Variant::Tap { .. } => NodeKind::Tap,
            Variant::Split => NodeKind::Split,
            Variant::Multisplit { .. } => NodeKind::Multisplit,
            Variant::Sink => NodeKind::Sink,
        }
    }

    /// Number of downstream slots.
    pub fn arity(&self) -> usize {
        self.downstream.len()
    }

    // ---- flows ----------------------------------------------------------

    /// Set the flow of this element.
    ///
    /// On a Source this is the configured flow it feeds downstream; on every
    /// other kind it overwrites the current input until the next propagation.
    pub fn set_flow(&mut self, flow: Real) {
        match &mut self.variant {
            Variant::Source { flow: f } => *f = flow,
            _ => self.input = flow,
        }
    }

    /// Configured flow for a Source, zero for a closed tap, current input
    /// for everything else.
    pub fn flow(&self) -> Real {
        match self.variant {
            Variant::Source { flow } => flow,
            Variant::Tap { open: false } => 0.0,
            _ => self.input,
        }
    }

    /// Input flow as reported to observers. Always `NO_FLOW` for a Source.
    pub fn input_flow(&self) -> Real {
        self.input
    }

    /// Flow leaving output 0.
    pub fn out_flow(&self) -> Real {
        self.out_flow_at(0)
    }

    /// Flow leaving output `index`, or `NO_FLOW` past the arity.
    pub fn out_flow_at(&self, index: usize) -> Real {
        if index >= self.arity() {
            return NO_FLOW;
        }
        match &self.variant {
            Variant::Source { flow } => *flow,
            Variant::Tap { open: true } => self.input,
            Variant::Tap { open: false } => 0.0,
            Variant::Split => self.input * SPLIT_SHARE,
            Variant::Multisplit { proportions } => self.input * proportions[index],
            Variant::Sink => NO_FLOW,
        }
    }

    /// Flows on every output, in slot order. A Sink yields `[NO_FLOW]`.
    pub fn out_flows(&self) -> Vec<Real> {
        match self.variant {
            Variant::Sink => vec![NO_FLOW],
            _ => (0..self.arity()).map(|i| self.out_flow_at(i)).collect(),
        }
    }

    /// Record the input computed by propagation. Sources ignore it.
    pub(crate) fn receive(&mut self, inflow: Real) {
        if !matches!(self.variant, Variant::Source { .. }) {
            self.input = inflow;
        }
    }

    // ---- variant-specific configuration ---------------------------------

    /// Open or close a tap.
    pub fn set_open(&mut self, open: bool) -> NetworkResult<()> {
        match &mut self.variant {
            Variant::Tap { open: o } => {
                *o = open;
                Ok(())
            }
            _ => Err(self.unsupported("set_open")),
        }
    }

    /// Open state of a tap, `None` for other kinds.
    pub fn is_open(&self) -> Option<bool> {
        match self.variant {
            Variant::Tap { open } => Some(open),
            _ => None,
        }
    }

    /// Set the share of input sent to each output of a multisplit.
    ///
    /// The length must match the arity. A sum other than 1.0 is accepted
    /// as-is with a warning: outputs then do not add up to the input.
    pub fn set_proportions(&mut self, props: &[Real]) -> NetworkResult<()> {
        let arity = self.arity();
        let name = &self.name;
        match &mut self.variant {
            Variant::Multisplit { proportions } => {
                if props.len() != arity {
                    return Err(NetworkError::ProportionCount {
                        name: name.clone(),
                        expected: arity,
                        got: props.len(),
                    });
                }
                proportions.copy_from_slice(props);
                let sum: Real = props.iter().sum();
                if !nearly_equal(sum, 1.0, Tolerances::default()) {
                    warn!(name = %name, sum, "multisplit proportions do not sum to 1");
                }
                Ok(())
            }
            _ => Err(self.unsupported("set_proportions")),
        }
    }

    /// Proportions of a multisplit, `None` for other kinds.
    pub fn proportions(&self) -> Option<&[Real]> {
        match &self.variant {
            Variant::Multisplit { proportions } => Some(proportions),
            _ => None,
        }
    }

    // ---- thresholds -----------------------------------------------------

    /// Maximum acceptable input flow. Zero is a real limit, not "unset".
    pub fn set_max_flow(&mut self, max_flow: Real) {
        self.max_flow = Some(max_flow);
    }

    pub fn clear_max_flow(&mut self) {
        self.max_flow = None;
    }

    pub fn max_flow(&self) -> Option<Real> {
        self.max_flow
    }

    /// False only when a threshold is set and the computed input exceeds it.
    ///
    /// An element that was never reached (`NO_FLOW` input) passes.
    pub fn max_flow_check(&self) -> bool {
        match self.max_flow {
            Some(limit) if !is_no_flow(self.input) => self.input <= limit,
            _ => true,
        }
    }

    // ---- topology -------------------------------------------------------

    pub fn upstream(&self) -> Option<NodeId> {
        self.upstream
    }

    /// Set the upstream handle. Only clearing is accepted on a Source.
    ///
    /// This edits one side of a link; [`Network::connect_at`](crate::Network::connect_at)
    /// keeps both sides consistent.
    pub fn set_upstream(&mut self, upstream: Option<NodeId>) -> NetworkResult<()> {
        if upstream.is_some() && self.kind() == NodeKind::Source {
            return Err(self.unsupported("set_upstream"));
        }
        self.upstream = upstream;
        Ok(())
    }

    /// Element on output 0.
    pub fn downstream(&self) -> Option<NodeId> {
        self.downstream_at(0)
    }

    pub fn downstream_at(&self, index: usize) -> Option<NodeId> {
        self.downstream.get(index).copied().flatten()
    }

    /// All downstream slots, empty ones included.
    pub fn outputs(&self) -> &[Option<NodeId>] {
        &self.downstream
    }

    pub fn occupied_outputs(&self) -> usize {
        self.downstream.iter().flatten().count()
    }

    /// Slot index holding `child`, if any.
    pub fn slot_of(&self, child: NodeId) -> Option<usize> {
        self.downstream.iter().position(|d| *d == Some(child))
    }

    /// Set output 0.
    pub fn set_downstream(&mut self, downstream: Option<NodeId>) -> NetworkResult<()> {
        self.set_downstream_at(downstream, 0)
    }

    /// Set output `index`. Fails on a Sink or past the arity.
    pub fn set_downstream_at(
        &mut self,
        downstream: Option<NodeId>,
        index: usize,
    ) -> NetworkResult<()> {
        if self.kind() == NodeKind::Sink {
            return Err(self.unsupported("set_downstream"));
        }
        let arity = self.arity();
        match self.downstream.get_mut(index) {
            Some(slot) => {
                *slot = downstream;
                Ok(())
            }
            None => Err(NetworkError::OutputOutOfRange {
                name: self.name.clone(),
                index,
                arity,
            }),
        }
    }

    /// Unchecked link edits for the network, which has already validated
    /// both ends.
    pub(crate) fn replace_upstream(&mut self, upstream: Option<NodeId>) {
        self.upstream = upstream;
    }

    pub(crate) fn replace_slot(&mut self, index: usize, child: Option<NodeId>) {
        if let Some(slot) = self.downstream.get_mut(index) {
            *slot = child;
        }
    }

    pub(crate) fn clear_links(&mut self) {
        self.upstream = None;
        self.downstream.fill(None);
    }

    // ---- reporting ------------------------------------------------------

    /// Send this element's flows to the observer.
    pub fn report<O: SimulationObserver + ?Sized>(&self, observer: &mut O) {
        observer.notify_flow(self.kind(), &self.name, self.input, &self.out_flows());
    }

    /// Send a threshold notification. Sources and unconstrained elements
    /// have nothing to report.
    pub fn report_error<O: SimulationObserver + ?Sized>(&self, observer: &mut O) {
        if self.kind() == NodeKind::Source {
            return;
        }
        if let Some(limit) = self.max_flow {
            observer.notify_flow_error(self.kind(), &self.name, self.input, limit);
        }
    }

    fn unsupported(&self, what: &'static str) -> NetworkError {
        NetworkError::Unsupported {
            kind: self.kind(),
            what,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::observer::{FlowEvent, RecordingObserver};

    #[test]
    fn arity_per_kind() {
        assert_eq!(FlowNode::source("S").arity(), 1);
        assert_eq!(FlowNode::tap("T").arity(), 1);
        assert_eq!(FlowNode::split("X").arity(), 2);
        assert_eq!(FlowNode::multisplit("M", 4).arity(), 4);
        assert_eq!(FlowNode::sink("A").arity(), 0);
    }

    #[test]
    fn split_halves_input() {
        let mut x = FlowNode::split("X");
        x.receive(10.0);
        assert_eq!(x.out_flows(), vec![5.0, 5.0]);
    }

    #[test]
    fn closed_tap_blocks_flow() {
        let mut t = FlowNode::tap("T");
        t.receive(8.0);
        assert_eq!(t.out_flow(), 0.0);
        assert_eq!(t.flow(), 0.0);
        assert_eq!(t.input_flow(), 8.0);
        t.set_open(true).unwrap();
        assert_eq!(t.out_flow(), 8.0);
        assert_eq!(t.flow(), 8.0);
    }

    #[test]
    fn source_flow_is_not_an_input() {
        let mut s = FlowNode::source("S");
        s.set_flow(10.0);
        s.receive(3.0);
        assert_eq!(s.flow(), 10.0);
        assert!(is_no_flow(s.input_flow()));
        assert_eq!(s.out_flow(), 10.0);
    }

    #[test]
    fn variant_operations_reject_wrong_kind() {
        let mut sink = FlowNode::sink("A");
        assert!(matches!(
            sink.set_open(true),
            Err(NetworkError::Unsupported {
                kind: NodeKind::Sink,
                ..
            })
        ));
        assert!(sink.set_downstream(None).is_err());

        let mut tap = FlowNode::tap("T");
        assert!(tap.set_proportions(&[1.0]).is_err());

        let mut src = FlowNode::source("S");
        assert!(src.set_upstream(Some(NodeId::from_index(1))).is_err());
        assert!(src.set_upstream(None).is_ok());
    }

    #[test]
    fn proportion_count_must_match_arity() {
        let mut m = FlowNode::multisplit("M", 3);
        let err = m.set_proportions(&[0.5, 0.5]).unwrap_err();
        assert_eq!(
            err,
            NetworkError::ProportionCount {
                name: "M".into(),
                expected: 3,
                got: 2
            }
        );
        m.set_proportions(&[0.2, 0.3, 0.5]).unwrap();
        m.receive(100.0);
        assert_eq!(m.out_flows(), vec![20.0, 30.0, 50.0]);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn with_captured_logs(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        logs.text()
    }

    #[test]
    fn unbalanced_proportions_warn_but_apply() {
        let mut m = FlowNode::multisplit("M", 2);
        let logs = with_captured_logs(|| m.set_proportions(&[0.9, 0.9]).unwrap());
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("multisplit proportions do not sum to 1"), "{logs}");
        assert!(logs.contains("name=M"), "{logs}");
        assert_eq!(m.proportions(), Some(&[0.9, 0.9][..]));

        let logs = with_captured_logs(|| m.set_proportions(&[0.25, 0.75]).unwrap());
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn multisplit_reports_as_split() {
        assert_eq!(NodeKind::Multisplit.label(), "Split");
        assert_eq!(NodeKind::Split.label(), "Split");
        assert_eq!(NodeKind::Multisplit.to_string(), "Multisplit");
    }

    #[test]
    fn zero_threshold_is_a_limit() {
        let mut t = FlowNode::tap("T");
        t.set_max_flow(0.0);
        t.receive(1.0);
        assert!(!t.max_flow_check());
        t.clear_max_flow();
        assert!(t.max_flow_check());
    }

    #[test]
    fn unreached_node_passes_threshold() {
        let mut a = FlowNode::sink("A");
        a.set_max_flow(1.0);
        assert!(a.max_flow_check());
    }

    #[test]
    fn slot_bookkeeping() {
        let mut x = FlowNode::split("X");
        let a = NodeId::from_index(4);
        x.set_downstream_at(Some(a), 1).unwrap();
        assert_eq!(x.slot_of(a), Some(1));
        assert_eq!(x.occupied_outputs(), 1);
        assert_eq!(x.downstream(), None);
        assert!(matches!(
            x.set_downstream_at(Some(a), 2),
            Err(NetworkError::OutputOutOfRange { arity: 2, .. })
        ));
    }

    #[test]
    fn sink_reports_no_output() {
        let mut a = FlowNode::sink("A");
        a.receive(4.0);
        let mut rec = RecordingObserver::default();
        a.report(&mut rec);
        match &rec.events()[0] {
            FlowEvent::Flow {
                kind,
                input,
                outputs,
                ..
            } => {
                assert_eq!(*kind, NodeKind::Sink);
                assert_eq!(*input, 4.0);
                assert_eq!(outputs.len(), 1);
                assert!(is_no_flow(outputs[0]));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn report_error_needs_a_threshold() {
        let mut rec = RecordingObserver::default();
        let mut t = FlowNode::tap("T");
        t.report_error(&mut rec);
        assert!(rec.events().is_empty());

        t.set_max_flow(5.0);
        t.receive(8.0);
        t.report_error(&mut rec);
        assert_eq!(rec.violations().count(), 1);

        let mut s = FlowNode::source("S");
        s.set_max_flow(1.0);
        s.report_error(&mut rec);
        assert_eq!(rec.violations().count(), 1);
    }
}
