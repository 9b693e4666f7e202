//! Observer contract used to report simulation results.

use hf_core::Real;

use crate::node::NodeKind;

pub use hf_core::NO_FLOW;

/// Receives per-element results from a simulation.
///
/// `notify_flow` is called once per element, in network insertion order.
/// `notify_flow_error` follows an element's `notify_flow` when a checked
/// simulation finds its input above its threshold.
pub trait SimulationObserver {
    /// `outputs` holds one value per output slot; single-output elements
    /// pass a one-element slice and a Sink passes `[NO_FLOW]`.
    fn notify_flow(&mut self, kind: NodeKind, name: &str, input: Real, outputs: &[Real]);

    fn notify_flow_error(&mut self, kind: NodeKind, name: &str, input: Real, max_flow: Real);
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowEvent {
    Flow {
        kind: NodeKind,
        name: String,
        input: Real,
        outputs: Vec<Real>,
    },
    Error {
        kind: NodeKind,
        name: String,
        input: Real,
        max_flow: Real,
    },
}

impl FlowEvent {
    pub fn name(&self) -> &str {
        match self {
            FlowEvent::Flow { name, .. } | FlowEvent::Error { name, .. } => name,
        }
    }

    /// Same notification, treating `NO_FLOW` as equal to itself.
    pub fn same_as(&self, other: &FlowEvent) -> bool {
        fn eq(a: Real, b: Real) -> bool {
            a.to_bits() == b.to_bits() || a == b
        }
        match (self, other) {
            (
                FlowEvent::Flow {
                    kind: k1,
                    name: n1,
                    input: i1,
                    outputs: o1,
                },
                FlowEvent::Flow {
                    kind: k2,
                    name: n2,
                    input: i2,
                    outputs: o2,
                },
            ) => {
                k1 == k2
                    && n1 == n2
                    && eq(*i1, *i2)
                    && o1.len() == o2.len()
                    && o1.iter().zip(o2).all(|(a, b)| eq(*a, *b))
            }
            (
                FlowEvent::Error {
                    kind: k1,
                    name: n1,
                    input: i1,
                    max_flow: m1,
                },
                FlowEvent::Error {
                    kind: k2,
                    name: n2,
                    input: i2,
                    max_flow: m2,
                },
            ) => k1 == k2 && n1 == n2 && eq(*i1, *i2) && eq(*m1, *m2),
            _ => false,
        }
    }
}

/// Observer that keeps every notification in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Vec<FlowEvent>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[FlowEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<FlowEvent> {
        self.events
    }

    /// Flow notifications only.
    pub fn flows(&self) -> impl Iterator<Item = &FlowEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, FlowEvent::Flow { .. }))
    }

    /// Threshold notifications only.
    pub fn violations(&self) -> impl Iterator<Item = &FlowEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, FlowEvent::Error { .. }))
    }

    /// Latest flow notification for `name`.
    pub fn flow_of(&self, name: &str) -> Option<&FlowEvent> {
        self.flows().filter(|e| e.name() == name).last()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl SimulationObserver for RecordingObserver {
    fn notify_flow(&mut self, kind: NodeKind, name: &str, input: Real, outputs: &[Real]) {
        self.events.push(FlowEvent::Flow {
            kind,
            name: name.to_owned(),
            input,
            outputs: outputs.to_vec(),
        });
    }

    fn notify_flow_error(&mut self, kind: NodeKind, name: &str, input: Real, max_flow: Real) {
        self.events.push(FlowEvent::Error {
            kind,
            name: name.to_owned(),
            input,
            max_flow,
        });
    }
}

/// Observer that turns notifications into `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SimulationObserver for TracingObserver {
    fn notify_flow(&mut self, kind: NodeKind, name: &str, input: Real, outputs: &[Real]) {
        tracing::info!(kind = kind.label(), name, input, ?outputs, "flow");
    }

    fn notify_flow_error(&mut self, kind: NodeKind, name: &str, input: Real, max_flow: Real) {
        tracing::warn!(kind = kind.label(), name, input, max_flow, "max flow exceeded");
    }
}
