//! The network container: an arena that owns every element.

use std::collections::HashMap;

use hf_core::{NO_FLOW, NodeId};
use tracing::{debug, info};

use crate::builder::HydraulicBuilder;
use crate::error::{NetworkError, NetworkResult};
use crate::node::{FlowNode, NodeKind};
use crate::observer::SimulationObserver;
use crate::options::{SimulationOptions, SimulationSummary};

/// A hydraulic network.
///
/// Elements live in an arena addressed by [`NodeId`]; neighbours refer to each
/// other by handle only. Handles are never reused, so a handle to a deleted
/// element stays dead. Enumeration and reporting follow insertion order.
#[derive(Debug, Clone, Default)]
pub struct Network {
    slots: Vec<Option<FlowNode>>,
    order: Vec<NodeId>,
    names: HashMap<String, NodeId>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fluent builder.
    pub fn builder() -> HydraulicBuilder {
        HydraulicBuilder::new()
    }

    /// Register an element and return its handle. Names must be unique.
    pub fn add_element(&mut self, node: FlowNode) -> NetworkResult<NodeId> {
        if self.names.contains_key(node.name()) {
            return Err(NetworkError::DuplicateName {
                name: node.name().to_owned(),
            });
        }
        let id = NodeId::try_from_usize(self.slots.len())?;
        self.names.insert(node.name().to_owned(), id);
        self.order.push(id);
        self.slots.push(Some(node));
        Ok(id)
    }

    /// Number of live elements.
    pub fn size(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles of live elements in insertion order.
    pub fn ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Live elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = &FlowNode> + '_ {
        self.iter().map(|(_, node)| node)
    }

    /// Live elements with their handles, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &FlowNode)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.element(id).map(|node| (id, node)))
    }

    pub fn element(&self, id: NodeId) -> Option<&FlowNode> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut FlowNode> {
        self.slots.get_mut(id.slot()).and_then(Option::as_mut)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Element by name.
    pub fn get(&self, name: &str) -> Option<&FlowNode> {
        self.find(name).and_then(|id| self.element(id))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FlowNode> {
        let id = self.find(name)?;
        self.element_mut(id)
    }

    /// Arena length, dead slots included.
    pub(crate) fn arena_len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> NetworkResult<&FlowNode> {
        self.element(id).ok_or(NetworkError::UnknownNode { id })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> NetworkResult<&mut FlowNode> {
        self.element_mut(id).ok_or(NetworkError::UnknownNode { id })
    }

    /// Connect `to` downstream of output 0 of `from`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> NetworkResult<()> {
        self.connect_at(from, to, 0)
    }

    /// Connect `to` downstream of output `index` of `from`.
    ///
    /// `to` is detached from any previous upstream first, and an element
    /// already sitting in that slot loses its upstream. Links that would close
    /// a loop are rejected.
    pub fn connect_at(&mut self, from: NodeId, to: NodeId, index: usize) -> NetworkResult<()> {
        let parent = self.node(from)?;
        if parent.kind() == NodeKind::Sink {
            return Err(NetworkError::Unsupported {
                kind: NodeKind::Sink,
                what: "connect",
            });
        }
        if index >= parent.arity() {
            return Err(NetworkError::OutputOutOfRange {
                name: parent.name().to_owned(),
                index,
                arity: parent.arity(),
            });
        }
        let replaced = parent.downstream_at(index);

        let child = self.node(to)?;
        if child.kind() == NodeKind::Source {
            return Err(NetworkError::Unsupported {
                kind: NodeKind::Source,
                what: "connect as downstream",
            });
        }
        let previous_parent = child.upstream();

        if self.is_ancestor(to, from) {
            return Err(NetworkError::Topology {
                what: format!(
                    "connecting '{}' below '{}' would create a loop",
                    self.node(to)?.name(),
                    self.node(from)?.name()
                ),
            });
        }

        if let Some(old) = previous_parent.and_then(|p| self.element_mut(p)) {
            if let Some(i) = old.slot_of(to) {
                old.replace_slot(i, None);
            }
        }
        if let Some(evicted) = replaced.filter(|&r| r != to) {
            if let Some(node) = self.element_mut(evicted) {
                node.replace_upstream(None);
            }
        }
        self.node_mut(from)?.replace_slot(index, Some(to));
        self.node_mut(to)?.replace_upstream(Some(from));

        debug!(from = %from, to = %to, index, "connected");
        Ok(())
    }

    /// True if `candidate` is `node` or lies on its upstream chain.
    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        // Bounded walk: a corrupted chain must not spin forever.
        for _ in 0..=self.size() {
            match cursor {
                Some(id) if id == candidate => return true,
                Some(id) => cursor = self.element(id).and_then(FlowNode::upstream),
                None => return false,
            }
        }
        true
    }

    // ---- simulation -----------------------------------------------------

    /// Propagate from every Source and report every element.
    pub fn simulate<O: SimulationObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> SimulationSummary {
        self.simulate_with(observer, &SimulationOptions::default())
    }

    /// As [`simulate`](Self::simulate); with `enable_max_flow_check`, elements
    /// whose input exceeds their threshold are also reported as errors.
    pub fn simulate_checked<O: SimulationObserver + ?Sized>(
        &mut self,
        observer: &mut O,
        enable_max_flow_check: bool,
    ) -> SimulationSummary {
        self.simulate_with(
            observer,
            &SimulationOptions::default().with_max_flow_check(enable_max_flow_check),
        )
    }

    pub fn simulate_with<O: SimulationObserver + ?Sized>(
        &mut self,
        observer: &mut O,
        options: &SimulationOptions,
    ) -> SimulationSummary {
        let sources: Vec<NodeId> = self
            .iter()
            .filter(|(_, node)| node.kind() == NodeKind::Source)
            .map(|(id, _)| id)
            .collect();
        for &source in &sources {
            self.propagate(source);
        }

        let mut summary = SimulationSummary::default();
        for node in self.elements() {
            node.report(observer);
            summary.reported += 1;
            if options.max_flow_check && node.kind() != NodeKind::Source && !node.max_flow_check()
            {
                node.report_error(observer);
                summary.violations += 1;
            }
        }

        debug!(
            sources = sources.len(),
            reported = summary.reported,
            violations = summary.violations,
            checked = options.max_flow_check,
            "simulation complete"
        );
        summary
    }

    // ---- deletion -------------------------------------------------------

    /// Delete the element called `name`.
    ///
    /// Returns `Ok(false)` and leaves the topology untouched when the element
    /// refuses (a split with more than one connected output).
    pub fn delete_element(&mut self, name: &str) -> NetworkResult<bool> {
        let id = self.find(name).ok_or_else(|| NetworkError::UnknownElement {
            name: name.to_owned(),
        })?;
        self.delete(id)
    }

    /// Delete by handle; see [`delete_element`](Self::delete_element).
    pub fn delete(&mut self, id: NodeId) -> NetworkResult<bool> {
        let kind = self.node(id)?.kind();
        let done = match kind {
            NodeKind::Source => {
                self.detach_source(id)?;
                true
            }
            NodeKind::Tap | NodeKind::Split | NodeKind::Multisplit | NodeKind::Sink => {
                self.splice_out(id)?
            }
        };

        if done {
            if let Some(node) = self.slots.get_mut(id.slot()).and_then(Option::take) {
                self.names.remove(node.name());
                self.order.retain(|&o| o != id);
                info!(name = node.name(), kind = %kind, "element deleted");
            }
        } else {
            info!(id = %id, kind = %kind, "deletion refused: several outputs connected");
        }
        Ok(done)
    }

    /// Clear everything downstream of a Source, then cut it loose.
    ///
    /// The configured flow is restored afterwards so the detached element
    /// still reads as it did.
    fn detach_source(&mut self, id: NodeId) -> NetworkResult<()> {
        let source = self.node_mut(id)?;
        let saved = source.flow();
        let child = source.downstream();
        source.set_flow(NO_FLOW);
        self.propagate(id);

        let source = self.node_mut(id)?;
        source.set_flow(saved);
        source.clear_links();
        if let Some(node) = child.and_then(|c| self.element_mut(c)) {
            node.replace_upstream(None);
        }
        Ok(())
    }

    /// Reconnect the upstream of `id` straight to its only downstream, in the
    /// same upstream slot `id` occupied. Refuses when two or more outputs are
    /// connected.
    fn splice_out(&mut self, id: NodeId) -> NetworkResult<bool> {
        let node = self.node(id)?;
        if node.occupied_outputs() > 1 {
            return Ok(false);
        }
        let child = node.outputs().iter().flatten().next().copied();
        let upstream = node.upstream();
        let parent_slot = upstream
            .and_then(|u| self.element(u))
            .and_then(|p| p.slot_of(id));

        let new_upstream = match (upstream, parent_slot) {
            (Some(u), Some(i)) => {
                self.node_mut(u)?.replace_slot(i, child);
                Some(u)
            }
            _ => None,
        };
        if let Some(c) = child {
            self.node_mut(c)?.replace_upstream(new_upstream);
        }
        self.node_mut(id)?.clear_links();
        Ok(true)
    }
}
