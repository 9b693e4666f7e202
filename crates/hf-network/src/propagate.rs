//! Downstream flow propagation.
//!
//! Every element takes its input from the output slot it occupies on its
//! upstream element, then hands off to its children. Starting from a Source
//! this recomputes the whole tree below it.

use hf_core::{NO_FLOW, NodeId, Real};
use tracing::warn;

use crate::error::NetworkResult;
use crate::network::Network;

impl Network {
    /// Recompute flows for `start` and everything below it.
    ///
    /// A Source keeps its configured flow; any other element first pulls its
    /// input from its upstream (`NO_FLOW` when detached).
    pub fn set_tree_flow(&mut self, start: NodeId) -> NetworkResult<()> {
        self.node(start)?;
        self.propagate(start);
        Ok(())
    }

    /// Depth-first, parents before children, outputs in slot order.
    pub(crate) fn propagate(&mut self, start: NodeId) {
        let mut visited = vec![false; self.arena_len()];
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            match visited.get_mut(id.slot()) {
                Some(seen) if *seen => {
                    warn!(id = %id, "element reached twice during propagation; skipping");
                    continue;
                }
                Some(seen) => *seen = true,
                None => continue,
            }

            let inflow = self.inflow_of(id);
            let Some(node) = self.element_mut(id) else {
                continue;
            };
            node.receive(inflow);
            stack.extend(node.outputs().iter().rev().flatten().copied());
        }
    }

    /// Flow arriving at `id` from the slot it occupies upstream.
    fn inflow_of(&self, id: NodeId) -> Real {
        let Some(parent) = self
            .element(id)
            .and_then(|node| node.upstream())
            .and_then(|up| self.element(up))
        else {
            return NO_FLOW;
        };
        parent
            .slot_of(id)
            .map_or(NO_FLOW, |slot| parent.out_flow_at(slot))
    }
}
