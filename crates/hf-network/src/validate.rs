//! Topology validation logic.

use std::collections::HashSet;

use hf_core::NodeId;

use crate::error::{NetworkError, NetworkResult};
use crate::network::Network;
use crate::node::{FlowNode, NodeKind};

impl Network {
    /// Check that the network is a forest with consistent links.
    ///
    /// Every occupied output slot must point at a live element whose upstream
    /// points back, every upstream must list the element in exactly one slot,
    /// Sources have no upstream, and no upstream chain loops.
    pub fn validate(&self) -> NetworkResult<()> {
        validate_names(self)?;
        validate_links(self)?;
        validate_acyclic(self)
    }

    /// Non-Source elements with no upstream, e.g. what remains below a
    /// deleted Source.
    pub fn orphans(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.kind() != NodeKind::Source && node.upstream().is_none())
            .map(|(id, _)| id)
            .collect()
    }
}

fn topology(what: String) -> NetworkError {
    NetworkError::Topology { what }
}

fn validate_names(network: &Network) -> NetworkResult<()> {
    let mut seen = HashSet::new();
    for node in network.elements() {
        if !seen.insert(node.name()) {
            return Err(NetworkError::DuplicateName {
                name: node.name().to_owned(),
            });
        }
    }
    Ok(())
}

fn validate_links(network: &Network) -> NetworkResult<()> {
    for (id, node) in network.iter() {
        if let Some(up) = node.upstream() {
            if node.kind() == NodeKind::Source {
                return Err(topology(format!("source '{}' has an upstream", node.name())));
            }
            let parent = network.element(up).ok_or_else(|| {
                topology(format!("'{}' refers to a missing upstream {up}", node.name()))
            })?;
            let listed = parent.outputs().iter().filter(|d| **d == Some(id)).count();
            if listed != 1 {
                return Err(topology(format!(
                    "'{}' appears {listed} times below '{}'",
                    node.name(),
                    parent.name()
                )));
            }
        }

        for &child_id in node.outputs().iter().flatten() {
            let child = network.element(child_id).ok_or_else(|| {
                topology(format!(
                    "'{}' refers to a missing downstream {child_id}",
                    node.name()
                ))
            })?;
            if child.upstream() != Some(id) {
                return Err(topology(format!(
                    "'{}' lists '{}' downstream but not the other way round",
                    node.name(),
                    child.name()
                )));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(network: &Network) -> NetworkResult<()> {
    let limit = network.size();
    for (_, node) in network.iter() {
        let mut cursor = node.upstream();
        let mut steps = 0;
        while let Some(id) = cursor {
            steps += 1;
            if steps > limit {
                return Err(topology(format!(
                    "upstream chain of '{}' loops",
                    node.name()
                )));
            }
            cursor = network.element(id).and_then(FlowNode::upstream);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_empty_network() {
        assert!(Network::new().validate().is_ok());
    }

    #[test]
    fn validate_consistent_tree() {
        let mut net = Network::new();
        let s = net.add_element(FlowNode::source("S")).unwrap();
        let x = net.add_element(FlowNode::split("X")).unwrap();
        let a = net.add_element(FlowNode::sink("A")).unwrap();
        net.connect(s, x).unwrap();
        net.connect_at(x, a, 1).unwrap();
        assert!(net.validate().is_ok());
        assert!(net.orphans().is_empty());
    }

    #[test]
    fn validate_one_sided_link() {
        let mut net = Network::new();
        let s = net.add_element(FlowNode::source("S")).unwrap();
        let a = net.add_element(FlowNode::sink("A")).unwrap();
        net.element_mut(s).unwrap().set_downstream(Some(a)).unwrap();

        let result = net.validate();
        assert!(matches!(result, Err(NetworkError::Topology { .. })));
        assert_eq!(net.orphans(), vec![a]);
    }

    #[test]
    fn validate_loop() {
        let mut net = Network::new();
        let t1 = net.add_element(FlowNode::tap("T1")).unwrap();
        let t2 = net.add_element(FlowNode::tap("T2")).unwrap();
        net.element_mut(t1).unwrap().set_downstream(Some(t2)).unwrap();
        net.element_mut(t2).unwrap().set_upstream(Some(t1)).unwrap();
        net.element_mut(t2).unwrap().set_downstream(Some(t1)).unwrap();
        net.element_mut(t1).unwrap().set_upstream(Some(t2)).unwrap();

        assert!(validate_links(&net).is_ok());
        assert!(matches!(
            validate_acyclic(&net),
            Err(NetworkError::Topology { .. })
        ));
    }
}
