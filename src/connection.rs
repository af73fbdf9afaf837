use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::component::{Circuit, ComponentKind};
use crate::types::NodeId;

/// Pin names treated as a supply rail.
pub const SUPPLY_RAILS: [&str; 2] = ["5v", "3v3"];

/// Undirected pin-adjacency graph built from a circuit's wires and the
/// internal conduction of its resistors.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    adjacency: HashMap<NodeId, HashSet<NodeId>>,
}

impl Netlist {
    pub fn new() -> Self {
        Netlist::default()
    }

    /// Build the graph: one edge per wire, plus one edge joining the first two
    /// pins of every resistor. Nothing else conducts.
    pub fn build(circuit: &Circuit) -> Self {
        let mut netlist = Netlist::new();

        for wire in circuit.wires() {
            netlist.connect(
                NodeId::new(&wire.start.component_id, &wire.start.pin_name),
                NodeId::new(&wire.end.component_id, &wire.end.pin_name),
            );
        }

        for component in circuit.components() {
            if component.kind != ComponentKind::Resistor {
                continue;
            }
            let pins = component.pins();
            if pins.len() >= 2 {
                netlist.connect(
                    NodeId::new(&component.id, &pins[0]),
                    NodeId::new(&component.id, &pins[1]),
                );
            }
        }

        netlist
    }

    /// Connect two pins bidirectionally
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        self.adjacency
            .entry(a.clone())
            .or_default()
            .insert(b.clone());
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn are_connected(&self, a: &NodeId, b: &NodeId) -> bool {
        self.adjacency
            .get(a)
            .map(|neighbors| neighbors.contains(b))
            .unwrap_or(false)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Every node electrically reachable from `start`, `start` included.
    pub fn flood(&self, start: &NodeId) -> Net {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start.clone()];
        seen.insert(start.clone());

        while let Some(node) = stack.pop() {
            if let Some(neighbors) = self.adjacency.get(&node) {
                for next in neighbors {
                    if seen.insert(next.clone()) {
                        stack.push(next.clone());
                    }
                }
            }
        }

        Net { nodes: seen }
    }

    /// Partition every known node into its net. Useful for debugging circuits.
    pub fn nets(&self) -> Vec<Net> {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut nets = Vec::new();

        let mut roots: Vec<&NodeId> = self.adjacency.keys().collect();
        roots.sort();

        for root in roots {
            if visited.contains(root) {
                continue;
            }
            let mut group = BTreeSet::new();
            let mut queue = VecDeque::new();
            queue.push_back(root);

            while let Some(current) = queue.pop_front() {
                if visited.insert(current) {
                    group.insert(current.clone());
                    if let Some(neighbors) = self.adjacency.get(current) {
                        queue.extend(neighbors.iter().filter(|n| !visited.contains(n)));
                    }
                }
            }
            nets.push(Net { nodes: group });
        }

        nets
    }
}

/// A set of electrically joined pins, produced by [`Netlist::flood`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Net {
    nodes: BTreeSet<NodeId>,
}

impl Net {
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distinct ids of the components owning a pin in this net, in sorted order.
    pub fn component_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for node in &self.nodes {
            // Nodes are ordered by component first, so duplicates are adjacent.
            if ids.last() != Some(&node.component.as_str()) {
                ids.push(node.component.as_str());
            }
        }
        ids
    }

    /// True when a Ground component owns any pin of the net.
    pub fn has_ground(&self, circuit: &Circuit) -> bool {
        self.nodes.iter().any(|node| {
            circuit
                .get(&node.component)
                .map(|c| c.kind == ComponentKind::Ground)
                .unwrap_or(false)
        })
    }

    /// True when any pin of the net is a supply rail (`5V`, `3V3`).
    pub fn has_vcc(&self) -> bool {
        self.nodes.iter().any(|node| {
            let pin = node.pin.to_lowercase();
            SUPPLY_RAILS.contains(&pin.as_str())
        })
    }
}
