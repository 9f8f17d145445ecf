//! The immutable compiled topology an engine is constructed from.
//!
//! Building the network from surface rules is the job of the (out-of-scope)
//! IR compiler; what lands here is already a graph of alpha nodes, beta
//! join nodes, and production nodes. [`NetworkBuilder`] exists so tests and
//! embedding callers can assemble a `Network` directly without going
//! through that external compiler.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::action::Action;
use crate::predicate::Operator;
use rete_fact::FactValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub u64);

/// One unary test in an alpha node's test chain: `fact.field() <op> literal`.
#[derive(Debug, Clone, Serialize)]
pub struct AlphaTest {
    pub field: String,
    pub op: Operator,
    pub literal: FactValue,
}

/// A single-pattern filter: which fact type it applies to, its test
/// chain, and which of the matched fact's fields become token bindings.
#[derive(Debug, Clone, Serialize)]
pub struct AlphaNode {
    pub id: NodeId,
    pub fact_type: String,
    pub tests: Vec<AlphaTest>,
    /// `(fact field name, binding name)` pairs exposed to downstream joins.
    pub field_bindings: Vec<(String, String)>,
}

impl AlphaNode {
    /// Reverse lookup from a binding name (as used in a beta join's
    /// `join_keys`) back to the fact field it came from, so a join against
    /// this node's alpha memory can use the field index instead of a scan.
    pub fn field_for_binding(&self, binding: &str) -> Option<&str> {
        self.field_bindings
            .iter()
            .find(|(_, b)| b == binding)
            .map(|(f, _)| f.as_str())
    }
}

/// A two-input join: a left parent (an alpha node, for the first join in a
/// chain, or another beta node for deeper chains) and a right alpha node,
/// joined on shared binding names. The bindings a matching right-side fact
/// contributes come from the right alpha node's own `field_bindings` —
/// there is no separate binding list here, since the right alpha node
/// already defines what it exposes regardless of which join consumes it.
#[derive(Debug, Clone, Serialize)]
pub struct BetaNode {
    pub id: NodeId,
    pub left_parent: NodeId,
    pub right_alpha: NodeId,
    pub join_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionNode {
    pub id: NodeId,
    pub production_id: String,
    pub parent: NodeId,
    pub salience: i64,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Node {
    Alpha(AlphaNode),
    Beta(BetaNode),
    Production(ProductionNode),
}

/// The immutable compiled network. Constructed once at `start_tenant` and
/// shared (via `Arc`) for the engine instance's lifetime; never mutated
/// afterward — hot-swap is explicitly out of scope.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    nodes: BTreeMap<NodeId, Node>,
    children: BTreeMap<NodeId, Vec<NodeId>>,
    entry_points: BTreeMap<String, Vec<NodeId>>,
    version: String,
}

impl Network {
    /// Generic lookup used by the propagation engine when it needs to
    /// dispatch on node kind rather than assume one up front.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_alpha_node(&self, id: NodeId) -> Option<&AlphaNode> {
        match self.nodes.get(&id) {
            Some(Node::Alpha(n)) => Some(n),
            _ => None,
        }
    }

    pub fn get_beta_node(&self, id: NodeId) -> Option<&BetaNode> {
        match self.nodes.get(&id) {
            Some(Node::Beta(n)) => Some(n),
            _ => None,
        }
    }

    pub fn get_production_node(&self, id: NodeId) -> Option<&ProductionNode> {
        match self.nodes.get(&id) {
            Some(Node::Production(n)) => Some(n),
            _ => None,
        }
    }

    pub fn production_node_by_production_id(&self, production_id: &str) -> Option<&ProductionNode> {
        self.nodes.values().find_map(|n| match n {
            Node::Production(p) if p.production_id == production_id => Some(p),
            _ => None,
        })
    }

    /// Children in stable, compiled (insertion) order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Alpha entry points for a fact type, in compiled order.
    pub fn alpha_entry_points(&self, fact_type: &str) -> &[NodeId] {
        self.entry_points
            .get(fact_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn alpha_node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter_map(|(id, n)| matches!(n, Node::Alpha(_)).then_some(*id))
            .collect()
    }

    pub fn beta_nodes(&self) -> Vec<&BetaNode> {
        self.nodes
            .values()
            .filter_map(|n| match n {
                Node::Beta(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn production_ids(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter_map(|n| match n {
                Node::Production(p) => Some(p.production_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Assembles a [`Network`] node-by-node. Adjacency (`children`) and entry
/// points are derived automatically from the `left_parent`/`right_alpha`/
/// `parent` references each node declares; callers never set them by hand.
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_alpha(
        &mut self,
        fact_type: impl Into<String>,
        tests: Vec<AlphaTest>,
        field_bindings: Vec<(String, String)>,
    ) -> NodeId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node::Alpha(AlphaNode {
                id,
                fact_type: fact_type.into(),
                tests,
                field_bindings,
            }),
        );
        id
    }

    pub fn add_beta(
        &mut self,
        left_parent: NodeId,
        right_alpha: NodeId,
        join_keys: Vec<String>,
    ) -> NodeId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node::Beta(BetaNode {
                id,
                left_parent,
                right_alpha,
                join_keys,
            }),
        );
        id
    }

    pub fn add_production(
        &mut self,
        parent: NodeId,
        production_id: impl Into<String>,
        salience: i64,
        actions: Vec<Action>,
    ) -> NodeId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node::Production(ProductionNode {
                id,
                production_id: production_id.into(),
                parent,
                salience,
                actions,
            }),
        );
        id
    }

    pub fn build(self) -> Network {
        let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        let mut entry_points: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();

        // Iterate in NodeId order so that entry points and adjacency lists
        // reflect compiled (insertion) order deterministically.
        for (id, node) in &self.nodes {
            match node {
                Node::Alpha(alpha) => {
                    entry_points.entry(alpha.fact_type.clone()).or_default().push(*id);
                }
                Node::Beta(beta) => {
                    children.entry(beta.left_parent).or_default().push(*id);
                    children.entry(beta.right_alpha).or_default().push(*id);
                }
                Node::Production(prod) => {
                    children.entry(prod.parent).or_default().push(*id);
                }
            }
        }

        let version = compute_version(&self.nodes);

        Network {
            nodes: self.nodes,
            children,
            entry_points,
            version,
        }
    }
}

/// SHA-256 over a canonical (sorted-key) JSON serialization of the node
/// set, used as the network's `version`. Carried in snapshots so a
/// snapshot taken against one network cannot be restored into another.
fn compute_version(nodes: &BTreeMap<NodeId, Node>) -> String {
    let canonical = serde_json::to_vec(nodes).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    #[test]
    fn single_pattern_network_has_one_entry_point_and_production_child() {
        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha(
            "Employee",
            vec![AlphaTest {
                field: "hours".into(),
                op: Operator::Gt,
                literal: FactValue::Int(40),
            }],
            vec![
                ("id".into(), "E".into()),
                ("hours".into(), "H".into()),
            ],
        );
        let production = builder.add_production(alpha, "overtime_rule", 0, vec![Action::Log {
            level: "info".into(),
            message: "overtime".into(),
        }]);

        let network = builder.build();
        assert_eq!(network.alpha_entry_points("Employee"), &[alpha]);
        assert_eq!(network.children(alpha), &[production]);
        assert!(network.get_production_node(production).is_some());
    }

    #[test]
    fn version_is_stable_for_identical_topologies() {
        let build = || {
            let mut b = NetworkBuilder::new();
            let a = b.add_alpha("Employee", vec![], vec![]);
            b.add_production(a, "r1", 0, vec![]);
            b.build()
        };
        assert_eq!(build().version(), build().version());
    }

    #[test]
    fn version_changes_when_topology_changes() {
        let mut b1 = NetworkBuilder::new();
        let a1 = b1.add_alpha("Employee", vec![], vec![]);
        b1.add_production(a1, "r1", 0, vec![]);
        let n1 = b1.build();

        let mut b2 = NetworkBuilder::new();
        let a2 = b2.add_alpha("Employee", vec![], vec![]);
        b2.add_production(a2, "r2", 0, vec![]);
        let n2 = b2.build();

        assert_ne!(n1.version(), n2.version());
    }
}
