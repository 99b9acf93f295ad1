use crate::algebra::VectorId;
use crate::rules::EdgeKind;
use crate::topology::NodeId;

slotmap::new_key_type! {
    /// Unique identifier for an edge in the multigrid.
    pub struct EdgeId;
}

/// Data associated with an edge of the node graph.
#[derive(Debug, Clone)]
pub struct EdgeData {
    /// The unordered endpoint pair, stored with the smaller key first.
    pub nodes: [NodeId; 2],
    /// Midpoint node, present exactly while some rule bisects this edge.
    pub mid_node: Option<NodeId>,
    /// Closure work bit: this edge is to be bisected.
    pub pattern: bool,
    /// Closure work bit distinguishing propagation generations.
    pub add_pattern: bool,
    /// Role of this edge within its father's subdivision.
    pub kind: EdgeKind,
    /// Number of elements containing both endpoints.
    pub no_of_elem: u16,
    pub vector: Option<VectorId>,
    pub level: usize,
}

impl EdgeData {
    #[must_use]
    pub fn new(nodes: [NodeId; 2], level: usize) -> Self {
        Self {
            nodes,
            mid_node: None,
            pattern: false,
            add_pattern: false,
            kind: EdgeKind::None,
            no_of_elem: 0,
            vector: None,
            level,
        }
    }

    /// The endpoint other than `node`.
    #[must_use]
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.nodes[0] == node {
            self.nodes[1]
        } else {
            self.nodes[0]
        }
    }
}
