use crate::algebra::VectorId;
use crate::topology::{EdgeId, VertexId};

slotmap::new_key_type! {
    /// Unique identifier for a node in the multigrid.
    pub struct NodeId;
}

/// Data associated with a node.
///
/// A node is the per-level incarnation of a vertex; father/son links tie
/// the incarnations of consecutive levels together, the incident edges
/// form the level's edge graph.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub vertex: VertexId,
    /// The node on the coarser level this node descends from.
    pub father: Option<NodeId>,
    /// The node on the finer level descending from this node.
    pub son: Option<NodeId>,
    /// Incident edges.
    pub links: Vec<EdgeId>,
    pub vector: Option<VectorId>,
    pub level: usize,
}

impl NodeData {
    #[must_use]
    pub fn new(vertex: VertexId, level: usize) -> Self {
        Self {
            vertex,
            father: None,
            son: None,
            links: Vec::new(),
            vector: None,
            level,
        }
    }
}
