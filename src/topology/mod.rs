//! The multigrid container.
//!
//! A [`MultiGrid`] owns every mesh and algebra entity in typed slotmap
//! arenas; the per-level [`Grid`] records hold the iteration order of
//! elements, nodes and vectors. Entities reference each other through ids,
//! neighbor pointers are `Option<ElementId>` and are kept bidirectionally
//! consistent by the refinement executor.

pub mod edge;
pub mod element;
pub mod node;
pub mod vertex;

pub use edge::{EdgeData, EdgeId};
pub use element::{ElementClass, ElementData, ElementId, ElementSideData, SideId};
pub use node::{NodeData, NodeId};
pub use vertex::{BoundarySegment, PlanarSegment, VertexData, VertexId, VertexSegment};

use std::collections::HashMap;

use slotmap::SlotMap;

use crate::algebra::{ConnectionData, ConnectionId, Format, VectorData, VectorId, VectorObject};
use crate::error::TopologyError;
use crate::math::{shapes, Point3, Vector2};
use crate::simplex::{CORNERS_OF_ELEM, CORNER_OF_SIDE, SIDES_OF_ELEM};

/// Boundary parametrization of one side of an element to be inserted.
#[derive(Debug, Clone)]
pub struct SideSpec {
    pub segment: usize,
    pub params: [Vector2; 3],
}

/// One level of the grid hierarchy.
#[derive(Debug, Default)]
pub struct Grid {
    pub(crate) elements: Vec<ElementId>,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) vectors: Vec<VectorId>,
    pub(crate) changed: bool,
}

/// Central arena that owns all mesh and algebra entities.
pub struct MultiGrid {
    pub(crate) vertices: SlotMap<VertexId, VertexData>,
    pub(crate) nodes: SlotMap<NodeId, NodeData>,
    pub(crate) edges: SlotMap<EdgeId, EdgeData>,
    pub(crate) elements: SlotMap<ElementId, ElementData>,
    pub(crate) sides: SlotMap<SideId, ElementSideData>,
    pub(crate) vectors: SlotMap<VectorId, VectorData>,
    pub(crate) connections: SlotMap<ConnectionId, ConnectionData>,
    pub(crate) grids: Vec<Grid>,
    edge_lookup: HashMap<(NodeId, NodeId), EdgeId>,
    segments: Vec<Box<dyn BoundarySegment>>,
    format: Format,
}

fn edge_key(n0: NodeId, n1: NodeId) -> (NodeId, NodeId) {
    if n0 < n1 {
        (n0, n1)
    } else {
        (n1, n0)
    }
}

impl MultiGrid {
    /// Creates a multigrid with a single empty level.
    #[must_use]
    pub fn new(format: Format) -> Self {
        Self {
            vertices: SlotMap::with_key(),
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            elements: SlotMap::with_key(),
            sides: SlotMap::with_key(),
            vectors: SlotMap::with_key(),
            connections: SlotMap::with_key(),
            grids: vec![Grid::default()],
            edge_lookup: HashMap::new(),
            segments: Vec::new(),
            format,
        }
    }

    #[must_use]
    pub fn format(&self) -> &Format {
        &self.format
    }

    #[must_use]
    pub fn top_level(&self) -> usize {
        self.grids.len() - 1
    }

    #[must_use]
    pub fn level_elements(&self, level: usize) -> &[ElementId] {
        &self.grids[level].elements
    }

    #[must_use]
    pub fn level_vectors(&self, level: usize) -> &[VectorId] {
        &self.grids[level].vectors
    }

    /// Registers a boundary segment and returns its index.
    pub fn add_segment(&mut self, segment: Box<dyn BoundarySegment>) -> usize {
        self.segments.push(segment);
        self.segments.len() - 1
    }

    #[must_use]
    pub(crate) fn segment(&self, id: usize) -> &dyn BoundarySegment {
        self.segments[id].as_ref()
    }

    /// Appends a new, empty finest level.
    pub fn create_new_level(&mut self) {
        self.grids.push(Grid::default());
    }

    /// Disposes the finest level; it must be empty of elements.
    ///
    /// # Errors
    ///
    /// Returns an error when the finest level still carries elements or is
    /// level 0.
    pub fn dispose_top_level(&mut self) -> Result<(), TopologyError> {
        let top = self.top_level();
        if top == 0 || !self.grids[top].elements.is_empty() {
            return Err(TopologyError::LevelNotDisposable(top));
        }
        let node_list = self.grids[top].nodes.clone();
        for node in node_list {
            if !self.nodes.contains_key(node) {
                continue;
            }
            if let Some(father) = self.nodes[node].father {
                self.nodes[father].son = None;
            }
            let vertex = self.nodes[node].vertex;
            self.dispose_node(node);
            if self.vertices.contains_key(vertex) && self.vertices[vertex].father.is_some() {
                self.dispose_vertex(vertex);
            }
        }
        let vector_list = self.grids[top].vectors.clone();
        for vector in vector_list {
            if self.vectors.contains_key(vector) {
                self.dispose_vector(vector);
            }
        }
        self.grids.pop();
        Ok(())
    }

    // --- Accessors ---

    /// Returns a reference to the vertex data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found.
    pub fn vertex(&self, id: VertexId) -> Result<&VertexData, TopologyError> {
        self.vertices
            .get(id)
            .ok_or(TopologyError::EntityNotFound("vertex"))
    }

    /// Returns a reference to the node data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found.
    pub fn node(&self, id: NodeId) -> Result<&NodeData, TopologyError> {
        self.nodes
            .get(id)
            .ok_or(TopologyError::EntityNotFound("node"))
    }

    /// Returns a reference to the edge data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found.
    pub fn edge(&self, id: EdgeId) -> Result<&EdgeData, TopologyError> {
        self.edges
            .get(id)
            .ok_or(TopologyError::EntityNotFound("edge"))
    }

    /// Returns a reference to the element data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found.
    pub fn element(&self, id: ElementId) -> Result<&ElementData, TopologyError> {
        self.elements
            .get(id)
            .ok_or(TopologyError::EntityNotFound("element"))
    }

    /// Returns a reference to a boundary side record, or an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found.
    pub fn side(&self, id: SideId) -> Result<&ElementSideData, TopologyError> {
        self.sides
            .get(id)
            .ok_or(TopologyError::EntityNotFound("side"))
    }

    // --- Vertices ---

    pub(crate) fn create_vertex(&mut self, data: VertexData) -> VertexId {
        self.vertices.insert(data)
    }

    pub(crate) fn dispose_vertex(&mut self, id: VertexId) {
        self.vertices.remove(id);
    }

    // --- Nodes ---

    /// Creates a node owning `vertex` on the given level.
    pub(crate) fn create_node(&mut self, level: usize, vertex: VertexId) -> NodeId {
        let id = self.nodes.insert(NodeData::new(vertex, level));
        self.grids[level].nodes.push(id);
        if self.format.vector_len(VectorObject::Node(id).kind()) > 0 {
            let v = self.create_vector(level, VectorObject::Node(id));
            self.nodes[id].vector = v;
        }
        id
    }

    /// Disposes a node, its remaining incident edges and its vector.
    pub(crate) fn dispose_node(&mut self, id: NodeId) {
        let links = self.nodes[id].links.clone();
        for edge in links {
            self.dispose_edge(edge);
        }
        self.dispose_node_raw(id);
    }

    fn dispose_node_raw(&mut self, id: NodeId) {
        if let Some(vector) = self.nodes[id].vector {
            self.dispose_vector(vector);
        }
        let level = self.nodes[id].level;
        self.grids[level].nodes.retain(|&n| n != id);
        self.nodes.remove(id);
    }

    // --- Edges ---

    /// The edge between two nodes, if present.
    #[must_use]
    pub fn get_edge(&self, n0: NodeId, n1: NodeId) -> Option<EdgeId> {
        self.edge_lookup.get(&edge_key(n0, n1)).copied()
    }

    /// Returns the existing edge between the nodes or creates a new one.
    pub(crate) fn create_edge(&mut self, level: usize, n0: NodeId, n1: NodeId) -> EdgeId {
        if let Some(existing) = self.get_edge(n0, n1) {
            return existing;
        }
        let key = edge_key(n0, n1);
        let id = self.edges.insert(EdgeData::new([key.0, key.1], level));
        self.edge_lookup.insert(key, id);
        self.nodes[n0].links.push(id);
        self.nodes[n1].links.push(id);
        if self.format.vector_len(VectorObject::Edge(id).kind()) > 0 {
            let v = self.create_vector(level, VectorObject::Edge(id));
            self.edges[id].vector = v;
        }
        id
    }

    /// Removes an edge from the node graph, disposing its vector.
    pub(crate) fn dispose_edge(&mut self, id: EdgeId) {
        let [n0, n1] = self.edges[id].nodes;
        self.edge_lookup.remove(&edge_key(n0, n1));
        self.nodes[n0].links.retain(|&e| e != id);
        self.nodes[n1].links.retain(|&e| e != id);
        if let Some(vector) = self.edges[id].vector {
            self.dispose_vector(vector);
        }
        self.edges.remove(id);
    }

    /// The edge along father edge `e` of the element.
    #[must_use]
    pub fn element_edge(&self, elem: ElementId, e: usize) -> Option<EdgeId> {
        let corners = self.elements[elem].corners;
        let c = crate::simplex::CORNER_OF_EDGE[e];
        self.get_edge(corners[c[0]], corners[c[1]])
    }

    /// Decrements the element counter of all corner pair edges, disposing
    /// edges whose counter drops to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if a counter was already zero.
    pub(crate) fn dispose_edges_from_element(
        &mut self,
        elem: ElementId,
    ) -> Result<(), TopologyError> {
        let corners = self.elements[elem].corners;
        let mut result = Ok(());
        for i in 0..CORNERS_OF_ELEM {
            for j in (i + 1)..CORNERS_OF_ELEM {
                if let Some(edge) = self.get_edge(corners[i], corners[j]) {
                    match self.edges[edge].no_of_elem {
                        0 => result = Err(TopologyError::EdgeElementUnderflow),
                        1 => self.dispose_edge(edge),
                        n => self.edges[edge].no_of_elem = n - 1,
                    }
                }
            }
        }
        result
    }

    // --- Elements ---

    /// Allocates an element on a level, together with its algebra vectors.
    pub(crate) fn create_element(
        &mut self,
        level: usize,
        corners: [NodeId; 4],
        boundary: bool,
    ) -> ElementId {
        let id = self.elements.insert(ElementData::new(corners, level, boundary));
        self.grids[level].elements.push(id);
        self.grids[level].changed = true;
        if self.format.vector_len(VectorObject::Elem(id).kind()) > 0 {
            let v = self.create_vector(level, VectorObject::Elem(id));
            self.elements[id].vector = v;
        }
        if self.format.vector_len(VectorObject::Side(id, 0).kind()) > 0 {
            for s in 0..SIDES_OF_ELEM {
                let v = self.create_vector(level, VectorObject::Side(id, s as u8));
                self.elements[id].side_vectors[s] = v;
                if let Some(v) = v {
                    self.vectors[v].count = 1;
                }
            }
        }
        id
    }

    /// Disposes an element, its side records and its algebra vectors.
    /// Shared side vectors survive on the neighbor.
    pub(crate) fn dispose_element(&mut self, id: ElementId) {
        for s in 0..SIDES_OF_ELEM {
            if let Some(side) = self.elements[id].sides[s] {
                self.sides.remove(side);
            }
            if let Some(vector) = self.elements[id].side_vectors[s] {
                if self.vectors[vector].count > 1 {
                    // the neighbor keeps the shared vector
                    self.vectors[vector].count -= 1;
                    if let Some(nb) = self.elements[id].nb[s] {
                        if let Some(nb_side) = self.elements[nb].side_facing(id) {
                            self.vectors[vector].object = VectorObject::Side(nb, nb_side as u8);
                        }
                    }
                } else {
                    self.dispose_vector(vector);
                }
            }
        }
        if let Some(vector) = self.elements[id].vector {
            self.dispose_vector(vector);
        }
        // detach from remaining neighbors
        for s in 0..SIDES_OF_ELEM {
            if let Some(nb) = self.elements[id].nb[s] {
                if let Some(nb_side) = self.elements[nb].side_facing(id) {
                    self.elements[nb].nb[nb_side] = None;
                }
            }
        }
        let level = self.elements[id].level;
        self.grids[level].elements.retain(|&e| e != id);
        self.grids[level].changed = true;
        self.elements.remove(id);
    }

    /// World positions of the element's corners.
    #[must_use]
    pub fn corner_positions(&self, elem: ElementId) -> [Point3; 4] {
        self.elements[elem]
            .corners
            .map(|n| self.vertices[self.nodes[n].vertex].pos)
    }

    // --- Level-0 construction ---

    /// Creates a level-0 corner node at a world position.
    pub fn insert_inner_node(&mut self, pos: Point3) -> NodeId {
        let vertex = self.create_vertex(VertexData::inner(pos, crate::math::Vector3::zeros()));
        self.create_node(0, vertex)
    }

    /// Creates a level-0 corner node on the boundary.
    pub fn insert_boundary_node(&mut self, pos: Point3, segments: Vec<VertexSegment>) -> NodeId {
        let vertex = self.create_vertex(VertexData::boundary(pos, segments));
        self.create_node(0, vertex)
    }

    /// Inserts a tetrahedron on level 0 and wires it to already inserted
    /// neighbors. Corner order is normalized to positive parity; the side
    /// specifications travel with their sides.
    ///
    /// # Errors
    ///
    /// Returns an error when an edge element counter overflows.
    pub fn insert_tetrahedron(
        &mut self,
        corners: [NodeId; 4],
        mut side_specs: [Option<SideSpec>; 4],
    ) -> Result<ElementId, TopologyError> {
        let mut corners = corners;
        let positions = corners.map(|n| self.vertices[self.nodes[n].vertex].pos);
        if !shapes::has_positive_parity(&positions) {
            corners.rotate_left(1);
            side_specs.rotate_left(1);
        }

        let boundary = side_specs.iter().any(Option::is_some);
        let id = self.create_element(0, corners, boundary);

        // edges of the element
        for i in 0..CORNERS_OF_ELEM {
            for j in (i + 1)..CORNERS_OF_ELEM {
                let edge = self.create_edge(0, corners[i], corners[j]);
                self.edges[edge].no_of_elem = self.edges[edge]
                    .no_of_elem
                    .checked_add(1)
                    .ok_or(TopologyError::EdgeElementOverflow)?;
            }
        }

        // boundary side records
        for (s, spec) in side_specs.iter().enumerate() {
            if let Some(spec) = spec {
                let side = self.sides.insert(ElementSideData {
                    segment: spec.segment,
                    params: spec.params,
                });
                self.elements[id].sides[s] = Some(side);
            }
        }

        // wire neighbors among the level-0 elements
        let others: Vec<ElementId> = self.grids[0]
            .elements
            .iter()
            .copied()
            .filter(|&e| e != id)
            .collect();
        for s in 0..SIDES_OF_ELEM {
            let mut triple = CORNER_OF_SIDE[s].map(|c| corners[c]);
            triple.sort_unstable();
            'others: for &other in &others {
                let other_corners = self.elements[other].corners;
                for s2 in 0..SIDES_OF_ELEM {
                    let mut other_triple = CORNER_OF_SIDE[s2].map(|c| other_corners[c]);
                    other_triple.sort_unstable();
                    if triple == other_triple {
                        self.elements[id].nb[s] = Some(other);
                        self.elements[other].nb[s2] = Some(id);
                        self.dispose_doubled_side_vector(id, s, other, s2);
                        break 'others;
                    }
                }
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::algebra::{Format, VectorKind, MATRIX_TYPE};

    fn positions() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    fn side_format() -> Format {
        let mut format = Format::nodal(0);
        format.vector_sizes[VectorKind::Side.index()] = 1;
        let mt = MATRIX_TYPE[VectorKind::Side.index()][VectorKind::Side.index()];
        format.matrix_sizes[mt] = 1;
        format
    }

    #[test]
    fn inserting_a_tetrahedron_creates_its_edges() {
        let mut mg = MultiGrid::new(Format::nodal(0));
        let nodes = positions().map(|p| mg.insert_inner_node(p));
        let elem = mg.insert_tetrahedron(nodes, [None, None, None, None]).unwrap();

        assert_eq!(mg.edges.len(), 6);
        for i in 0..CORNERS_OF_ELEM {
            for j in (i + 1)..CORNERS_OF_ELEM {
                let edge = mg.get_edge(nodes[i], nodes[j]).unwrap();
                assert_eq!(mg.edges[edge].no_of_elem, 1);
            }
        }
        assert_eq!(mg.elements[elem].nb, [None; 4]);
    }

    #[test]
    fn negative_parity_corners_are_rotated() {
        let mut mg = MultiGrid::new(Format::nodal(0));
        let p = positions();
        // swapping two corners flips the parity
        let nodes = [p[1], p[0], p[2], p[3]].map(|p| mg.insert_inner_node(p));
        let elem = mg.insert_tetrahedron(nodes, [None, None, None, None]).unwrap();

        let stored = mg.corner_positions(elem);
        assert!(crate::math::shapes::has_positive_parity(&stored));
    }

    #[test]
    fn shared_faces_are_wired_and_edges_counted() {
        let mut mg = MultiGrid::new(Format::nodal(0));
        let base = positions().map(|p| mg.insert_inner_node(p));
        let below = mg.insert_inner_node(Point3::new(0.4, 0.4, -1.0));

        let a = mg.insert_tetrahedron(base, [None, None, None, None]).unwrap();
        let b = mg
            .insert_tetrahedron([base[0], base[1], base[2], below], [None, None, None, None])
            .unwrap();

        assert!(mg.elements[a].nb.contains(&Some(b)));
        assert!(mg.elements[b].nb.contains(&Some(a)));

        // the three edges of the shared face are counted twice
        let shared = [
            mg.get_edge(base[0], base[1]).unwrap(),
            mg.get_edge(base[1], base[2]).unwrap(),
            mg.get_edge(base[0], base[2]).unwrap(),
        ];
        for edge in shared {
            assert_eq!(mg.edges[edge].no_of_elem, 2);
        }
        assert_eq!(mg.edges.len(), 9);
    }

    #[test]
    fn disposing_an_element_releases_its_edges() {
        let mut mg = MultiGrid::new(Format::nodal(0));
        let base = positions().map(|p| mg.insert_inner_node(p));
        let below = mg.insert_inner_node(Point3::new(0.4, 0.4, -1.0));
        let a = mg.insert_tetrahedron(base, [None, None, None, None]).unwrap();
        let b = mg
            .insert_tetrahedron([base[0], base[1], base[2], below], [None, None, None, None])
            .unwrap();

        mg.dispose_edges_from_element(b).unwrap();
        mg.dispose_element(b);

        assert_eq!(mg.edges.len(), 6);
        assert_eq!(mg.level_elements(0).to_vec(), vec![a]);
        assert!(mg.elements[a].nb.iter().all(Option::is_none));
    }

    #[test]
    fn shared_side_vectors_are_merged() {
        let mut mg = MultiGrid::new(side_format());
        let base = positions().map(|p| mg.insert_inner_node(p));
        let below = mg.insert_inner_node(Point3::new(0.4, 0.4, -1.0));
        let a = mg.insert_tetrahedron(base, [None, None, None, None]).unwrap();
        let b = mg
            .insert_tetrahedron([base[0], base[1], base[2], below], [None, None, None, None])
            .unwrap();

        // eight side vectors were created, the shared pair was merged
        let side_vectors = mg
            .vectors
            .iter()
            .filter(|(_, v)| v.kind == VectorKind::Side)
            .count();
        assert_eq!(side_vectors, 7);

        let sa = mg.elements[a].side_facing(b).unwrap();
        let sb = mg.elements[b].side_facing(a).unwrap();
        let shared = mg.elements[a].side_vectors[sa].unwrap();
        assert_eq!(mg.elements[b].side_vectors[sb], Some(shared));
        assert_eq!(mg.vectors[shared].count, 2);

        let ((e0, s0), other) = mg.get_element_info_from_side_vector(shared).unwrap();
        let (e1, s1) = other.unwrap();
        assert!(
            (e0, s0, e1, s1) == (a, sa, b, sb) || (e0, s0, e1, s1) == (b, sb, a, sa)
        );
    }

    #[test]
    fn empty_top_level_is_disposable() {
        let mut mg = MultiGrid::new(Format::nodal(0));
        assert!(mg.dispose_top_level().is_err());
        mg.create_new_level();
        assert_eq!(mg.top_level(), 1);
        mg.dispose_top_level().unwrap();
        assert_eq!(mg.top_level(), 0);
    }
}

impl std::fmt::Debug for MultiGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiGrid")
            .field("levels", &self.grids.len())
            .field("elements", &self.elements.len())
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("vectors", &self.vectors.len())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}
