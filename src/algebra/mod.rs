//! The algebraic overlay.
//!
//! Vectors hang off nodes, edges, element sides and elements; connections
//! are the symmetric links between vectors and own one matrix (diagonal)
//! or a pair of half-edge matrices. The format declares which vector types
//! exist, the payload sizes and the element-graph distance up to which
//! each type pair must be connected.

pub mod order;

use crate::error::AlgebraError;
use crate::math::Point3;
use crate::simplex::{CORNERS_OF_ELEM, SIDES_OF_ELEM};
use crate::topology::{EdgeId, ElementId, MultiGrid, NodeId};

slotmap::new_key_type! {
    /// Unique identifier for a vector of the algebraic overlay.
    pub struct VectorId;
}

slotmap::new_key_type! {
    /// Unique identifier for a connection of the algebraic overlay.
    pub struct ConnectionId;
}

/// Number of vector types.
pub const MAX_VECTORS: usize = 4;

/// Number of matrix types: one per unordered vector type pair.
pub const MAX_MATRICES: usize = MAX_VECTORS * (MAX_VECTORS + 1) / 2;

/// Vectors of class at least this are present on copied elements.
pub const MIN_VNCLASS: u8 = 2;

/// Symmetric matrix type of an unordered vector type pair, enumerated
/// along the anti-diagonals of the triangular pair matrix.
pub const MATRIX_TYPE: [[usize; MAX_VECTORS]; MAX_VECTORS] = {
    let mut table = [[0_usize; MAX_VECTORS]; MAX_VECTORS];
    let mut n = 0;
    let mut i = 0;
    while i < MAX_VECTORS {
        let mut j = 0;
        while j < MAX_VECTORS - i {
            table[j][j + i] = n;
            table[j + i][j] = n;
            n += 1;
            j += 1;
        }
        i += 1;
    }
    table
};

/// The type of mesh object a vector is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Node,
    Edge,
    Side,
    Elem,
}

impl VectorKind {
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Node => 0,
            Self::Edge => 1,
            Self::Side => 2,
            Self::Elem => 3,
        }
    }
}

/// Back-pointer from a vector to its mesh object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorObject {
    Node(NodeId),
    Edge(EdgeId),
    Side(ElementId, u8),
    Elem(ElementId),
}

impl VectorObject {
    #[must_use]
    pub fn kind(self) -> VectorKind {
        match self {
            Self::Node(_) => VectorKind::Node,
            Self::Edge(_) => VectorKind::Edge,
            Self::Side(..) => VectorKind::Side,
            Self::Elem(_) => VectorKind::Elem,
        }
    }
}

/// Declaration of the algebraic layout carried by a multigrid.
#[derive(Debug, Clone)]
pub struct Format {
    /// Payload length per vector type; zero disables the type.
    pub vector_sizes: [usize; MAX_VECTORS],
    /// Payload length per matrix type; zero disables the pair.
    pub matrix_sizes: [usize; MAX_MATRICES],
    /// Element-graph distance up to which each pair must be connected.
    pub connection_depth: [usize; MAX_MATRICES],
    /// Tolerance for boundary parameter matching of mid vertices.
    pub max_par_dist: f64,
}

impl Format {
    /// A nodal format: one value per node, node-node connections up to the
    /// given element-graph depth.
    #[must_use]
    pub fn nodal(depth: usize) -> Self {
        let mut format = Self {
            vector_sizes: [0; MAX_VECTORS],
            matrix_sizes: [0; MAX_MATRICES],
            connection_depth: [0; MAX_MATRICES],
            max_par_dist: 1e-4,
        };
        format.vector_sizes[VectorKind::Node.index()] = 1;
        let mt = MATRIX_TYPE[VectorKind::Node.index()][VectorKind::Node.index()];
        format.matrix_sizes[mt] = 1;
        format.connection_depth[mt] = depth;
        format
    }

    #[must_use]
    pub fn vector_len(&self, kind: VectorKind) -> usize {
        self.vector_sizes[kind.index()]
    }

    #[must_use]
    pub fn matrix_len(&self, a: VectorKind, b: VectorKind) -> usize {
        self.matrix_sizes[MATRIX_TYPE[a.index()][b.index()]]
    }

    #[must_use]
    pub fn depth(&self, a: VectorKind, b: VectorKind) -> usize {
        self.connection_depth[MATRIX_TYPE[a.index()][b.index()]]
    }

    /// The largest connection depth of any active pair.
    #[must_use]
    pub fn max_connection_depth(&self) -> usize {
        self.connection_depth
            .iter()
            .zip(self.matrix_sizes.iter())
            .filter(|&(_, &size)| size > 0)
            .map(|(&d, _)| d)
            .max()
            .unwrap_or(0)
    }
}

/// Orientation flags of one half-edge matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixDir {
    pub up: bool,
    pub down: bool,
}

/// A vector of the algebraic overlay.
#[derive(Debug, Clone)]
pub struct VectorData {
    pub kind: VectorKind,
    pub object: VectorObject,
    pub level: usize,
    /// Activity class, 0..=3.
    pub class: u8,
    /// Class on the next level, seeded before refinement.
    pub next_class: u8,
    /// Allocated in the current modification cycle.
    pub new_vector: bool,
    /// A connection of this vector changed in the current cycle.
    pub new_connection: bool,
    /// Connections of this vector must be rebuilt.
    pub build_con: bool,
    pub skip: u32,
    /// Position in the level's vector ordering.
    pub index: usize,
    /// Number of element sides sharing this vector.
    pub count: u8,
    pub values: Vec<f64>,
    /// Connection list; the diagonal connection is kept at the head.
    pub connections: Vec<ConnectionId>,
    pub(crate) up: usize,
    pub(crate) down: usize,
    pub(crate) cut_used: bool,
}

/// A connection: one or two half-edge matrices between two vectors.
#[derive(Debug, Clone)]
pub struct ConnectionData {
    /// Endpoints; equal ids denote the diagonal self-loop.
    pub ends: [VectorId; 2],
    /// Fill-in connection not required by the stencil.
    pub extra: bool,
    /// Allocated in the current modification cycle.
    pub new_matrix: bool,
    /// Orientation flags per half: 0 = `ends[0]` to `ends[1]`, 1 = reverse.
    pub dirs: [MatrixDir; 2],
    /// Matrix payloads per half; the second stays empty on the diagonal.
    pub values: [Vec<f64>; 2],
}

impl ConnectionData {
    #[must_use]
    pub fn is_diagonal(&self) -> bool {
        self.ends[0] == self.ends[1]
    }

    /// The endpoint other than `v`, and the index of the half rooted at `v`.
    #[must_use]
    pub fn half_from(&self, v: VectorId) -> (VectorId, usize) {
        if self.ends[0] == v {
            (self.ends[1], 0)
        } else {
            (self.ends[0], 1)
        }
    }
}

impl MultiGrid {
    // --- Vector management ---

    /// Allocates a vector for the given object, or `None` when the format
    /// declares the type unused.
    pub(crate) fn create_vector(
        &mut self,
        level: usize,
        object: VectorObject,
    ) -> Option<VectorId> {
        let kind = object.kind();
        let size = self.format().vector_len(kind);
        if size == 0 {
            return None;
        }
        let index = self.grids[level].vectors.len();
        let id = self.vectors.insert(VectorData {
            kind,
            object,
            level,
            class: 3,
            next_class: 0,
            new_vector: true,
            new_connection: true,
            build_con: true,
            skip: 0,
            index,
            count: 0,
            values: vec![0.0; size],
            connections: Vec::new(),
            up: 0,
            down: 0,
            cut_used: false,
        });
        self.grids[level].vectors.push(id);
        Some(id)
    }

    /// Disposes a vector after removing its remaining connections.
    pub(crate) fn dispose_vector(&mut self, id: VectorId) {
        self.dispose_connections_from_vector(id);
        let level = self.vectors[id].level;
        self.grids[level].vectors.retain(|&v| v != id);
        self.vectors.remove(id);
    }

    /// World position of a vector, derived from its object.
    #[must_use]
    pub fn vector_position(&self, id: VectorId) -> Point3 {
        match self.vectors[id].object {
            VectorObject::Node(n) => self.vertices[self.nodes[n].vertex].pos,
            VectorObject::Edge(e) => {
                let [n0, n1] = self.edges[e].nodes;
                nalgebra::center(
                    &self.vertices[self.nodes[n0].vertex].pos,
                    &self.vertices[self.nodes[n1].vertex].pos,
                )
            }
            VectorObject::Side(elem, side) => {
                let corners = self.elements[elem].corners;
                let mut sum = nalgebra::Vector3::zeros();
                for c in crate::simplex::CORNER_OF_SIDE[usize::from(side)] {
                    sum += self.vertices[self.nodes[corners[c]].vertex].pos.coords;
                }
                Point3::from(sum / 3.0)
            }
            VectorObject::Elem(elem) => {
                let corners = self.elements[elem].corners;
                let mut sum = nalgebra::Vector3::zeros();
                for c in corners {
                    sum += self.vertices[self.nodes[c].vertex].pos.coords;
                }
                Point3::from(sum / 4.0)
            }
        }
    }

    // --- Connection management ---

    /// The existing connection between two vectors, if any.
    #[must_use]
    pub fn get_connection(&self, from: VectorId, to: VectorId) -> Option<ConnectionId> {
        self.vectors[from]
            .connections
            .iter()
            .copied()
            .find(|&c| {
                let ends = self.connections[c].ends;
                (ends[0] == from && ends[1] == to) || (ends[0] == to && ends[1] == from)
            })
    }

    /// Creates the connection between two vectors, or returns the existing
    /// one. The diagonal goes to the head of the list, a non-diagonal pair
    /// to the second position of both endpoint lists.
    ///
    /// # Errors
    ///
    /// Returns an error when the format declares the pair unused.
    pub(crate) fn create_connection(
        &mut self,
        from: VectorId,
        to: VectorId,
    ) -> Result<ConnectionId, AlgebraError> {
        let root_kind = self.vectors[from].kind;
        let dest_kind = self.vectors[to].kind;
        let size = self.format().matrix_len(root_kind, dest_kind);
        if size == 0 {
            return Err(AlgebraError::UnusedMatrixType(
                root_kind.index(),
                dest_kind.index(),
            ));
        }

        if let Some(existing) = self.get_connection(from, to) {
            return Ok(existing);
        }

        let diagonal = from == to;
        let id = self.connections.insert(ConnectionData {
            ends: [from, to],
            extra: false,
            new_matrix: true,
            dirs: [MatrixDir::default(); 2],
            values: if diagonal {
                [vec![0.0; size], Vec::new()]
            } else {
                [vec![0.0; size], vec![0.0; size]]
            },
        });

        if diagonal {
            self.vectors[from].connections.insert(0, id);
        } else {
            let pos = self.vectors[from].connections.len().min(1);
            self.vectors[from].connections.insert(pos, id);
            let pos = self.vectors[to].connections.len().min(1);
            self.vectors[to].connections.insert(pos, id);
            self.vectors[from].new_connection = true;
        }
        self.vectors[to].new_connection = true;

        Ok(id)
    }

    /// Creates a fill-in connection, marked extra.
    ///
    /// # Errors
    ///
    /// Returns an error when the format declares the pair unused.
    pub fn create_extra_connection(
        &mut self,
        from: VectorId,
        to: VectorId,
    ) -> Result<ConnectionId, AlgebraError> {
        let id = self.create_connection(from, to)?;
        self.connections[id].extra = true;
        Ok(id)
    }

    /// Removes a connection from both endpoint lists.
    pub(crate) fn dispose_connection(&mut self, id: ConnectionId) {
        let ends = self.connections[id].ends;
        self.vectors[ends[0]].connections.retain(|&c| c != id);
        if ends[1] != ends[0] {
            self.vectors[ends[1]].connections.retain(|&c| c != id);
        }
        self.connections.remove(id);
    }

    /// Removes every connection of the vector.
    pub(crate) fn dispose_connections_from_vector(&mut self, id: VectorId) {
        while let Some(&connection) = self.vectors[id].connections.first() {
            self.dispose_connection(connection);
        }
    }

    /// Removes every extra connection on a level.
    pub fn dispose_extra_connections(&mut self, level: usize) {
        let vector_list = self.grids[level].vectors.clone();
        for vector in vector_list {
            let extras: Vec<ConnectionId> = self.vectors[vector]
                .connections
                .iter()
                .copied()
                .filter(|&c| self.connections[c].extra)
                .collect();
            for connection in extras {
                self.dispose_connection(connection);
            }
        }
    }

    /// Merges the side vectors of two elements sharing a side. One of the
    /// two must still have an empty connection list.
    pub(crate) fn dispose_doubled_side_vector(
        &mut self,
        elem0: ElementId,
        side0: usize,
        elem1: ElementId,
        side1: usize,
    ) {
        let (Some(v0), Some(v1)) = (
            self.elements[elem0].side_vectors[side0],
            self.elements[elem1].side_vectors[side1],
        ) else {
            return;
        };
        if v0 == v1 {
            return;
        }
        debug_assert!(self.vectors[v0].count == 1 && self.vectors[v1].count == 1);
        debug_assert!(
            self.vectors[v0].connections.is_empty() || self.vectors[v1].connections.is_empty()
        );
        if self.vectors[v0].connections.is_empty() {
            self.elements[elem0].side_vectors[side0] = Some(v1);
            self.vectors[v1].count = 2;
            self.dispose_vector(v0);
        } else {
            self.elements[elem1].side_vectors[side1] = Some(v0);
            self.vectors[v0].count = 2;
            self.dispose_vector(v1);
        }
    }

    /// The elements and side indices sharing a side vector; the second
    /// entry is `None` on the domain boundary.
    #[must_use]
    pub fn get_element_info_from_side_vector(
        &self,
        id: VectorId,
    ) -> Option<((ElementId, usize), Option<(ElementId, usize)>)> {
        let VectorObject::Side(elem, side) = self.vectors[id].object else {
            return None;
        };
        let side = usize::from(side);
        let other = self.elements[elem].nb[side].and_then(|nb| {
            self.elements[nb]
                .side_facing(elem)
                .map(|nb_side| (nb, nb_side))
        });
        Some(((elem, side), other))
    }

    // --- Vector gathering ---

    /// The element vector, if the format carries element data.
    #[must_use]
    pub fn get_vectors_of_element(&self, elem: ElementId) -> Vec<VectorId> {
        self.elements[elem].vector.into_iter().collect()
    }

    /// The side vectors of the element.
    #[must_use]
    pub fn get_vectors_of_sides(&self, elem: ElementId) -> Vec<VectorId> {
        self.elements[elem]
            .side_vectors
            .iter()
            .filter_map(|&v| v)
            .collect()
    }

    /// The edge vectors of the element.
    #[must_use]
    pub fn get_vectors_of_edges(&self, elem: ElementId) -> Vec<VectorId> {
        let corners = self.elements[elem].corners;
        let mut list = Vec::with_capacity(6);
        for i in 0..CORNERS_OF_ELEM {
            for j in (i + 1)..CORNERS_OF_ELEM {
                if let Some(edge) = self.get_edge(corners[i], corners[j]) {
                    if let Some(v) = self.edges[edge].vector {
                        list.push(v);
                    }
                }
            }
        }
        list
    }

    /// The node vectors of the element corners.
    #[must_use]
    pub fn get_vectors_of_nodes(&self, elem: ElementId) -> Vec<VectorId> {
        self.elements[elem]
            .corners
            .iter()
            .filter_map(|&n| self.nodes[n].vector)
            .collect()
    }

    fn all_vectors_of(&self, elem: ElementId) -> Vec<VectorId> {
        let mut list = self.get_vectors_of_element(elem);
        list.extend(self.get_vectors_of_sides(elem));
        list.extend(self.get_vectors_of_edges(elem));
        list.extend(self.get_vectors_of_nodes(elem));
        list
    }

    // --- Connection construction and disposal by neighborhood ---

    /// Removes all connections from all vectors of the element and flags
    /// them for rebuilding.
    pub(crate) fn dispose_connections_from_element(&mut self, elem: ElementId) {
        for vector in self.all_vectors_of(elem) {
            self.dispose_connections_from_vector(vector);
            self.vectors[vector].build_con = true;
        }
    }

    fn dispose_connections_in_neighborhood_rec(&mut self, elem: ElementId, depth: usize) {
        if !self.elements[elem].build_con {
            self.dispose_connections_from_element(elem);
        }
        self.elements[elem].build_con = true;

        if depth > 0 {
            for side in 0..SIDES_OF_ELEM {
                if let Some(nb) = self.elements[elem].nb[side] {
                    self.dispose_connections_in_neighborhood_rec(nb, depth - 1);
                }
            }
        }
    }

    /// Disposes connections around an element up to half the maximal
    /// connection depth, flagging the visited elements for rebuild.
    pub(crate) fn dispose_connections_in_neighborhood(&mut self, elem: ElementId) {
        let depth = self.format().max_connection_depth() / 2;
        self.dispose_connections_in_neighborhood_rec(elem, depth);
    }

    /// Creates the connections between the vectors of two elements at the
    /// given distance in the element graph.
    fn element_element_create_connection(
        &mut self,
        elem0: ElementId,
        elem1: ElementId,
        act_depth: usize,
    ) -> Result<(), AlgebraError> {
        const KINDS: [VectorKind; MAX_VECTORS] = [
            VectorKind::Node,
            VectorKind::Edge,
            VectorKind::Side,
            VectorKind::Elem,
        ];

        let lists0 = [
            self.get_vectors_of_nodes(elem0),
            self.get_vectors_of_edges(elem0),
            self.get_vectors_of_sides(elem0),
            self.get_vectors_of_element(elem0),
        ];
        let lists1 = [
            self.get_vectors_of_nodes(elem1),
            self.get_vectors_of_edges(elem1),
            self.get_vectors_of_sides(elem1),
            self.get_vectors_of_element(elem1),
        ];

        for (a, &kind_a) in KINDS.iter().enumerate() {
            for (b, &kind_b) in KINDS.iter().enumerate().skip(a) {
                if self.format().matrix_len(kind_a, kind_b) == 0 {
                    continue;
                }
                if act_depth > self.format().depth(kind_a, kind_b) {
                    continue;
                }
                for &va in &lists0[a] {
                    for &vb in &lists1[b] {
                        self.create_connection(va, vb)?;
                    }
                }
                if a != b {
                    for &va in &lists0[b] {
                        for &vb in &lists1[a] {
                            self.create_connection(va, vb)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn connect_with_neighborhood(
        &mut self,
        elem: ElementId,
        center: ElementId,
        act_depth: usize,
        max_depth: usize,
    ) -> Result<(), AlgebraError> {
        self.element_element_create_connection(center, elem, act_depth)?;

        if act_depth < max_depth {
            for side in 0..SIDES_OF_ELEM {
                if let Some(nb) = self.elements[elem].nb[side] {
                    self.connect_with_neighborhood(nb, center, act_depth + 1, max_depth)?;
                }
            }
        }
        Ok(())
    }

    /// Creates all connections of an element's vectors up to the depths
    /// declared by the format.
    ///
    /// # Errors
    ///
    /// Returns an error when a required pair is unusable.
    pub fn create_connections_in_neighborhood(
        &mut self,
        elem: ElementId,
    ) -> Result<(), AlgebraError> {
        let max_depth = self.format().max_connection_depth();
        self.connect_with_neighborhood(elem, elem, 0, max_depth)
    }

    /// Rebuilds connections for every element of the level whose rebuild
    /// flag is set, or which touches a vector with a set rebuild flag.
    ///
    /// # Errors
    ///
    /// Returns an error when a required pair is unusable.
    pub fn grid_create_connection(&mut self, level: usize) -> Result<(), AlgebraError> {
        let element_list = self.grids[level].elements.clone();

        for &elem in &element_list {
            if self.elements[elem].build_con {
                continue;
            }
            let touched = self
                .all_vectors_of(elem)
                .iter()
                .any(|&v| self.vectors[v].build_con);
            if touched {
                self.elements[elem].build_con = true;
            }
        }

        for &elem in &element_list {
            if self.elements[elem].build_con {
                self.create_connections_in_neighborhood(elem)?;
            }
        }
        Ok(())
    }

    /// Creates all connections on every level.
    ///
    /// # Errors
    ///
    /// Returns an error when a required pair is unusable.
    pub fn create_all_connections(&mut self) -> Result<(), AlgebraError> {
        for level in 0..self.grids.len() {
            let element_list = self.grids[level].elements.clone();
            for &elem in &element_list {
                self.elements[elem].build_con = true;
            }
            self.grid_create_connection(level)?;
        }
        Ok(())
    }

    /// Resets the modification-cycle flags on elements, vectors and
    /// matrices of every level.
    pub fn prepare_algebra_modification(&mut self) {
        for level in 0..self.grids.len() {
            let element_list = self.grids[level].elements.clone();
            for elem in element_list {
                self.elements[elem].used = false;
                self.elements[elem].build_con = false;
            }
            let vector_list = self.grids[level].vectors.clone();
            for vector in &vector_list {
                self.vectors[*vector].build_con = false;
            }
            for vector in vector_list {
                self.vectors[vector].new_vector = false;
                self.vectors[vector].new_connection = false;
                let connection_list = self.vectors[vector].connections.clone();
                for connection in connection_list {
                    self.connections[connection].new_matrix = false;
                }
            }
        }
    }

    // --- Vector classes ---

    /// Resets the class of every vector on the level to 0.
    pub fn clear_vector_classes(&mut self, level: usize) {
        let vector_list = self.grids[level].vectors.clone();
        for vector in vector_list {
            self.vectors[vector].class = 0;
        }
    }

    /// Sets the class of every vector of the element to 3.
    pub fn seed_vector_classes(&mut self, elem: ElementId) {
        for vector in self.all_vectors_of(elem) {
            self.vectors[vector].class = 3;
        }
    }

    /// Relaxes classes over the matrix graph: neighbors of class-3 vectors
    /// become at least 2, neighbors of class-2 vectors at least 1.
    pub fn propagate_vector_classes(&mut self, level: usize) {
        let vector_list = self.grids[level].vectors.clone();
        for &vector in &vector_list {
            if self.vectors[vector].class == 3 {
                for connection in self.vectors[vector].connections.clone() {
                    let (dest, _) = self.connections[connection].half_from(vector);
                    if dest != vector && self.vectors[dest].class < 3 {
                        self.vectors[dest].class = 2;
                    }
                }
            }
        }
        for &vector in &vector_list {
            if self.vectors[vector].class == 2 {
                for connection in self.vectors[vector].connections.clone() {
                    let (dest, _) = self.connections[connection].half_from(vector);
                    if dest != vector && self.vectors[dest].class < 2 {
                        self.vectors[dest].class = 1;
                    }
                }
            }
        }
    }

    /// Resets the next-level class of every vector on the level to 0.
    pub fn clear_next_vector_classes(&mut self, level: usize) {
        let vector_list = self.grids[level].vectors.clone();
        for vector in vector_list {
            self.vectors[vector].next_class = 0;
        }
    }

    /// Sets the next-level class of every vector of the element to 3.
    pub fn seed_next_vector_classes(&mut self, elem: ElementId) {
        for vector in self.all_vectors_of(elem) {
            self.vectors[vector].next_class = 3;
        }
    }

    /// Relaxes next-level classes over the matrix graph.
    pub fn propagate_next_vector_classes(&mut self, level: usize) {
        let vector_list = self.grids[level].vectors.clone();
        for &vector in &vector_list {
            if self.vectors[vector].next_class == 3 {
                for connection in self.vectors[vector].connections.clone() {
                    let (dest, _) = self.connections[connection].half_from(vector);
                    if dest != vector && self.vectors[dest].next_class < 3 {
                        self.vectors[dest].next_class = 2;
                    }
                }
            }
        }
        for &vector in &vector_list {
            if self.vectors[vector].next_class == 2 {
                for connection in self.vectors[vector].connections.clone() {
                    let (dest, _) = self.connections[connection].half_from(vector);
                    if dest != vector && self.vectors[dest].next_class < 2 {
                        self.vectors[dest].next_class = 1;
                    }
                }
            }
        }
    }

    /// The highest next-level class among the element's vectors.
    #[must_use]
    pub fn max_next_vector_class(&self, elem: ElementId) -> u8 {
        self.all_vectors_of(elem)
            .iter()
            .map(|&v| self.vectors[v].next_class)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_type_is_symmetric_and_complete() {
        let mut seen = [false; MAX_MATRICES];
        for i in 0..MAX_VECTORS {
            for j in 0..MAX_VECTORS {
                let mt = MATRIX_TYPE[i][j];
                assert_eq!(mt, MATRIX_TYPE[j][i]);
                assert!(mt < MAX_MATRICES);
                seen[mt] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn diagonal_types_enumerate_first() {
        for i in 0..MAX_VECTORS {
            assert_eq!(MATRIX_TYPE[i][i], i);
        }
    }

    #[test]
    fn nodal_format_depths() {
        let format = Format::nodal(1);
        assert_eq!(format.vector_len(VectorKind::Node), 1);
        assert_eq!(format.vector_len(VectorKind::Elem), 0);
        assert_eq!(format.depth(VectorKind::Node, VectorKind::Node), 1);
        assert_eq!(format.max_connection_depth(), 1);
    }

    #[allow(clippy::unwrap_used)]
    mod on_grid {
        use super::super::*;
        use crate::math::Point3;

        fn two_tet_grid() -> (MultiGrid, ElementId, ElementId) {
            let mut mg = MultiGrid::new(Format::nodal(0));
            let base = [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ]
            .map(|p| mg.insert_inner_node(p));
            let below = mg.insert_inner_node(Point3::new(0.4, 0.4, -1.0));
            let a = mg.insert_tetrahedron(base, [None, None, None, None]).unwrap();
            let b = mg
                .insert_tetrahedron([base[0], base[1], base[2], below], [None, None, None, None])
                .unwrap();
            mg.create_all_connections().unwrap();
            (mg, a, b)
        }

        #[test]
        fn connections_exist_exactly_within_the_declared_depth() {
            let (mg, a, b) = two_tet_grid();
            // depth 0: vectors connect iff they share an element
            let va = mg.get_vectors_of_nodes(a);
            let vb = mg.get_vectors_of_nodes(b);
            for &x in &va {
                for &y in &va {
                    assert!(mg.get_connection(x, y).is_some());
                }
            }
            let own_a: Vec<_> = va.iter().filter(|&&v| !vb.contains(&v)).collect();
            let own_b: Vec<_> = vb.iter().filter(|&&v| !va.contains(&v)).collect();
            assert_eq!(own_a.len(), 1);
            assert_eq!(own_b.len(), 1);
            assert!(mg.get_connection(*own_a[0], *own_b[0]).is_none());
        }

        #[test]
        fn connection_creation_is_idempotent() {
            let (mut mg, a, _) = two_tet_grid();
            let before = mg.connections.len();
            let v = mg.get_vectors_of_nodes(a);
            let existing = mg.get_connection(v[0], v[1]).unwrap();
            let again = mg.create_connection(v[0], v[1]).unwrap();
            assert_eq!(existing, again);
            assert_eq!(mg.connections.len(), before);
        }

        #[test]
        fn extra_connections_can_be_disposed_in_bulk() {
            let (mut mg, a, b) = two_tet_grid();
            let va = mg.get_vectors_of_nodes(a);
            let vb = mg.get_vectors_of_nodes(b);
            let own_a = *va.iter().find(|&&v| !vb.contains(&v)).unwrap();
            let own_b = *vb.iter().find(|&&v| !va.contains(&v)).unwrap();

            let before = mg.connections.len();
            mg.create_extra_connection(own_a, own_b).unwrap();
            assert_eq!(mg.connections.len(), before + 1);

            mg.dispose_extra_connections(0);
            assert_eq!(mg.connections.len(), before);
            assert!(mg.get_connection(own_a, own_b).is_none());
        }

        #[test]
        fn diagonal_connection_heads_every_list() {
            let (mg, a, _) = two_tet_grid();
            for v in mg.get_vectors_of_nodes(a) {
                let first = mg.vectors[v].connections[0];
                assert!(mg.connections[first].is_diagonal());
            }
        }

        #[test]
        fn classes_relax_one_hop_per_step() {
            let (mut mg, a, b) = two_tet_grid();
            mg.clear_vector_classes(0);
            mg.seed_vector_classes(a);
            mg.propagate_vector_classes(0);

            let va = mg.get_vectors_of_nodes(a);
            let vb = mg.get_vectors_of_nodes(b);
            for &v in &va {
                assert_eq!(mg.vectors[v].class, 3);
            }
            let own_b = *vb.iter().find(|&&v| !va.contains(&v)).unwrap();
            assert_eq!(mg.vectors[own_b].class, 2);
        }
    }
}
