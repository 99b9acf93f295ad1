use crate::math::{Point3, Vector2, Vector3};
use crate::topology::ElementId;

slotmap::new_key_type! {
    /// Unique identifier for a vertex in the multigrid.
    pub struct VertexId;
}

/// A parametrized piece of the domain boundary.
///
/// Implementations map local segment coordinates to world space; the
/// refinement core projects midpoints of bisected boundary edges through
/// this seam.
pub trait BoundarySegment {
    /// World position for the local parameters `lambda`.
    fn position(&self, lambda: Vector2) -> Point3;
}

/// A planar boundary segment spanned by two direction vectors.
#[derive(Debug, Clone)]
pub struct PlanarSegment {
    origin: Point3,
    u: Vector3,
    v: Vector3,
}

impl PlanarSegment {
    #[must_use]
    pub fn new(origin: Point3, u: Vector3, v: Vector3) -> Self {
        Self { origin, u, v }
    }
}

impl BoundarySegment for PlanarSegment {
    fn position(&self, lambda: Vector2) -> Point3 {
        self.origin + self.u * lambda.x + self.v * lambda.y
    }
}

/// Membership of a vertex in one boundary segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexSegment {
    /// Index of the segment in the multigrid's segment list.
    pub segment: usize,
    /// Local coordinates of the vertex on that segment.
    pub lambda: Vector2,
}

/// Data associated with a vertex.
#[derive(Debug, Clone)]
pub struct VertexData {
    /// World position.
    pub pos: Point3,
    /// Local coordinates within the father element.
    pub local: Vector3,
    /// The element this vertex was created in, for inner and mid vertices.
    pub father: Option<ElementId>,
    /// The father edge this vertex is the midpoint of.
    pub on_edge: Option<usize>,
    /// Set when a boundary projection moved the vertex off the midpoint.
    pub moved: bool,
    /// Boundary segment memberships; empty for inner vertices.
    pub segments: Vec<VertexSegment>,
}

impl VertexData {
    /// Creates an inner vertex.
    #[must_use]
    pub fn inner(pos: Point3, local: Vector3) -> Self {
        Self {
            pos,
            local,
            father: None,
            on_edge: None,
            moved: false,
            segments: Vec::new(),
        }
    }

    /// Creates a boundary vertex with its segment memberships.
    #[must_use]
    pub fn boundary(pos: Point3, segments: Vec<VertexSegment>) -> Self {
        Self {
            pos,
            local: Vector3::zeros(),
            father: None,
            on_edge: None,
            moved: false,
            segments,
        }
    }

    #[must_use]
    pub fn is_boundary(&self) -> bool {
        !self.segments.is_empty()
    }

    /// The membership entry for a given segment, if any.
    #[must_use]
    pub fn segment(&self, segment: usize) -> Option<&VertexSegment> {
        self.segments.iter().find(|vs| vs.segment == segment)
    }
}
