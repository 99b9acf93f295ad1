use crate::algebra::VectorId;
use crate::math::Vector2;
use crate::rules::{RuleId, NO_REF_RULE};
use crate::topology::NodeId;

slotmap::new_key_type! {
    /// Unique identifier for an element in the multigrid.
    pub struct ElementId;
}

slotmap::new_key_type! {
    /// Unique identifier for a boundary side record.
    pub struct SideId;
}

/// Class of an element with respect to the refinement hierarchy.
///
/// Yellow elements are copies, green elements close the grid conformingly,
/// red elements carry regular refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ElementClass {
    Yellow,
    Green,
    #[default]
    Red,
}

/// Boundary parametrization of one element side.
#[derive(Debug, Clone)]
pub struct ElementSideData {
    /// Index of the boundary segment in the multigrid's segment list.
    pub segment: usize,
    /// Boundary parameters of the side's three corners.
    pub params: [Vector2; 3],
}

/// Data associated with a tetrahedral element.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub corners: [NodeId; 4],
    pub nb: [Option<ElementId>; 4],
    /// Boundary side records, present on boundary faces only.
    pub sides: [Option<SideId>; 4],
    pub father: Option<ElementId>,
    /// Son 0; the remaining sons are reached along the rule's paths.
    pub son: Option<ElementId>,
    pub nsons: usize,
    /// Class this element was created with.
    pub class: ElementClass,
    /// The rule that produced the current sons.
    pub refine: RuleId,
    pub refine_class: ElementClass,
    /// The rule intended for the next refinement cycle.
    pub mark: RuleId,
    pub mark_class: ElementClass,
    pub coarsen: bool,
    /// Closure scratch flag.
    pub used: bool,
    /// Connections in this element's neighborhood must be rebuilt.
    pub build_con: bool,
    pub edge_pattern: u8,
    pub side_pattern: u8,
    /// Created as a boundary element (may carry side records).
    pub boundary: bool,
    pub level: usize,
    pub vector: Option<VectorId>,
    pub side_vectors: [Option<VectorId>; 4],
}

impl ElementData {
    #[must_use]
    pub fn new(corners: [NodeId; 4], level: usize, boundary: bool) -> Self {
        Self {
            corners,
            nb: [None; 4],
            sides: [None; 4],
            father: None,
            son: None,
            nsons: 0,
            class: ElementClass::Red,
            refine: NO_REF_RULE,
            refine_class: ElementClass::Yellow,
            mark: NO_REF_RULE,
            mark_class: ElementClass::Yellow,
            coarsen: false,
            used: false,
            build_con: true,
            edge_pattern: 0,
            side_pattern: 0,
            boundary,
            level,
            vector: None,
            side_vectors: [None; 4],
        }
    }

    /// Index of the side facing the given neighbor.
    #[must_use]
    pub fn side_facing(&self, neighbor: ElementId) -> Option<usize> {
        self.nb.iter().position(|&n| n == Some(neighbor))
    }
}
