//! Adaptive conforming refinement of tetrahedral multigrids.
//!
//! The [`Refiner`] binds a rule table and a best-full-refrule policy;
//! marks are set per element through [`Refiner::mark_for_refinement`] and
//! consumed by [`Refiner::refine_multigrid`], which closes every level,
//! restricts marks downward and rebuilds the son levels in place.

mod closure;
mod context;
mod executor;
pub mod policy;

pub use policy::{FullRulePolicy, FullRuleVariant};

use crate::error::{RefineError, TopologyError};
use crate::rules::{RuleId, RuleTable, COPY_REF_RULE, NO_REF_RULE};
use crate::topology::{ElementClass, ElementId, MultiGrid};

/// User-facing refinement marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkRule {
    /// Regular (full) refinement.
    Red,
    /// Copy the element to the next level.
    Copy,
    /// Remove any mark.
    NoRefinement,
    /// Request coarsening of the element.
    Unrefine,
}

/// Copy policy of the refinement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineFlag {
    /// Copy only where the vector classes demand it.
    TrulyLocal,
    /// Copy the whole level once anything refines.
    CopyAll,
}

/// The refinement engine: a rule table plus the policy configuration.
pub struct Refiner<'a> {
    rules: &'a RuleTable,
    policy: FullRulePolicy,
}

impl<'a> Refiner<'a> {
    /// Creates a refiner with the default best-full-refrule policy.
    #[must_use]
    pub fn new(rules: &'a RuleTable) -> Self {
        Self {
            rules,
            policy: FullRulePolicy::default(),
        }
    }

    /// Creates a refiner with an explicit policy.
    #[must_use]
    pub fn with_policy(rules: &'a RuleTable, policy: FullRulePolicy) -> Self {
        Self { rules, policy }
    }

    /// Creates a refiner with the policy registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown policy names.
    pub fn with_policy_name(rules: &'a RuleTable, name: &str) -> Result<Self, RefineError> {
        Ok(Self {
            rules,
            policy: FullRulePolicy::by_name(name)?,
        })
    }

    #[must_use]
    pub fn rules(&self) -> &'a RuleTable {
        self.rules
    }

    #[must_use]
    pub fn policy(&self) -> FullRulePolicy {
        self.policy
    }

    /// False for regularly refined elements; their marks are managed by
    /// the closure alone.
    #[must_use]
    pub fn is_allowed_to_refine(&self, mg: &MultiGrid, elem: ElementId) -> bool {
        mg.elements[elem].refine_class != ElementClass::Red
    }

    /// True when the element is a leaf the estimator may tag.
    #[must_use]
    pub fn estimate_here(&self, mg: &MultiGrid, elem: ElementId) -> bool {
        mg.elements[elem].refine == NO_REF_RULE
    }

    /// Marks an element for the next refinement cycle.
    ///
    /// # Errors
    ///
    /// Returns an error on regularly refined elements; the state is left
    /// unchanged.
    pub fn mark_for_refinement(
        &self,
        mg: &mut MultiGrid,
        elem: ElementId,
        rule: MarkRule,
    ) -> Result<(), RefineError> {
        if mg.elements[elem].refine_class == ElementClass::Red {
            return Err(TopologyError::MarkRefused.into());
        }

        mg.elements[elem].coarsen = false;
        match rule {
            MarkRule::Red => {
                mg.elements[elem].mark = self.rules.full_rule();
                mg.elements[elem].mark_class = ElementClass::Red;
            }
            MarkRule::Copy => {
                mg.elements[elem].mark = COPY_REF_RULE;
                mg.elements[elem].mark_class = ElementClass::Red;
            }
            MarkRule::NoRefinement => {
                mg.elements[elem].mark = NO_REF_RULE;
            }
            MarkRule::Unrefine => {
                mg.elements[elem].mark = NO_REF_RULE;
                mg.elements[elem].coarsen = true;
            }
        }
        Ok(())
    }

    /// Marks an element with a specific rule, as estimators with partial
    /// edge information do.
    pub fn mark_with_rule(&self, mg: &mut MultiGrid, elem: ElementId, rule: RuleId) {
        mg.elements[elem].mark = rule;
        mg.elements[elem].mark_class = ElementClass::Red;
        mg.elements[elem].coarsen = false;
    }

    /// Decodes the current mark of an element. The side component is
    /// always zero for tetrahedra.
    #[must_use]
    pub fn get_refinement_mark(&self, mg: &MultiGrid, elem: ElementId) -> (MarkRule, usize) {
        let mark = mg.elements[elem].mark;
        if mark == self.rules.full_rule() {
            return (MarkRule::Red, 0);
        }
        let rule = match mark {
            NO_REF_RULE => {
                if mg.elements[elem].coarsen {
                    MarkRule::Unrefine
                } else {
                    MarkRule::NoRefinement
                }
            }
            COPY_REF_RULE => MarkRule::Copy,
            _ => MarkRule::NoRefinement,
        };
        (rule, 0)
    }

    /// Pre-flight memory check for the pending refinement.
    #[must_use]
    pub fn check_memory_requirements(&self, _mg: &MultiGrid) -> bool {
        true
    }
}

/// Collects the sons of an element: son 0 directly, the others along the
/// neighbor paths of the refinement rule.
///
/// # Errors
///
/// Returns an error when a path leaves the son family.
pub fn get_sons(
    mg: &MultiGrid,
    rules: &RuleTable,
    elem: ElementId,
) -> Result<Vec<ElementId>, RefineError> {
    let rule = rules.rule(mg.elements[elem].refine);
    let mut sons = Vec::with_capacity(rule.nsons);
    if rule.nsons == 0 {
        return Ok(sons);
    }

    let son0 = mg.elements[elem]
        .son
        .ok_or(TopologyError::InvalidTopology("refined element without son"))?;
    sons.push(son0);

    for s in 1..rule.nsons {
        let path = rule.sons[s].path;
        let mut at = son0;
        for step in 0..path.depth() {
            at = mg.elements[at].nb[path.step(step)]
                .ok_or(TopologyError::InvalidTopology("son path broken"))?;
        }
        sons.push(at);
    }

    Ok(sons)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::algebra::Format;
    use crate::math::shapes::tet_volume;
    use crate::math::{Point3, Vector2, Vector3};
    use crate::simplex::{CONDENSED_EDGE_OF_SIDE, EDGES_OF_ELEM, SIDES_OF_ELEM};
    use crate::topology::{BoundarySegment, NodeId, PlanarSegment, SideSpec, VertexSegment};
    use approx::assert_relative_eq;

    fn rules() -> RuleTable {
        RuleTable::generate()
    }

    fn reference_positions() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    fn unit_tet() -> (MultiGrid, ElementId, [NodeId; 4]) {
        let mut mg = MultiGrid::new(Format::nodal(0));
        let nodes = reference_positions().map(|p| mg.insert_inner_node(p));
        let elem = mg.insert_tetrahedron(nodes, [None, None, None, None]).unwrap();
        mg.create_all_connections().unwrap();
        (mg, elem, nodes)
    }

    fn assert_neighbor_symmetry(mg: &MultiGrid) {
        for level in 0..=mg.top_level() {
            for &elem in mg.level_elements(level) {
                for side in 0..SIDES_OF_ELEM {
                    if let Some(nb) = mg.elements[elem].nb[side] {
                        assert!(
                            mg.elements[nb].side_facing(elem).is_some(),
                            "neighbor does not point back"
                        );
                    }
                }
            }
        }
    }

    fn total_leaf_volume(mg: &MultiGrid) -> f64 {
        let mut sum = 0.0;
        for level in 0..=mg.top_level() {
            for &elem in mg.level_elements(level) {
                if mg.elements[elem].refine == NO_REF_RULE {
                    sum += tet_volume(&mg.corner_positions(elem)).abs();
                }
            }
        }
        sum
    }

    #[test]
    fn empty_grid_refines_without_allocation() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let mut mg = MultiGrid::new(Format::nodal(0));

        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();
        assert_eq!(mg.top_level(), 0);
        assert!(mg.nodes.is_empty());
        assert!(mg.vectors.is_empty());
    }

    #[test]
    fn refine_without_marks_is_a_no_op() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, _, _) = unit_tet();

        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();
        assert_eq!(mg.top_level(), 0);
        assert_eq!(mg.level_elements(0).len(), 1);
    }

    #[test]
    fn copy_mark_produces_one_identical_son() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Copy).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        assert_eq!(mg.top_level(), 1);
        assert_eq!(mg.elements[elem].refine, COPY_REF_RULE);
        assert_eq!(mg.level_elements(1).len(), 1);

        let son = mg.level_elements(1)[0];
        let mut son_positions: Vec<_> = mg
            .corner_positions(son)
            .iter()
            .map(|p| (p.x, p.y, p.z))
            .collect();
        let mut father_positions: Vec<_> = mg
            .corner_positions(elem)
            .iter()
            .map(|p| (p.x, p.y, p.z))
            .collect();
        son_positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        father_positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(son_positions, father_positions);
        assert_neighbor_symmetry(&mg);
    }

    #[test]
    fn bisecting_one_edge_yields_two_sons_and_a_midnode() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, nodes) = unit_tet();

        let rule = table.lookup(0b00_0001, 0).unwrap();
        refiner.mark_with_rule(&mut mg, elem, rule);
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        assert_eq!(mg.elements[elem].refine, rule);
        assert_eq!(mg.level_elements(1).len(), 2);

        let edge = mg.get_edge(nodes[0], nodes[1]).unwrap();
        let mid = mg.edges[edge].mid_node.unwrap();
        let mid_pos = mg.vertices[mg.nodes[mid].vertex].pos;
        assert_relative_eq!(mid_pos, Point3::new(0.5, 0.0, 0.0));

        assert_relative_eq!(total_leaf_volume(&mg), 1.0 / 6.0, epsilon = 1e-12);
        assert_neighbor_symmetry(&mg);
    }

    #[test]
    fn full_refinement_tie_breaks_to_the_0_5_diagonal() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        // for the reference tetrahedron all three diagonals tie at
        // sqrt(2)/2 and the first tested variant wins
        assert_eq!(mg.elements[elem].refine, table.full_rule_0_5());
        assert_eq!(mg.elements[elem].nsons, 8);
        assert_eq!(mg.level_elements(1).len(), 8);
        for &son in mg.level_elements(1) {
            assert_eq!(mg.elements[son].class, ElementClass::Red);
        }

        let sons = get_sons(&mg, &table, elem).unwrap();
        assert_eq!(sons.len(), 8);

        assert_relative_eq!(total_leaf_volume(&mg), 1.0 / 6.0, epsilon = 1e-12);
        assert_neighbor_symmetry(&mg);
    }

    #[test]
    fn red_neighbor_forces_green_closure() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let mut mg = MultiGrid::new(Format::nodal(0));

        let base = reference_positions().map(|p| mg.insert_inner_node(p));
        let below = mg.insert_inner_node(Point3::new(0.4, 0.4, -1.0));
        let red = mg.insert_tetrahedron(base, [None, None, None, None]).unwrap();
        let green = mg
            .insert_tetrahedron([base[0], base[1], base[2], below], [None, None, None, None])
            .unwrap();
        mg.create_all_connections().unwrap();
        assert!(mg.elements[red].nb.contains(&Some(green)));

        refiner.mark_for_refinement(&mut mg, red, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        assert_eq!(mg.elements[red].refine, table.full_rule_0_5());
        assert_eq!(mg.elements[green].refine_class, ElementClass::Green);
        assert_ne!(mg.elements[green].refine, NO_REF_RULE);

        // the shared face carries three bisected edges, so the green
        // element ends up with the side rule and four sons
        let pat = table.rule(mg.elements[green].refine).pat;
        let side = mg.elements[green].side_facing(red).unwrap();
        assert_eq!(pat, CONDENSED_EDGE_OF_SIDE[side]);
        assert_eq!(mg.elements[green].nsons, 4);

        assert_neighbor_symmetry(&mg);
    }

    #[test]
    fn coarsening_restores_the_initial_grid() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        let nodes_before = mg.nodes.len();
        let edges_before = mg.edges.len();
        let vectors_before = mg.vectors.len();
        let connections_before = mg.connections.len();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();
        assert_eq!(mg.top_level(), 1);

        for &son in &mg.level_elements(1).to_vec() {
            refiner.mark_for_refinement(&mut mg, son, MarkRule::Unrefine).unwrap();
        }
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        assert_eq!(mg.top_level(), 0);
        assert_eq!(mg.elements[elem].refine, NO_REF_RULE);
        assert_eq!(mg.elements[elem].nsons, 0);
        assert_eq!(mg.nodes.len(), nodes_before);
        assert_eq!(mg.edges.len(), edges_before);
        assert_eq!(mg.vectors.len(), vectors_before);
        assert_eq!(mg.connections.len(), connections_before);
    }

    #[test]
    fn second_full_refinement_creates_a_third_level() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        let son = get_sons(&mg, &table, elem).unwrap()[0];
        refiner.mark_for_refinement(&mut mg, son, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        assert_eq!(mg.top_level(), 2);
        assert_eq!(mg.elements[son].refine_class, ElementClass::Red);
        assert_eq!(mg.elements[son].nsons, 8);
        assert!(!mg.level_elements(2).is_empty());
        assert_neighbor_symmetry(&mg);

        assert_relative_eq!(total_leaf_volume(&mg), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn copy_all_refines_the_whole_sibling_family() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::CopyAll).unwrap();

        let son = get_sons(&mg, &table, elem).unwrap()[0];
        refiner.mark_for_refinement(&mut mg, son, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::CopyAll).unwrap();

        assert_eq!(mg.top_level(), 2);
        for &level1 in &mg.level_elements(1).to_vec() {
            assert_ne!(
                mg.elements[level1].refine,
                NO_REF_RULE,
                "under COPY_ALL every sibling refines or copies"
            );
        }
    }

    #[test]
    fn marks_on_refined_elements_are_refused() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        assert!(!refiner.is_allowed_to_refine(&mg, elem));
        assert!(refiner
            .mark_for_refinement(&mut mg, elem, MarkRule::Red)
            .is_err());
        assert!(!refiner.estimate_here(&mg, elem));
    }

    #[test]
    fn refinement_marks_decode_back() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        assert_eq!(refiner.get_refinement_mark(&mg, elem), (MarkRule::Red, 0));

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Copy).unwrap();
        assert_eq!(refiner.get_refinement_mark(&mg, elem), (MarkRule::Copy, 0));

        refiner
            .mark_for_refinement(&mut mg, elem, MarkRule::Unrefine)
            .unwrap();
        assert_eq!(
            refiner.get_refinement_mark(&mg, elem),
            (MarkRule::Unrefine, 0)
        );

        refiner
            .mark_for_refinement(&mut mg, elem, MarkRule::NoRefinement)
            .unwrap();
        assert_eq!(
            refiner.get_refinement_mark(&mg, elem),
            (MarkRule::NoRefinement, 0)
        );
    }

    fn boundary_tet() -> (MultiGrid, ElementId, [NodeId; 4]) {
        let mut mg = MultiGrid::new(Format::nodal(0));
        // the z = 0 face is a planar boundary segment
        let segment = mg.add_segment(Box::new(PlanarSegment::new(
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        )));

        let lambda = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        let positions = reference_positions();
        let n0 = mg.insert_boundary_node(
            positions[0],
            vec![VertexSegment {
                segment,
                lambda: lambda[0],
            }],
        );
        let n1 = mg.insert_boundary_node(
            positions[1],
            vec![VertexSegment {
                segment,
                lambda: lambda[1],
            }],
        );
        let n2 = mg.insert_boundary_node(
            positions[2],
            vec![VertexSegment {
                segment,
                lambda: lambda[2],
            }],
        );
        let n3 = mg.insert_inner_node(positions[3]);

        // side 0 has corners 0, 2, 1
        let spec = SideSpec {
            segment,
            params: [lambda[0], lambda[2], lambda[1]],
        };
        let elem = mg
            .insert_tetrahedron([n0, n1, n2, n3], [Some(spec), None, None, None])
            .unwrap();
        mg.create_all_connections().unwrap();
        (mg, elem, [n0, n1, n2, n3])
    }

    #[test]
    fn boundary_bisection_projects_the_midvertex() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, nodes) = boundary_tet();

        let rule = table.lookup(0b00_0001, 0).unwrap();
        refiner.mark_with_rule(&mut mg, elem, rule);
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        let edge = mg.get_edge(nodes[0], nodes[1]).unwrap();
        let mid = mg.edges[edge].mid_node.unwrap();
        let vertex = &mg.vertices[mg.nodes[mid].vertex];
        assert!(vertex.is_boundary());
        assert!(!vertex.moved);
        assert_relative_eq!(vertex.pos, Point3::new(0.5, 0.0, 0.0));

        // both sons carry a boundary side record covering the father side
        let mut boundary_sides = 0;
        for &son in mg.level_elements(1) {
            for side in 0..SIDES_OF_ELEM {
                if let Some(side_id) = mg.elements[son].sides[side] {
                    assert_eq!(mg.sides[side_id].segment, 0);
                    boundary_sides += 1;
                }
            }
        }
        assert_eq!(boundary_sides, 2);
    }

    #[test]
    fn full_boundary_refinement_interpolates_side_parameters() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = boundary_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        // four of the eight sons touch the refined boundary face
        let mut boundary_sons = 0;
        for &son in mg.level_elements(1) {
            for side in 0..SIDES_OF_ELEM {
                if let Some(side_id) = mg.elements[son].sides[side] {
                    boundary_sons += 1;
                    for param in mg.sides[side_id].params {
                        assert!(param.x >= 0.0 && param.y >= 0.0 && param.x + param.y <= 1.0);
                    }
                }
            }
        }
        assert_eq!(boundary_sons, 4);
    }

    struct BumpSegment;

    impl BoundarySegment for BumpSegment {
        fn position(&self, lambda: Vector2) -> Point3 {
            Point3::new(lambda.x, lambda.y, 0.2 * lambda.x * (1.0 - lambda.x))
        }
    }

    #[test]
    fn curved_boundary_moves_the_midvertex() {
        let table = rules();
        let refiner = Refiner::new(&table);

        let mut mg = MultiGrid::new(Format::nodal(0));
        let segment = mg.add_segment(Box::new(BumpSegment));
        let positions = reference_positions();
        let n0 = mg.insert_boundary_node(
            positions[0],
            vec![VertexSegment {
                segment,
                lambda: Vector2::new(0.0, 0.0),
            }],
        );
        let n1 = mg.insert_boundary_node(
            positions[1],
            vec![VertexSegment {
                segment,
                lambda: Vector2::new(1.0, 0.0),
            }],
        );
        let n2 = mg.insert_inner_node(positions[2]);
        let n3 = mg.insert_inner_node(positions[3]);
        let elem = mg
            .insert_tetrahedron([n0, n1, n2, n3], [None, None, None, None])
            .unwrap();
        mg.create_all_connections().unwrap();

        let rule = table.lookup(0b00_0001, 0).unwrap();
        refiner.mark_with_rule(&mut mg, elem, rule);
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        let edge = mg.get_edge(n0, n1).unwrap();
        let mid = mg.edges[edge].mid_node.unwrap();
        let vertex = &mg.vertices[mg.nodes[mid].vertex];
        assert!(vertex.moved);
        assert_relative_eq!(vertex.pos.z, 0.05, epsilon = 1e-12);

        // local coordinates recomputed through the father Jacobian
        let local = vertex.local;
        assert_relative_eq!(local.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(local.z, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn edge_pattern_of_every_refine_state_matches_the_mid_nodes() {
        let table = rules();
        let refiner = Refiner::new(&table);
        let (mut mg, elem, _) = unit_tet();

        refiner.mark_for_refinement(&mut mg, elem, MarkRule::Red).unwrap();
        refiner.refine_multigrid(&mut mg, RefineFlag::TrulyLocal).unwrap();

        for level in 0..=mg.top_level() {
            for &e in &mg.level_elements(level).to_vec() {
                let rule = table.rule(mg.elements[e].refine);
                for edge_no in 0..EDGES_OF_ELEM {
                    let edge = mg.element_edge(e, edge_no).unwrap();
                    let has_mid = mg.edges[edge].mid_node.is_some();
                    if rule.pattern[edge_no] {
                        assert!(has_mid, "bisected edge without mid node");
                    }
                }
            }
        }
    }
}
