//! The closure engine.
//!
//! Marks set by the user are propagated over the element-edge-side graph
//! of every level until the rules of neighboring elements fit together:
//! edge patterns accumulate on the edges, side patterns disambiguate the
//! trisection diagonals of shared faces, and unmarked neighbors of red
//! elements receive green closure or copy marks.

use crate::algebra::MIN_VNCLASS;
use crate::error::{RefineError, RuleError, TopologyError};
use crate::refine::{get_sons, FullRulePolicy, RefineFlag};
use crate::rules::{RuleTable, COPY_REF_RULE, NO_REF_RULE};
use crate::simplex::{
    CONDENSED_EDGE_OF_SIDE, CORNERS_OF_ELEM, CORNER_OF_EDGE, EDGES_OF_ELEM, SIDES_OF_ELEM,
    TRI_SECTION_EDGE,
};
use crate::topology::{ElementClass, ElementId, MultiGrid};

fn element_edge_or_err(
    mg: &MultiGrid,
    elem: ElementId,
    i: usize,
    j: usize,
) -> Result<crate::topology::EdgeId, RefineError> {
    let corners = mg.elements[elem].corners;
    mg.get_edge(corners[i], corners[j])
        .ok_or_else(|| TopologyError::MissingEdge.into())
}

/// Computes the closure of one grid level. Returns the number of elements
/// that will refine; zero also signals an inadmissible pattern meeting.
pub(crate) fn close_grid(
    mg: &mut MultiGrid,
    rules: &RuleTable,
    policy: FullRulePolicy,
    level: usize,
) -> Result<usize, RefineError> {
    let element_list: Vec<ElementId> = mg.grids[level].elements.clone();

    // reset pattern and used flags on elements and edges
    for &elem in &element_list {
        mg.elements[elem].used = false;
        for i in 0..CORNERS_OF_ELEM {
            for j in (i + 1)..CORNERS_OF_ELEM {
                let edge = element_edge_or_err(mg, elem, i, j)?;
                mg.edges[edge].pattern = false;
                mg.edges[edge].add_pattern = true;
            }
        }
    }

    // collect the edge patterns of the red marks on the edges
    for &elem in &element_list {
        if mg.elements[elem].mark_class == ElementClass::Red {
            let mark = mg.elements[elem].mark;
            for e in 0..EDGES_OF_ELEM {
                if rules.rule(mark).pattern[e] {
                    let corners = mg.elements[elem].corners;
                    if let Some(edge) =
                        mg.get_edge(corners[CORNER_OF_EDGE[e][0]], corners[CORNER_OF_EDGE[e][1]])
                    {
                        mg.edges[edge].pattern = true;
                    }
                }
            }
        }
        mg.elements[elem].edge_pattern = 0;
        mg.elements[elem].side_pattern = 0;
    }

    // pull the edge patterns back onto the elements and reconcile the
    // trisection diagonals of shared sides
    for &elem in &element_list {
        mg.elements[elem].used = true;

        let mut edge_pattern = 0_u8;
        for e in (0..EDGES_OF_ELEM).rev() {
            let corners = mg.elements[elem].corners;
            let edge = mg
                .get_edge(corners[CORNER_OF_EDGE[e][0]], corners[CORNER_OF_EDGE[e][1]])
                .ok_or(TopologyError::MissingEdge)?;
            edge_pattern = (edge_pattern << 1) | u8::from(mg.edges[edge].pattern);
        }
        mg.elements[elem].edge_pattern = edge_pattern;

        for i in 0..SIDES_OF_ELEM {
            let Some(nb) = mg.elements[elem].nb[i] else {
                continue;
            };
            if !mg.elements[nb].used {
                continue;
            }
            // both edge patterns are final now
            let Some(j) = mg.elements[nb].side_facing(elem) else {
                return Err(TopologyError::InvalidTopology("neighbor pointers asymmetric").into());
            };

            let my_edge_num =
                TRI_SECTION_EDGE[usize::from(edge_pattern & CONDENSED_EDGE_OF_SIDE[i])][0];
            if my_edge_num == -2 {
                return Ok(0);
            }
            if my_edge_num == -1 {
                continue;
            }

            let nb_pattern = mg.elements[nb].edge_pattern;
            let nb_edge_num =
                TRI_SECTION_EDGE[usize::from(nb_pattern & CONDENSED_EDGE_OF_SIDE[j])][0];
            if nb_edge_num == -2 || nb_edge_num == -1 {
                return Ok(0);
            }

            #[allow(clippy::cast_sign_loss)]
            let (my_edge_num, nb_edge_num) = (my_edge_num as usize, nb_edge_num as usize);
            let my_corners = mg.elements[elem].corners;
            let nb_corners = mg.elements[nb].corners;
            let m0 = my_corners[CORNER_OF_EDGE[my_edge_num][0]];
            let m1 = my_corners[CORNER_OF_EDGE[my_edge_num][1]];
            let n0 = nb_corners[CORNER_OF_EDGE[nb_edge_num][0]];
            let n1 = nb_corners[CORNER_OF_EDGE[nb_edge_num][1]];

            if !(m0 == n0 && m1 == n1) && !(m0 == n1 && m1 == n0) {
                mg.elements[nb].side_pattern ^= 1 << j;
            }
        }
    }

    // decode edge and side patterns into refinement rules
    let mut count = 0;
    for &elem in &element_list {
        let edge_pattern = mg.elements[elem].edge_pattern;
        let side_pattern = mg.elements[elem].side_pattern;
        let mut mark =
            rules
                .lookup(edge_pattern, side_pattern)
                .ok_or(RuleError::DecoderMiss {
                    edge_pattern,
                    side_pattern,
                })?;

        if mark == rules.full_rule() {
            let corners = mg.corner_positions(elem);
            mark = match policy.select(&corners) {
                crate::refine::FullRuleVariant::Mid05 => rules.full_rule_0_5(),
                crate::refine::FullRuleVariant::Mid13 => rules.full_rule_1_3(),
                crate::refine::FullRuleVariant::Mid24 => rules.full_rule_2_4(),
            };
        }
        if mg.elements[elem].mark_class == ElementClass::Red && mark == NO_REF_RULE {
            mark = COPY_REF_RULE;
        }
        if mg.elements[elem].mark_class != ElementClass::Red && mark != NO_REF_RULE {
            mg.elements[elem].mark_class = ElementClass::Green;
        }
        if mark != NO_REF_RULE {
            count += 1;
        }
        mg.elements[elem].mark = mark;
    }

    // green covering around the red elements
    for &elem in &element_list {
        if mg.elements[elem].mark_class != ElementClass::Red {
            continue;
        }
        for i in 0..SIDES_OF_ELEM {
            let Some(nb) = mg.elements[elem].nb[i] else {
                continue;
            };
            if mg.elements[nb].mark_class == ElementClass::Green
                || mg.elements[nb].mark_class == ElementClass::Red
            {
                continue;
            }
            if mg.elements[nb].mark == NO_REF_RULE {
                mg.elements[nb].mark = COPY_REF_RULE;
            }
            mg.elements[nb].mark_class = ElementClass::Green;
        }
    }

    // stamp the edges of the red elements as already added
    for &elem in &element_list {
        if mg.elements[elem].mark_class != ElementClass::Red {
            continue;
        }
        for i in 0..CORNERS_OF_ELEM {
            for j in (i + 1)..CORNERS_OF_ELEM {
                let edge = element_edge_or_err(mg, elem, i, j)?;
                mg.edges[edge].add_pattern = false;
            }
        }
    }

    Ok(count)
}

/// Restricts refinement marks from the finer level down onto `level`,
/// preparing whole-subtree coarsening and promoting fathers whose sons'
/// enforced pattern no longer matches their refinement.
pub(crate) fn restrict_marks(
    mg: &mut MultiGrid,
    rules: &RuleTable,
    level: usize,
) -> Result<(), RefineError> {
    let element_list: Vec<ElementId> = mg.grids[level].elements.clone();

    for &elem in &element_list {
        let sons = get_sons(mg, rules, elem)?;
        let my_rule = mg.elements[elem].refine;
        let son_class = mg.elements[elem].refine_class;
        let my_class = mg.elements[elem].class;

        if my_rule == NO_REF_RULE {
            continue;
        }

        // copies always restart from no refinement
        if my_class == ElementClass::Yellow {
            mg.elements[elem].mark = NO_REF_RULE;
            continue;
        }

        // irregular elements are marked by the estimator
        if my_class == ElementClass::Green {
            continue;
        }

        if son_class == ElementClass::Yellow {
            continue;
        }

        // regular elements with green or copy refinement go to no
        // refinement or red refinement
        if son_class == ElementClass::Green || son_class == ElementClass::Yellow {
            for &son in &sons {
                if mg.elements[son].mark == NO_REF_RULE {
                    continue;
                }
                if mg.elements[elem].mark_class == ElementClass::Red {
                    // marked from outside
                    if mg.elements[elem].mark != rules.full_rule() {
                        mg.elements[elem].mark = my_rule;
                    }
                } else {
                    // find a regular rule consistent with the marked
                    // neighbors of the sons so their marks survive
                    let mut condensed = rules.rule(my_rule).pat;
                    for e in 0..EDGES_OF_ELEM {
                        let corners = mg.elements[elem].corners;
                        let c0 = corners[CORNER_OF_EDGE[e][0]];
                        let c1 = corners[CORNER_OF_EDGE[e][1]];
                        let edge = mg.get_edge(c0, c1).ok_or(TopologyError::MissingEdge)?;
                        if mg.edges[edge].mid_node.is_none() {
                            let s0 = mg.nodes[c0]
                                .son
                                .ok_or(TopologyError::InvalidTopology("corner without son node"))?;
                            let s1 = mg.nodes[c1]
                                .son
                                .ok_or(TopologyError::InvalidTopology("corner without son node"))?;
                            let son_edge =
                                mg.get_edge(s0, s1).ok_or(TopologyError::MissingEdge)?;
                            if mg.edges[son_edge].add_pattern {
                                condensed |= 1 << e;
                            }
                        }
                    }
                    let promoted =
                        rules
                            .lookup(condensed, 0)
                            .ok_or(RuleError::DecoderMiss {
                                edge_pattern: condensed,
                                side_pattern: 0,
                            })?;
                    mg.elements[elem].mark = promoted;
                    mg.elements[elem].mark_class = ElementClass::Red;
                }
                break;
            }
            continue;
        }

        // regular elements with regular refinement are the only ones that
        // may coarsen
        if mg.elements[elem].refine_class == ElementClass::Red {
            mg.elements[elem].mark = my_rule;
            mg.elements[elem].mark_class = son_class;
        }
        let keeps_a_son = sons.iter().any(|&son| !mg.elements[son].coarsen);
        if keeps_a_son {
            continue;
        }

        // every son coarsens: the whole subtree goes, the father returns
        // to the unrefined state instead of a copy refinement
        mg.elements[elem].mark = NO_REF_RULE;
        mg.elements[elem].mark_class = ElementClass::Yellow;
        mg.elements[elem].coarsen = false;
    }
    Ok(())
}

/// Moves red marks of leaves down to the nearest regularly created
/// ancestor, clearing the marks in between.
pub(crate) fn drop_marks(mg: &mut MultiGrid) {
    for level in (1..=mg.top_level()).rev() {
        let element_list: Vec<ElementId> = mg.grids[level].elements.clone();
        for &elem in &element_list {
            if mg.elements[elem].refine != NO_REF_RULE
                || mg.elements[elem].mark_class != ElementClass::Red
                || mg.elements[elem].class == ElementClass::Red
            {
                continue;
            }
            let mark = mg.elements[elem].mark;
            let mut walk = elem;
            while mg.elements[walk].class != ElementClass::Red {
                mg.elements[walk].mark = NO_REF_RULE;
                match mg.elements[walk].father {
                    Some(father) => walk = father,
                    None => break,
                }
            }
            mg.elements[walk].mark = mark;
            mg.elements[walk].mark_class = ElementClass::Red;
        }
    }
}

/// Determines the copy elements of a level from the next-level vector
/// classes.
pub(crate) fn compute_copies(
    mg: &mut MultiGrid,
    flag: RefineFlag,
    level: usize,
) {
    mg.clear_next_vector_classes(level);

    let element_list: Vec<ElementId> = mg.grids[level].elements.clone();
    let mut any_seeded = false;
    for &elem in &element_list {
        if mg.elements[elem].mark != NO_REF_RULE
            && (mg.elements[elem].mark_class == ElementClass::Red
                || mg.elements[elem].mark_class == ElementClass::Green)
        {
            mg.seed_next_vector_classes(elem);
            any_seeded = true;
        }
    }

    if flag == RefineFlag::CopyAll {
        if any_seeded {
            for &elem in &element_list {
                mg.seed_next_vector_classes(elem);
            }
        }
    } else {
        mg.propagate_next_vector_classes(level);
    }

    // an element is copied when it touches a vector of class 2 or higher
    for &elem in &element_list {
        if mg.elements[elem].mark == NO_REF_RULE
            && mg.max_next_vector_class(elem) >= MIN_VNCLASS
        {
            mg.elements[elem].mark = COPY_REF_RULE;
            mg.elements[elem].mark_class = ElementClass::Yellow;
        }
    }
}
