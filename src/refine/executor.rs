//! The refinement executor.
//!
//! Walks the levels bottom-up, compares each element's MARK against its
//! REFINE state, removes obsolete sons in post-order and builds the new
//! ones: interior edges, son elements with their corner-pair edges,
//! interpolated boundary side records and the neighbor wiring within the
//! family and across stable neighbors.

use crate::error::{RefineError, TopologyError};
use crate::refine::closure::{close_grid, compute_copies, drop_marks, restrict_marks};
use crate::refine::context::ElementContext;
use crate::refine::{get_sons, RefineFlag, Refiner};
use crate::rules::{EdgeKind, FATHER_SIDE_OFFSET, NO_REF_RULE};
use crate::simplex::{
    CORNERS_OF_ELEM, CORNERS_OF_SIDE, CORNER_OF_SIDE, CORNER_OF_SIDE_INV, SIDES_OF_ELEM,
};
use crate::topology::{ElementClass, ElementId, ElementSideData, MultiGrid};

fn ref_type_changes(mg: &MultiGrid, elem: ElementId) -> bool {
    let e = &mg.elements[elem];
    e.refine != e.mark || e.refine_class != e.mark_class
}

impl Refiner<'_> {
    /// Removes the refinement of an element: sons of sons first, then all
    /// interior nodes and edges, then the son elements themselves.
    fn unrefine_element(
        &self,
        mg: &mut MultiGrid,
        son_level: usize,
        elem: ElementId,
    ) -> Result<(), RefineError> {
        if mg.elements[elem].refine == NO_REF_RULE || son_level > mg.top_level() {
            return Ok(());
        }

        let sons = get_sons(mg, self.rules, elem)?;
        for &son in &sons {
            mg.elements[son].mark = NO_REF_RULE;
            if mg.elements[son].refine != NO_REF_RULE {
                let mut son_ctx = ElementContext::gather(mg, self.rules, son)?;
                self.unrefine_element(mg, son_level + 1, son)?;
                son_ctx.update(mg, self.rules, son, son_level + 1)?;
            }
        }

        // connections around the sons go before the sons themselves
        for &son in &sons {
            mg.dispose_connections_in_neighborhood(son);
        }

        for &son in &sons {
            mg.dispose_edges_from_element(son)?;
            mg.dispose_element(son);
        }

        mg.elements[elem].nsons = 0;
        mg.elements[elem].son = None;

        Ok(())
    }

    /// Builds the sons of an element in an updated context.
    #[allow(clippy::too_many_lines)]
    fn refine_element(
        &self,
        mg: &mut MultiGrid,
        fine_level: usize,
        elem: ElementId,
        ctx: &ElementContext,
    ) -> Result<(), RefineError> {
        let mark = mg.elements[elem].mark;
        if mark == NO_REF_RULE {
            return Ok(());
        }
        let rule = self.rules.rule(mark).clone();
        let mark_class = mg.elements[elem].mark_class;
        let elem_boundary = mg.elements[elem].boundary;

        let ctx_node = |i: usize| -> Result<crate::topology::NodeId, RefineError> {
            ctx.get(i)
                .ok_or_else(|| TopologyError::InvalidTopology("rule references empty slot").into())
        };

        // interior edges of the father
        for edata in rule.interior_edges() {
            if edata.kind != EdgeKind::Inner {
                continue;
            }
            let from = ctx_node(usize::from(edata.from))?;
            let to = ctx_node(usize::from(edata.to))?;
            let edge = mg.create_edge(fine_level, from, to);
            mg.edges[edge].kind = EdgeKind::Inner;
        }

        // son elements with their corner-pair edges
        let mut son_list = Vec::with_capacity(rule.nsons);
        for s in 0..rule.nsons {
            let mut boundary = false;
            if elem_boundary {
                for i in 0..SIDES_OF_ELEM {
                    let side = rule.sons[s].nb[i];
                    if side >= FATHER_SIDE_OFFSET
                        && mg.elements[elem].sides[usize::from(side - FATHER_SIDE_OFFSET)]
                            .is_some()
                    {
                        boundary = true;
                        break;
                    }
                }
            }

            let mut corners = [crate::topology::NodeId::default(); CORNERS_OF_ELEM];
            for (i, corner) in corners.iter_mut().enumerate() {
                *corner = ctx_node(usize::from(rule.sons[s].corners[i]))?;
            }

            let son = mg.create_element(fine_level, corners, boundary);
            mg.elements[son].class = mark_class;
            mg.elements[son].father = Some(elem);
            son_list.push(son);

            for i in 0..CORNERS_OF_ELEM {
                for j in (i + 1)..CORNERS_OF_ELEM {
                    let edge = mg.create_edge(fine_level, corners[i], corners[j]);
                    mg.edges[edge].no_of_elem = mg.edges[edge]
                        .no_of_elem
                        .checked_add(1)
                        .ok_or(TopologyError::EdgeElementOverflow)?;
                }
            }
        }
        mg.elements[elem].nsons = rule.nsons;
        mg.elements[elem].son = Some(son_list[0]);

        // boundary side records with interpolated corner parameters
        if elem_boundary {
            for s in 0..rule.nsons {
                if !mg.elements[son_list[s]].boundary {
                    continue;
                }
                for j in 0..SIDES_OF_ELEM {
                    let side = rule.sons[s].nb[j];
                    if side < FATHER_SIDE_OFFSET {
                        continue;
                    }
                    let side = usize::from(side - FATHER_SIDE_OFFSET);
                    let Some(old_side) = mg.elements[elem].sides[side] else {
                        continue;
                    };
                    let old = mg.sides[old_side].clone();

                    let mut params = [crate::math::Vector2::zeros(); CORNERS_OF_SIDE];
                    for (i, param) in params.iter_mut().enumerate() {
                        let ni = CORNER_OF_SIDE[j][i];
                        let pi = usize::from(rule.sons[s].corners[ni]);
                        if pi < CORNERS_OF_ELEM {
                            // a corner of the father
                            let nsi = CORNER_OF_SIDE_INV[side][pi];
                            let nsi = usize::try_from(nsi).map_err(|_| {
                                TopologyError::InvalidTopology("corner not on father side")
                            })?;
                            *param = old.params[nsi];
                        } else {
                            // a midpoint of a father edge
                            let node = ctx_node(pi)?;
                            let vertex = mg.nodes[node].vertex;
                            let vs = mg.vertices[vertex].segment(old.segment).ok_or(
                                TopologyError::InvalidTopology(
                                    "mid vertex misses the father's boundary segment",
                                ),
                            )?;
                            *param = vs.lambda;
                        }
                    }

                    let new_side = mg.sides.insert(ElementSideData {
                        segment: old.segment,
                        params,
                    });
                    mg.elements[son_list[s]].sides[j] = Some(new_side);
                }
            }
        }

        // connect the sons with each other and with stable neighbors
        for s in 0..rule.nsons {
            for i in 0..SIDES_OF_ELEM {
                let side = rule.sons[s].nb[i];

                // a sibling face
                if side < FATHER_SIDE_OFFSET {
                    let sibling = son_list[usize::from(side)];
                    mg.elements[son_list[s]].nb[i] = Some(sibling);

                    let l = (0..SIDES_OF_ELEM)
                        .find(|&l| usize::from(rule.sons[usize::from(side)].nb[l]) == s)
                        .ok_or(TopologyError::InvalidTopology("rule neighbors asymmetric"))?;
                    mg.dispose_doubled_side_vector(son_list[s], i, sibling, l);
                    continue;
                }

                // boundary faces carry their side record instead
                if mg.elements[son_list[s]].boundary && mg.elements[son_list[s]].sides[i].is_some()
                {
                    continue;
                }

                let side = usize::from(side - FATHER_SIDE_OFFSET);
                let Some(neighbor) = mg.elements[elem].nb[side] else {
                    continue;
                };
                if ref_type_changes(mg, neighbor)
                    || mg.elements[neighbor].refine == NO_REF_RULE
                {
                    continue;
                }

                let l = mg.elements[neighbor]
                    .side_facing(elem)
                    .ok_or(TopologyError::InvalidTopology("neighbor pointers asymmetric"))?;

                let rule2 = self.rules.rule(mg.elements[neighbor].refine).clone();
                let son_list2 = get_sons(mg, self.rules, neighbor)?;
                let mut found = false;
                'nb_sons: for (s2, &nb_son) in son_list2.iter().enumerate().take(rule2.nsons) {
                    for j in 0..SIDES_OF_ELEM {
                        if usize::from(rule2.sons[s2].nb[j])
                            != usize::from(FATHER_SIDE_OFFSET) + l
                        {
                            continue;
                        }
                        let mut points = 0_u8;
                        for p in 0..CORNERS_OF_SIDE {
                            for q in 0..CORNERS_OF_SIDE {
                                let mine = mg.elements[son_list[s]].corners
                                    [CORNER_OF_SIDE[i][p]];
                                let theirs =
                                    mg.elements[nb_son].corners[CORNER_OF_SIDE[j][q]];
                                if mine == theirs {
                                    points |= (1 << p) | (8 << q);
                                    break;
                                }
                            }
                        }
                        if points == 63 {
                            mg.elements[son_list[s]].nb[i] = Some(nb_son);
                            mg.elements[nb_son].nb[j] = Some(son_list[s]);
                            mg.dispose_doubled_side_vector(son_list[s], i, nb_son, j);
                            found = true;
                            break 'nb_sons;
                        }
                    }
                }
                if !found {
                    return Err(
                        TopologyError::InvalidTopology("no matching son face on neighbor").into()
                    );
                }
            }
        }

        Ok(())
    }

    /// Refines one level of the grid: every element whose mark differs
    /// from its refinement state is rebuilt.
    fn refine_grid(&self, mg: &mut MultiGrid, level: usize) -> Result<(), RefineError> {
        let fine_level = level + 1;
        mg.grids[fine_level].changed = false;

        let element_list: Vec<ElementId> = mg.grids[level].elements.clone();
        for &elem in &element_list {
            if ref_type_changes(mg, elem) {
                let mut ctx = ElementContext::gather(mg, self.rules, elem)?;
                self.unrefine_element(mg, fine_level, elem)?;
                ctx.update(mg, self.rules, elem, fine_level)?;
                self.refine_element(mg, fine_level, elem, &ctx)?;
                mg.elements[elem].refine = mg.elements[elem].mark;
                mg.elements[elem].refine_class = mg.elements[elem].mark_class;
                mg.grids[fine_level].changed = true;
            }
        }

        for &elem in &element_list {
            mg.elements[elem].mark = NO_REF_RULE;
        }

        Ok(())
    }

    /// Performs a full refinement cycle over the multigrid.
    ///
    /// # Errors
    ///
    /// Configuration, decoder and geometry failures abort the cycle; the
    /// multigrid must be considered undefined afterwards.
    pub fn refine_multigrid(
        &self,
        mg: &mut MultiGrid,
        flag: RefineFlag,
    ) -> Result<(), RefineError> {
        drop_marks(mg);

        mg.prepare_algebra_modification();

        // restriction of the coarser levels from above
        let top = mg.top_level();
        for level in (1..=top).rev() {
            close_grid(mg, self.rules, self.policy, level)?;
            restrict_marks(mg, self.rules, level - 1)?;
        }

        let mut new_level = false;
        for level in 0..=top {
            // leave only regular marks
            let element_list: Vec<ElementId> = mg.grids[level].elements.clone();
            for &elem in &element_list {
                let e = &mg.elements[elem];
                if !(e.class == ElementClass::Red && e.mark_class == ElementClass::Red) {
                    mg.elements[elem].mark = NO_REF_RULE;
                }
            }

            let refining = close_grid(mg, self.rules, self.policy, level)?;

            compute_copies(mg, flag, level);

            // connections that may change on the next level are disposed
            // now; the flags left behind trigger the rebuild
            if level < top {
                let finer_list: Vec<ElementId> = mg.grids[level + 1].elements.clone();
                for &elem in &finer_list {
                    let father = mg.elements[elem]
                        .father
                        .ok_or(TopologyError::InvalidTopology("son without father"))?;
                    if mg.elements[father].refine != mg.elements[father].mark {
                        mg.dispose_connections_in_neighborhood(elem);
                    }
                }
            }

            if refining > 0 && level == top {
                mg.create_new_level();
                new_level = true;
            }

            if level < top || new_level {
                self.refine_grid(mg, level)?;

                mg.grid_create_connection(level + 1)?;

                if flag == RefineFlag::CopyAll {
                    let element_list: Vec<ElementId> = mg.grids[level].elements.clone();
                    for &elem in &element_list {
                        mg.seed_vector_classes(elem);
                    }
                } else {
                    mg.clear_vector_classes(level + 1);
                    let finer_list: Vec<ElementId> = mg.grids[level + 1].elements.clone();
                    for &elem in &finer_list {
                        if mg.elements[elem].class >= ElementClass::Green {
                            mg.seed_vector_classes(elem);
                        }
                    }
                    mg.propagate_vector_classes(level + 1);
                }
            }
        }

        if mg.top_level() > 0 && mg.grids[mg.top_level()].elements.is_empty() {
            mg.dispose_top_level()?;
        }

        mg.grids[0].changed = false;

        Ok(())
    }
}
