//! The element context: the nodes taking part in an element's subdivision.
//!
//! Positions 0..=3 hold the corner son-nodes, 4..=9 the midnodes of the
//! refined edges, 10 the center node. `gather` reads the context off the
//! current REFINE rule; `update` reconciles it with the MARK rule,
//! allocating and disposing nodes, vertices and the son-level edges
//! between them.

use crate::error::{GeometryError, RefineError, TopologyError};
use crate::math::shapes::global_to_local;
use crate::math::{Point3, Vector3};
use crate::refine::get_sons;
use crate::rules::{EdgeKind, RuleTable};
use crate::simplex::{
    CENTER_NODE, CORNERS_OF_ELEM, CORNER_OF_EDGE, EDGES_OF_ELEM, REF_COORD,
};
use crate::topology::{ElementId, MultiGrid, NodeId, VertexData, VertexSegment};

/// Number of probe subintervals of the boundary parameter scan.
const RESOLUTION: usize = 10;

/// The node slots of one element's subdivision.
#[derive(Debug, Clone, Default)]
pub(crate) struct ElementContext {
    slots: [Option<NodeId>; CENTER_NODE + 1],
}

impl ElementContext {
    pub(crate) fn get(&self, i: usize) -> Option<NodeId> {
        self.slots[i]
    }

    fn required(&self, i: usize) -> Result<NodeId, RefineError> {
        self.slots[i]
            .ok_or_else(|| TopologyError::InvalidTopology("context slot unexpectedly empty").into())
    }

    /// Assembles the context of an element from its current REFINE rule.
    pub(crate) fn gather(
        mg: &MultiGrid,
        rules: &RuleTable,
        elem: ElementId,
    ) -> Result<Self, RefineError> {
        let mut ctx = Self::default();
        let sons = get_sons(mg, rules, elem)?;

        for (i, &corner) in mg.elements[elem].corners.iter().enumerate() {
            ctx.slots[i] = mg.nodes[corner].son;
        }

        let rule = rules.rule(mg.elements[elem].refine);
        for e in 0..EDGES_OF_ELEM {
            ctx.slots[CORNERS_OF_ELEM + e] = if rule.pattern[e] {
                rule.son_and_node[e].map(|(s, c)| {
                    mg.elements[sons[usize::from(s)]].corners[usize::from(c)]
                })
            } else {
                None
            };
        }

        ctx.slots[CENTER_NODE] = rule.son_and_node[EDGES_OF_ELEM]
            .map(|(s, c)| mg.elements[sons[usize::from(s)]].corners[usize::from(c)]);

        Ok(ctx)
    }

    /// Reconciles the context with the element's MARK rule on the son
    /// level: allocates missing corner son-nodes, midnodes and the center
    /// node, disposes the ones the new rule no longer needs, and keeps the
    /// son-level corner edges consistent.
    pub(crate) fn update(
        &mut self,
        mg: &mut MultiGrid,
        rules: &RuleTable,
        elem: ElementId,
        fine_level: usize,
    ) -> Result<(), RefineError> {
        let mark = mg.elements[elem].mark;
        let corners = mg.elements[elem].corners;

        // corner son-nodes
        if mark > 0 {
            for (i, &corner) in corners.iter().enumerate() {
                if mg.nodes[corner].son.is_none() {
                    let vertex = mg.nodes[corner].vertex;
                    let son = mg.create_node(fine_level, vertex);
                    mg.nodes[son].father = Some(corner);
                    mg.nodes[corner].son = Some(son);
                    self.slots[i] = Some(son);
                }
            }
        }

        // midnodes and corner-corner edges per father edge
        for e in 0..EDGES_OF_ELEM {
            let c0 = CORNER_OF_EDGE[e][0];
            let c1 = CORNER_OF_EDGE[e][1];

            if rules.rule(mark).pattern[e] {
                // a surviving corner-corner edge is obsolete now
                if let (Some(a), Some(b)) = (self.slots[c0], self.slots[c1]) {
                    if let Some(edge) = mg.get_edge(a, b) {
                        mg.dispose_edge(edge);
                    }
                }

                if self.slots[CORNERS_OF_ELEM + e].is_some() {
                    continue;
                }
                let father_edge = mg
                    .get_edge(corners[c0], corners[c1])
                    .ok_or(TopologyError::MissingEdge)?;
                let mid = match mg.edges[father_edge].mid_node {
                    Some(mid) => mid,
                    None => {
                        let mid = create_mid_node(mg, elem, e, fine_level)?;
                        mg.edges[father_edge].mid_node = Some(mid);
                        let a = self.required(c0)?;
                        let b = self.required(c1)?;
                        let half = mg.create_edge(fine_level, a, mid);
                        mg.edges[half].kind = EdgeKind::HalfFather;
                        let half = mg.create_edge(fine_level, b, mid);
                        mg.edges[half].kind = EdgeKind::HalfFather;
                        mid
                    }
                };
                self.slots[CORNERS_OF_ELEM + e] = Some(mid);
            } else {
                // the new rule keeps this edge whole
                if mark > 0 {
                    let a = self.required(c0)?;
                    let b = self.required(c1)?;
                    mg.create_edge(fine_level, a, b);
                }

                let Some(mid) = self.slots[CORNERS_OF_ELEM + e] else {
                    continue;
                };

                // deletable once every remaining link goes to the endpoints
                let can_delete = mg.nodes[mid].links.iter().all(|&link| {
                    let other = mg.edges[link].other_end(mid);
                    Some(other) == self.slots[c0] || Some(other) == self.slots[c1]
                });

                if can_delete {
                    let vertex = mg.nodes[mid].vertex;
                    mg.dispose_node(mid);
                    mg.dispose_vertex(vertex);
                    if let Some(father_edge) = mg.get_edge(corners[c0], corners[c1]) {
                        mg.edges[father_edge].mid_node = None;
                    }
                    self.slots[CORNERS_OF_ELEM + e] = None;
                }
            }
        }

        // corner son-nodes of an unrefined element may go
        if mark == 0 {
            for (i, &corner) in corners.iter().enumerate() {
                if let Some(son) = self.slots[i] {
                    let needed_elsewhere = !mg.nodes[son].links.iter().all(|&link| {
                        let other = mg.edges[link].other_end(son);
                        self.slots[..CENTER_NODE].contains(&Some(other))
                    });
                    if !needed_elsewhere {
                        mg.dispose_node(son);
                        mg.nodes[corner].son = None;
                        self.slots[i] = None;
                    }
                }
            }
        }

        // center node
        let needs_center = rules.rule(mark).has_center_node();
        if let Some(center) = self.slots[CENTER_NODE] {
            if !needs_center {
                let vertex = mg.nodes[center].vertex;
                mg.dispose_node(center);
                mg.dispose_vertex(vertex);
                self.slots[CENTER_NODE] = None;
            }
        }
        if self.slots[CENTER_NODE].is_none() && needs_center {
            let positions = mg.corner_positions(elem);
            let mut pos = Vector3::zeros();
            let mut local = Vector3::zeros();
            for (i, p) in positions.iter().enumerate() {
                pos += p.coords;
                local += Vector3::new(REF_COORD[i][0], REF_COORD[i][1], REF_COORD[i][2]);
            }
            let mut vertex = VertexData::inner(Point3::from(pos * 0.25), local * 0.25);
            vertex.father = Some(elem);
            let vertex = mg.create_vertex(vertex);
            let center = mg.create_node(fine_level, vertex);
            self.slots[CENTER_NODE] = Some(center);
        }

        Ok(())
    }
}

/// Creates the midpoint node of a father edge, projecting onto the
/// boundary when both endpoints lie on common segments.
fn create_mid_node(
    mg: &mut MultiGrid,
    elem: ElementId,
    edge: usize,
    fine_level: usize,
) -> Result<NodeId, RefineError> {
    let ni0 = CORNER_OF_EDGE[edge][0];
    let ni1 = CORNER_OF_EDGE[edge][1];
    let corners = mg.elements[elem].corners;
    let v1 = mg.nodes[corners[ni0]].vertex;
    let v2 = mg.nodes[corners[ni1]].vertex;
    let max_par_dist = mg.format().max_par_dist;

    let x = nalgebra::center(&mg.vertices[v1].pos, &mg.vertices[v2].pos);

    let mut the_vertex = None;
    if mg.vertices[v1].is_boundary() && mg.vertices[v2].is_boundary() {
        // an edge is on the boundary iff some segment contains both ends
        let segs1 = mg.vertices[v1].segments.clone();
        let segs2 = mg.vertices[v2].segments.clone();
        for vs1 in &segs1 {
            for vs2 in &segs2 {
                if vs1.segment != vs2.segment {
                    continue;
                }
                let vertex =
                    *the_vertex.get_or_insert_with(|| {
                        mg.create_vertex(VertexData::boundary(x, Vec::new()))
                    });

                // probe the parameter midpoint first
                let mut lambda = (vs1.lambda + vs2.lambda) * 0.5;
                let mut ropt = mg.segment(vs1.segment).position(lambda);
                let mut smin = (x - ropt).norm();

                if smin > max_par_dist {
                    // coarse linear scan between the endpoint parameters
                    let dl = (vs2.lambda - vs1.lambda) / RESOLUTION as f64;
                    let mut l = vs1.lambda;
                    for _ in 0..=RESOLUTION {
                        let r = mg.segment(vs1.segment).position(l);
                        let s = (x - r).norm();
                        if s < smin {
                            smin = s;
                            lambda = l;
                            ropt = r;
                        }
                        l += dl;
                    }
                }

                mg.vertices[vertex].segments.push(VertexSegment {
                    segment: vs1.segment,
                    lambda,
                });

                if mg.vertices[vertex].segments.len() == 1 {
                    mg.vertices[vertex].pos = ropt;
                    mg.vertices[vertex].moved = smin > max_par_dist;
                } else if (mg.vertices[vertex].pos - ropt).norm() > max_par_dist {
                    mg.dispose_vertex(vertex);
                    return Err(GeometryError::InconsistentSegments.into());
                }
            }
        }
    }

    let vertex = match the_vertex {
        Some(v) => v,
        None => mg.create_vertex(VertexData::inner(x, Vector3::zeros())),
    };
    mg.vertices[vertex].father = Some(elem);
    mg.vertices[vertex].on_edge = Some(edge);

    let node = mg.create_node(fine_level, vertex);

    // local coordinates within the father
    if mg.vertices[vertex].moved {
        let positions = mg.corner_positions(elem);
        let pos = mg.vertices[vertex].pos;
        let local = global_to_local(&positions, &pos)?;
        mg.vertices[vertex].local = local;
    } else {
        mg.vertices[vertex].local = Vector3::new(
            0.5 * (REF_COORD[ni0][0] + REF_COORD[ni1][0]),
            0.5 * (REF_COORD[ni0][1] + REF_COORD[ni1][1]),
            0.5 * (REF_COORD[ni0][2] + REF_COORD[ni1][2]),
        );
    }

    Ok(node)
}
