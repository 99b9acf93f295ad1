//! Offline enumeration of the refinement rule base.
//!
//! For every 6-bit edge pattern the generator emits all subdivisions that
//! are compatible with the pattern: hand-derived prototypes for the
//! symmetric cases (three edges at a corner or on a side, four edges at a
//! corner or on a plane, five edges, full refinement) and recursive
//! edge-by-edge bisection for the rest. Prototypes are written for one
//! representative pattern and rotated into place; structurally equal rules
//! within one edge pattern are dropped, those differing only in the side
//! pattern survive as separate entries.

use log::debug;

use crate::rules::{
    EdgeDatum, EdgeKind, Rule, RuleTable, SonData, SonPath, FATHER_SIDE_OFFSET, MAX_NEW_EDGES,
    MAX_SONS, NEW_CORNERS, NRULES, PATTERN_COUNT,
};
use crate::simplex::{
    CONDENSED_EDGE_OF_SIDE, CORNERS_OF_ELEM, CORNER_OF_EDGE, EDGES_OF_ELEM, MID_NODE_OF_EDGE,
    SIDES_OF_ELEM, SIDE_WITH_EDGE, TRI_SECTION_EDGE,
};

/// Sentinel for a son face whose neighbor is not yet known.
const NOT_DONE: u8 = 0xFF;

const MAX_CORNERS: usize = 11;

/// Edge classification for every pair of the eleven numbered nodes.
///
/// `(kind, from, to, side)` with `from < to`; corner-corner pairs and
/// corner-midpoint pairs along a father edge carry kind `None` since they
/// are not interior edges of the subdivision.
#[rustfmt::skip]
const EDGE_DATA: [[EdgeDatum; MAX_CORNERS]; MAX_CORNERS] = {
    const fn e(kind: EdgeKind, from: u8, to: u8, side: u8) -> EdgeDatum {
        EdgeDatum { kind, from, to, side }
    }
    use EdgeKind::{Inner as I, None as N, Side as S};
    [
        [e(N,0,0,0), e(N,0,1,0), e(N,0,2,0), e(N,0,3,0), e(N,0,4,0), e(S,0,5,0), e(N,0,6,0), e(N,0,7,0), e(S,0,8,3), e(S,0,9,2), e(I,0,10,0)],
        [e(N,0,1,0), e(N,1,1,0), e(N,1,2,0), e(N,1,3,0), e(N,1,4,0), e(N,1,5,0), e(S,1,6,0), e(S,1,7,3), e(N,1,8,0), e(S,1,9,1), e(I,1,10,0)],
        [e(N,0,2,0), e(N,1,2,0), e(N,2,2,0), e(N,2,3,0), e(S,2,4,0), e(N,2,5,0), e(N,2,6,0), e(S,2,7,2), e(S,2,8,1), e(N,2,9,0), e(I,2,10,0)],
        [e(N,0,3,0), e(N,1,3,0), e(N,2,3,0), e(N,3,3,0), e(S,3,4,3), e(S,3,5,1), e(S,3,6,2), e(N,3,7,0), e(N,3,8,0), e(N,3,9,0), e(I,3,10,0)],
        [e(N,0,4,0), e(N,1,4,0), e(S,2,4,0), e(S,3,4,3), e(N,4,4,0), e(S,4,5,0), e(S,4,6,0), e(S,4,7,3), e(S,4,8,3), e(I,4,9,0), e(I,4,10,0)],
        [e(S,0,5,0), e(N,1,5,0), e(N,2,5,0), e(S,3,5,1), e(S,4,5,0), e(N,5,5,0), e(S,5,6,0), e(I,5,7,0), e(S,5,8,1), e(S,5,9,1), e(I,5,10,0)],
        [e(N,0,6,0), e(S,1,6,0), e(N,2,6,0), e(S,3,6,2), e(S,4,6,0), e(S,5,6,0), e(N,6,6,0), e(S,6,7,2), e(I,6,8,0), e(S,6,9,2), e(I,6,10,0)],
        [e(N,0,7,0), e(S,1,7,3), e(S,2,7,2), e(N,3,7,0), e(S,4,7,3), e(I,5,7,0), e(S,6,7,2), e(N,7,7,0), e(S,7,8,3), e(S,7,9,2), e(I,7,10,0)],
        [e(S,0,8,3), e(N,1,8,0), e(S,2,8,1), e(N,3,8,0), e(S,4,8,3), e(S,5,8,1), e(I,6,8,0), e(S,7,8,3), e(N,8,8,0), e(S,8,9,1), e(I,8,10,0)],
        [e(S,0,9,2), e(S,1,9,1), e(N,2,9,0), e(N,3,9,0), e(I,4,9,0), e(S,5,9,1), e(S,6,9,2), e(S,7,9,2), e(S,8,9,1), e(N,9,9,0), e(I,9,10,0)],
        [e(I,0,10,0), e(I,1,10,0), e(I,2,10,0), e(I,3,10,0), e(I,4,10,0), e(I,5,10,0), e(I,6,10,0), e(I,7,10,0), e(I,8,10,0), e(I,9,10,0), e(N,10,10,0)],
    ]
};

/// Corner triples spanning the faces of a son with ascending corners.
const CORNER_OF_SON_SIDE: [[usize; 3]; SIDES_OF_ELEM] =
    [[0, 1, 2], [1, 2, 3], [0, 2, 3], [0, 1, 3]];

/// Which of the eleven numbered nodes lie on each father side.
const IS_ON_SIDE: [[bool; MAX_CORNERS]; SIDES_OF_ELEM] = {
    const T: bool = true;
    const F: bool = false;
    [
        [T, T, T, F, T, T, T, F, F, F, F],
        [F, T, T, T, F, T, F, F, T, T, F],
        [T, F, T, T, F, F, T, T, F, T, F],
        [T, T, F, T, T, F, F, T, T, F, F],
    ]
};

/// Rotations of the node indices around the four tetrahedron axes.
const AX0_LEFT: [u8; MAX_CORNERS] = [0, 3, 1, 2, 7, 8, 4, 6, 9, 5, 10];
const AX0_RIGHT: [u8; MAX_CORNERS] = [0, 2, 3, 1, 6, 9, 7, 4, 5, 8, 10];
const AX1_LEFT: [u8; MAX_CORNERS] = [2, 1, 3, 0, 5, 8, 9, 6, 4, 7, 10];
const AX1_RIGHT: [u8; MAX_CORNERS] = [3, 1, 0, 2, 8, 4, 7, 9, 5, 6, 10];
const AX2_LEFT: [u8; MAX_CORNERS] = [3, 0, 2, 1, 7, 6, 9, 8, 4, 5, 10];
const AX2_RIGHT: [u8; MAX_CORNERS] = [1, 3, 2, 0, 8, 9, 5, 4, 7, 6, 10];
const AX3_LEFT: [u8; MAX_CORNERS] = [1, 2, 0, 3, 5, 6, 4, 8, 9, 7, 10];
const AX3_RIGHT: [u8; MAX_CORNERS] = [2, 0, 1, 3, 6, 4, 5, 9, 7, 8, 10];

const IDENTITY: Option<&[u8; MAX_CORNERS]> = None;

const fn son(c0: u8, c1: u8, c2: u8, c3: u8) -> SonData {
    SonData {
        corners: [c0, c1, c2, c3],
        nb: [NOT_DONE; 4],
        path: SonPath(0),
    }
}

struct Generator {
    rules: Vec<Rule>,
    pattern_to_rule: Vec<i16>,
    /// First rule emitted for the edge pattern under construction; rules
    /// before it never collide with the candidate.
    first_rule_with_edge_pattern: usize,
    output: bool,
}

/// Runs the generator over all edge patterns with `min..=max` refined edges.
#[must_use]
pub fn generate_rules(min_edges: usize, max_edges: usize, output: bool) -> RuleTable {
    let mut generator = Generator {
        rules: Vec::with_capacity(NRULES),
        pattern_to_rule: vec![-1; PATTERN_COUNT],
        first_rule_with_edge_pattern: 0,
        output,
    };

    for n_ref_edges in min_edges..=max_edges {
        for pattern in 0..(1_u8 << EDGES_OF_ELEM) {
            if u32::from(pattern).count_ones() as usize != n_ref_edges {
                continue;
            }
            generator.first_rule_with_edge_pattern = generator.rules.len();
            match n_ref_edges {
                0 => generator.make_rule0(),
                3 => {
                    if generator.make_rule3(pattern) {
                        generator.make_rule_by_bisection(pattern);
                    }
                }
                4 => {
                    if generator.make_rule4(pattern) {
                        generator.make_rule_by_bisection(pattern);
                    }
                }
                5 => generator.make_rule5(pattern),
                6 => generator.make_rule6(pattern),
                _ => generator.make_rule_by_bisection(pattern),
            }
        }
    }

    // sort each rule's edges for sides (the refiner relies on unused slots
    // coming last)
    for rule in generator.rules.iter_mut().skip(2) {
        rule.edges
            .sort_by_key(|e| (e.kind == EdgeKind::None, e.side));
    }

    debug!("{} rules generated", generator.rules.len());

    RuleTable::from_parts(generator.rules, generator.pattern_to_rule)
}

fn rotate_corners(rule: &mut Rule, replace_by: &[u8; MAX_CORNERS]) {
    for s in 0..rule.nsons {
        for corner in &mut rule.sons[s].corners {
            *corner = replace_by[usize::from(*corner)];
        }
    }
}

fn apply_rotations(rule: &mut Rule, rot0: Option<&[u8; MAX_CORNERS]>, rot1: Option<&[u8; MAX_CORNERS]>) {
    if let Some(rot) = rot0 {
        rotate_corners(rule, rot);
    }
    if let Some(rot) = rot1 {
        rotate_corners(rule, rot);
    }
}

fn fill_pattern(rule: &mut Rule, pattern: u8) {
    rule.pat = pattern;
    for j in 0..EDGES_OF_ELEM {
        rule.pattern[j] = pattern & (1 << j) != 0;
    }
}

fn new_edges_are_equal(a: &[EdgeDatum; MAX_NEW_EDGES], b: &[EdgeDatum; MAX_NEW_EDGES]) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| x.from == y.from && x.to == y.to)
}

fn side_with_all_corners(c0: u8, c1: u8, c2: u8) -> Option<usize> {
    (0..SIDES_OF_ELEM).find(|&side| {
        IS_ON_SIDE[side][usize::from(c0)]
            && IS_ON_SIDE[side][usize::from(c1)]
            && IS_ON_SIDE[side][usize::from(c2)]
    })
}

fn find_path_for_neighbours(rule: &mut Rule, my_id: usize, status: &mut [i8; MAX_SONS]) {
    const DONE: i8 = 0;
    const TOUCHED: i8 = 1;

    for i in 0..SIDES_OF_ELEM {
        let nb_id = rule.sons[my_id].nb[i];
        if nb_id < FATHER_SIDE_OFFSET {
            let nb_id = usize::from(nb_id);
            if status[nb_id] < DONE {
                let mut path = rule.sons[my_id].path;
                let depth = path.depth();
                path.set_step(depth, i);
                path.set_depth(depth + 1);
                rule.sons[nb_id].path = path;
                status[nb_id] = TOUCHED;
            }
        }
    }

    for nb_id in 1..rule.nsons {
        if status[nb_id] == TOUCHED {
            status[nb_id] = DONE;
            find_path_for_neighbours(rule, nb_id, status);
        }
    }
}

impl Generator {
    /// Completes the derived fields of a candidate rule and stores it unless
    /// a structurally equal rule already exists for the same edge pattern.
    /// Returns true when the rule was added.
    fn add_rule_if_new(&mut self, rule: &mut Rule) -> bool {
        assert!(self.rules.len() < NRULES);

        // collect the new inner edges (one or two endpoints above 3)
        let mut n_edges = 0;
        for s in 0..rule.nsons {
            for i in 0..CORNERS_OF_ELEM {
                for j in (i + 1)..CORNERS_OF_ELEM {
                    let datum = EDGE_DATA[usize::from(rule.sons[s].corners[i])]
                        [usize::from(rule.sons[s].corners[j])];
                    if datum.kind == EdgeKind::None {
                        continue;
                    }
                    let known = rule.edges[..n_edges]
                        .iter()
                        .any(|e| e.from == datum.from && e.to == datum.to);
                    if !known {
                        assert!(n_edges < MAX_NEW_EDGES);
                        rule.edges[n_edges] = datum;
                        n_edges += 1;
                    }
                }
            }
        }

        // sort edges by endpoints so side patterns compare structurally
        rule.edges[..n_edges].sort_by_key(|e| (e.from, e.to));

        let already_there = self.rules[self.first_rule_with_edge_pattern..]
            .iter()
            .any(|r| new_edges_are_equal(&rule.edges, &r.edges));
        if already_there {
            return false;
        }

        // canonical corner order enables neighbor search by matching triples
        for s in 0..rule.nsons {
            rule.sons[s].corners.sort_unstable();
        }

        // fill the son neighbor fields
        for i in 0..rule.nsons {
            for side_i in 0..SIDES_OF_ELEM {
                if rule.sons[i].nb[side_i] != NOT_DONE {
                    continue;
                }

                let triple = CORNER_OF_SON_SIDE[side_i].map(|c| rule.sons[i].corners[c]);
                if let Some(father_side) = side_with_all_corners(triple[0], triple[1], triple[2]) {
                    rule.sons[i].nb[side_i] = FATHER_SIDE_OFFSET + father_side as u8;
                    continue;
                }

                'search: for j in (i + 1)..rule.nsons {
                    for side_j in 0..SIDES_OF_ELEM {
                        let other = CORNER_OF_SON_SIDE[side_j].map(|c| rule.sons[j].corners[c]);
                        if triple == other {
                            rule.sons[i].nb[side_i] = j as u8;
                            rule.sons[j].nb[side_j] = i as u8;
                            break 'search;
                        }
                    }
                }
            }
        }

        // clear the faces of unused son slots
        for s in rule.nsons..MAX_SONS {
            rule.sons[s].nb = [0; 4];
        }

        // locate every new corner in some son
        rule.son_and_node = [None; NEW_CORNERS];
        for new_corner in CORNERS_OF_ELEM..(CORNERS_OF_ELEM + NEW_CORNERS) {
            'sons: for s in 0..rule.nsons {
                for corner in 0..CORNERS_OF_ELEM {
                    if usize::from(rule.sons[s].corners[corner]) == new_corner {
                        rule.son_and_node[new_corner - CORNERS_OF_ELEM] =
                            Some((s as u8, corner as u8));
                        break 'sons;
                    }
                }
            }
        }

        // consistency: new corners in the sons indicate exactly the refined edges
        for e in 0..EDGES_OF_ELEM {
            if rule.son_and_node[e].is_none() {
                assert!(!rule.pattern[e]);
                assert!(rule.pat & (1 << e) == 0);
            } else {
                assert!(rule.pattern[e]);
                assert!(rule.pat & (1 << e) != 0);
            }
        }

        // derive the side pattern from the trisected sides
        let mut side_pattern = 0_u8;
        for side in 0..SIDES_OF_ELEM {
            let reduced = usize::from(rule.pat & CONDENSED_EDGE_OF_SIDE[side]);
            if TRI_SECTION_EDGE[reduced][0] < 0 {
                continue;
            }

            let mut inner = [EdgeDatum::default(); 2];
            let mut found = 0;
            for e in &rule.edges {
                if e.kind == EdgeKind::Side && usize::from(e.side) == side {
                    inner[found] = *e;
                    found += 1;
                }
            }
            assert!(found == 2);

            let shared = if inner[0].from == inner[1].from || inner[0].from == inner[1].to {
                inner[0].from
            } else if inner[0].to == inner[1].from || inner[0].to == inner[1].to {
                inner[0].to
            } else {
                unreachable!("side inner edges do not meet");
            };
            let the_edge = i8::try_from(usize::from(shared) - CORNERS_OF_ELEM).unwrap_or(-1);

            let side_bit = if TRI_SECTION_EDGE[reduced][0] == the_edge {
                0
            } else if TRI_SECTION_EDGE[reduced][1] == the_edge {
                1
            } else {
                unreachable!("trisection midpoint not in table");
            };
            if side_bit != 0 {
                side_pattern |= 1 << side;
            }

            if self.output {
                debug!("trisection side is {side}, edge {the_edge}");
            }
        }

        // paths from son 0 to every other son
        let mut status = [0_i8; MAX_SONS];
        for s in 1..rule.nsons {
            status[s] = -1;
        }
        find_path_for_neighbours(rule, 0, &mut status);

        let key = usize::from(rule.pat) | (usize::from(side_pattern) << EDGES_OF_ELEM);
        self.pattern_to_rule[key] = self.rules.len() as i16;
        self.rules.push(rule.clone());
        true
    }

    fn bisect_son(
        sons: &mut [SonData; MAX_SONS],
        the_son: usize,
        corner0_id: usize,
        corner1_id: usize,
        the_edge: usize,
        nsons: usize,
    ) {
        sons[nsons] = sons[the_son];
        sons[the_son].corners[corner0_id] = MID_NODE_OF_EDGE[the_edge] as u8;
        sons[nsons].corners[corner1_id] = MID_NODE_OF_EDGE[the_edge] as u8;
    }

    /// Recursively bisects every edge still set in `edge_pattern`, visiting
    /// all bisection orders; each exhausted order yields one candidate rule.
    fn bisect_edge(&mut self, edge_pattern: &mut [bool; EDGES_OF_ELEM], rule: &Rule) {
        let mut n_edges = 0;
        for the_edge in 0..EDGES_OF_ELEM {
            if !edge_pattern[the_edge] {
                continue;
            }
            n_edges += 1;

            if self.output {
                debug!("refining edge {the_edge}");
            }

            let mut new_rule = rule.clone();

            let c0 = CORNER_OF_EDGE[the_edge][0] as u8;
            let c1 = CORNER_OF_EDGE[the_edge][1] as u8;
            let mut found: Vec<(usize, usize, usize)> = Vec::with_capacity(2);
            for s in 0..new_rule.nsons {
                for i in 0..CORNERS_OF_ELEM {
                    if new_rule.sons[s].corners[i] != c0 {
                        continue;
                    }
                    for j in 0..CORNERS_OF_ELEM {
                        if new_rule.sons[s].corners[j] == c1 {
                            found.push((s, i, j));
                        }
                    }
                }
            }
            assert!(found.len() == 1 || found.len() == 2);

            for &(s, i, j) in found.iter().rev() {
                let nsons = new_rule.nsons;
                Self::bisect_son(&mut new_rule.sons, s, i, j, the_edge, nsons);
                new_rule.nsons += 1;
            }

            edge_pattern[the_edge] = false;
            self.bisect_edge(edge_pattern, &new_rule);
            edge_pattern[the_edge] = true;
        }

        if n_edges == 0 {
            let mut rule = rule.clone();
            self.add_rule_if_new(&mut rule);
        }
    }

    /// Rules refining 1 or 2 edges and the side-pattern variants of the
    /// mixed 3- and 4-edge patterns, by recursive bisection of the father.
    fn make_rule_by_bisection(&mut self, pattern: u8) {
        let mut rule = Rule::default();
        rule.nsons = 1;
        rule.sons[0] = son(0, 1, 2, 3);
        fill_pattern(&mut rule, pattern);

        let mut edge_pattern = rule.pattern;

        // trapezoid count for the audit: sides with exactly two refined edges
        let mut ref_edges_per_side = [0_usize; SIDES_OF_ELEM];
        for (e, &set) in edge_pattern.iter().enumerate() {
            if set {
                ref_edges_per_side[SIDE_WITH_EDGE[e][0]] += 1;
                ref_edges_per_side[SIDE_WITH_EDGE[e][1]] += 1;
            }
        }
        let n_trapezoid = ref_edges_per_side.iter().filter(|&&n| n == 2).count();
        debug!(
            "pattern {pattern:#04x}: rule by bisection, {} side patterns",
            1 << n_trapezoid
        );

        self.bisect_edge(&mut edge_pattern, &rule);
    }

    /// The empty pattern: the no-refinement rule and the copy rule.
    fn make_rule0(&mut self) {
        debug!("pattern 0x00: no-refinement and copy rules");

        let no_ref_rule = Rule::default();
        self.pattern_to_rule[usize::from(no_ref_rule.pat)] = self.rules.len() as i16;
        self.rules.push(no_ref_rule);

        let mut copy_rule = Rule::default();
        copy_rule.nsons = 1;
        copy_rule.sons[0] = SonData {
            corners: [0, 1, 2, 3],
            nb: [
                FATHER_SIDE_OFFSET,
                FATHER_SIDE_OFFSET + 1,
                FATHER_SIDE_OFFSET + 2,
                FATHER_SIDE_OFFSET + 3,
            ],
            path: SonPath(0),
        };
        self.rules.push(copy_rule);
    }

    /// Three refined edges meeting at a corner (center-node prototypes) or
    /// lying on one side. Returns true when bisection variants are needed.
    fn make_rule3(&mut self, pattern: u8) -> bool {
        const CORNER_PROTOTYPE: [[SonData; 9]; 2] = [
            [
                son(0, 4, 6, 7),
                son(4, 6, 7, 10),
                son(1, 2, 3, 10),
                son(1, 3, 4, 10),
                son(3, 4, 7, 10),
                son(1, 2, 6, 10),
                son(1, 4, 6, 10),
                son(2, 6, 7, 10),
                son(2, 3, 7, 10),
            ],
            [
                son(0, 4, 6, 7),
                son(4, 6, 7, 10),
                son(1, 2, 3, 10),
                son(1, 3, 7, 10),
                son(1, 4, 7, 10),
                son(1, 2, 4, 10),
                son(2, 4, 6, 10),
                son(2, 3, 6, 10),
                son(3, 6, 7, 10),
            ],
        ];
        const SIDE_PROTOTYPE: [SonData; 4] = [
            son(0, 4, 2, 7),
            son(1, 4, 2, 8),
            son(4, 2, 7, 8),
            son(7, 8, 2, 3),
        ];

        enum Kind {
            Corner,
            Side,
        }

        let (rot, kind) = match pattern {
            // the edges to be refined share one corner
            0x0D => (IDENTITY, Kind::Corner),
            0x13 => (Some(&AX3_LEFT), Kind::Corner),
            0x26 => (Some(&AX3_RIGHT), Kind::Corner),
            0x38 => (Some(&AX1_RIGHT), Kind::Corner),
            // the edges to be refined lie on one side
            0x07 => (Some(&AX1_LEFT), Kind::Side),
            0x32 => (Some(&AX3_LEFT), Kind::Side),
            0x2C => (Some(&AX3_RIGHT), Kind::Side),
            0x19 => (IDENTITY, Kind::Side),
            _ => return true,
        };

        match kind {
            Kind::Corner => {
                debug!("pattern {pattern:#04x}: 3 edges at one corner, 2 rules with center node");
                for proto in &CORNER_PROTOTYPE {
                    let mut rule = Rule::default();
                    rule.nsons = proto.len();
                    rule.sons[..proto.len()].copy_from_slice(proto);
                    apply_rotations(&mut rule, rot, IDENTITY);
                    fill_pattern(&mut rule, pattern);
                    if !self.add_rule_if_new(&mut rule) {
                        debug!("make_rule3: already there");
                    }
                }
                true
            }
            Kind::Side => {
                debug!("pattern {pattern:#04x}: 3 edges on one side, 1 rule");
                let mut rule = Rule::default();
                rule.nsons = SIDE_PROTOTYPE.len();
                rule.sons[..SIDE_PROTOTYPE.len()].copy_from_slice(&SIDE_PROTOTYPE);
                apply_rotations(&mut rule, rot, IDENTITY);
                fill_pattern(&mut rule, pattern);
                if !self.add_rule_if_new(&mut rule) {
                    debug!("make_rule3: already there");
                }
                false
            }
        }
    }

    /// Four refined edges: three at a corner plus one extra, or four on a
    /// "plane". Returns true when bisection variants are needed.
    fn make_rule4(&mut self, pattern: u8) -> bool {
        const CORNER_PROTOTYPE: [[SonData; 6]; 4] = [
            [
                son(0, 4, 6, 7),
                son(5, 4, 6, 7),
                son(3, 4, 7, 5),
                son(3, 4, 1, 5),
                son(6, 3, 7, 5),
                son(6, 3, 2, 5),
            ],
            [
                son(0, 4, 6, 7),
                son(5, 4, 6, 7),
                son(3, 4, 7, 5),
                son(3, 4, 1, 5),
                son(2, 7, 3, 5),
                son(2, 7, 6, 5),
            ],
            [
                son(0, 4, 6, 7),
                son(5, 4, 6, 7),
                son(1, 7, 4, 5),
                son(1, 7, 3, 5),
                son(2, 7, 3, 5),
                son(2, 7, 6, 5),
            ],
            [
                son(0, 4, 6, 7),
                son(5, 4, 6, 7),
                son(1, 7, 4, 5),
                son(1, 7, 3, 5),
                son(6, 3, 7, 5),
                son(6, 3, 2, 5),
            ],
        ];
        const PLANE_PROTOTYPE: [[SonData; 12]; 2] = [
            [
                son(1, 8, 5, 10),
                son(1, 8, 7, 10),
                son(0, 6, 5, 10),
                son(0, 6, 7, 10),
                son(0, 1, 5, 10),
                son(0, 1, 7, 10),
                son(2, 5, 6, 10),
                son(2, 5, 8, 10),
                son(3, 7, 6, 10),
                son(3, 7, 8, 10),
                son(3, 2, 8, 10),
                son(3, 2, 6, 10),
            ],
            [
                son(1, 5, 6, 10),
                son(1, 5, 8, 10),
                son(0, 7, 6, 10),
                son(0, 7, 8, 10),
                son(0, 1, 6, 10),
                son(0, 1, 8, 10),
                son(2, 6, 5, 10),
                son(2, 6, 7, 10),
                son(3, 8, 5, 10),
                son(3, 8, 7, 10),
                son(2, 3, 5, 10),
                son(2, 3, 7, 10),
            ],
        ];

        enum Kind {
            Corner,
            Plane,
        }

        let (rot0, rot1, kind): (Option<&[u8; MAX_CORNERS]>, Option<&[u8; MAX_CORNERS]>, Kind) =
            if pattern & 0x0D == 0x0D {
                match pattern & !0x0D {
                    0x02 => (IDENTITY, IDENTITY, Kind::Corner),
                    0x10 => (IDENTITY, Some(&AX0_LEFT), Kind::Corner),
                    0x20 => (IDENTITY, Some(&AX0_RIGHT), Kind::Corner),
                    _ => unreachable!("not a corner-4 pattern"),
                }
            } else if pattern & 0x13 == 0x13 {
                match pattern & !0x13 {
                    0x04 => (Some(&AX3_LEFT), IDENTITY, Kind::Corner),
                    0x08 => (Some(&AX3_LEFT), Some(&AX1_RIGHT), Kind::Corner),
                    0x20 => (Some(&AX3_LEFT), Some(&AX1_LEFT), Kind::Corner),
                    _ => unreachable!("not a corner-4 pattern"),
                }
            } else if pattern & 0x26 == 0x26 {
                match pattern & !0x26 {
                    0x01 => (Some(&AX3_RIGHT), IDENTITY, Kind::Corner),
                    0x08 => (Some(&AX3_RIGHT), Some(&AX2_LEFT), Kind::Corner),
                    0x10 => (Some(&AX3_RIGHT), Some(&AX2_RIGHT), Kind::Corner),
                    _ => unreachable!("not a corner-4 pattern"),
                }
            } else if pattern & 0x38 == 0x38 {
                match pattern & !0x38 {
                    0x01 => (Some(&AX1_RIGHT), IDENTITY, Kind::Corner),
                    0x02 => (Some(&AX1_RIGHT), Some(&AX3_LEFT), Kind::Corner),
                    0x04 => (Some(&AX1_RIGHT), Some(&AX3_RIGHT), Kind::Corner),
                    _ => unreachable!("not a corner-4 pattern"),
                }
            } else if pattern == 0x1E {
                (IDENTITY, IDENTITY, Kind::Plane)
            } else if pattern == 0x35 {
                (Some(&AX3_LEFT), IDENTITY, Kind::Plane)
            } else if pattern == 0x2B {
                (Some(&AX3_RIGHT), IDENTITY, Kind::Plane)
            } else {
                unreachable!("4-edge pattern is neither corner nor plane");
            };

        match kind {
            Kind::Corner => {
                debug!("pattern {pattern:#04x}: 3 edges at one corner plus one, 4 rules");
                for proto in &CORNER_PROTOTYPE {
                    let mut rule = Rule::default();
                    rule.nsons = proto.len();
                    rule.sons[..proto.len()].copy_from_slice(proto);
                    apply_rotations(&mut rule, rot0, rot1);
                    fill_pattern(&mut rule, pattern);
                    if !self.add_rule_if_new(&mut rule) {
                        debug!("make_rule4: already there");
                    }
                }
                false
            }
            Kind::Plane => {
                debug!("pattern {pattern:#04x}: 4 edges on a plane, 2 rules");
                for proto in &PLANE_PROTOTYPE {
                    let mut rule = Rule::default();
                    rule.nsons = proto.len();
                    rule.sons[..proto.len()].copy_from_slice(proto);
                    apply_rotations(&mut rule, rot0, IDENTITY);
                    fill_pattern(&mut rule, pattern);
                    if !self.add_rule_if_new(&mut rule) {
                        debug!("make_rule4: already there");
                    }
                }
                true
            }
        }
    }

    /// Five refined edges: four prototypes per pattern, the missing edge
    /// rotated onto edge 0.
    fn make_rule5(&mut self, pattern: u8) {
        const PROTOTYPE: [[SonData; 7]; 4] = [
            [
                son(3, 7, 8, 9),
                son(2, 9, 6, 5),
                son(6, 7, 8, 9),
                son(5, 6, 8, 9),
                son(0, 6, 7, 8),
                son(0, 6, 5, 8),
                son(0, 1, 5, 8),
            ],
            [
                son(3, 7, 8, 9),
                son(2, 9, 6, 5),
                son(6, 7, 8, 9),
                son(5, 6, 8, 9),
                son(1, 6, 8, 5),
                son(1, 6, 8, 7),
                son(0, 1, 6, 7),
            ],
            [
                son(3, 7, 8, 9),
                son(2, 9, 6, 5),
                son(6, 7, 8, 9),
                son(5, 6, 8, 9),
                son(1, 6, 8, 5),
                son(0, 1, 6, 8),
                son(0, 7, 6, 8),
            ],
            [
                son(3, 7, 8, 9),
                son(2, 9, 6, 5),
                son(9, 7, 5, 8),
                son(9, 7, 5, 6),
                son(0, 7, 6, 5),
                son(0, 1, 7, 5),
                son(1, 7, 5, 8),
            ],
        ];

        debug!("pattern {pattern:#04x}: 5 edges, 4 rules");

        let missing = !pattern & 0x3F;
        let (rot0, rot1): (Option<&[u8; MAX_CORNERS]>, Option<&[u8; MAX_CORNERS]>) = match missing {
            0x01 => (IDENTITY, IDENTITY),
            0x02 => (Some(&AX3_LEFT), IDENTITY),
            0x04 => (Some(&AX3_RIGHT), IDENTITY),
            0x08 => (Some(&AX2_LEFT), IDENTITY),
            0x10 => (Some(&AX2_RIGHT), IDENTITY),
            0x20 => (Some(&AX2_LEFT), Some(&AX1_RIGHT)),
            _ => unreachable!("not a 5-edge pattern"),
        };

        for proto in &PROTOTYPE {
            let mut rule = Rule::default();
            rule.nsons = proto.len();
            rule.sons[..proto.len()].copy_from_slice(proto);
            apply_rotations(&mut rule, rot0, rot1);
            fill_pattern(&mut rule, pattern);
            if !self.add_rule_if_new(&mut rule) {
                debug!("make_rule5: already there");
            }
        }
    }

    /// Full refinement: three variants differing by the interior edge that
    /// slices the central octahedron.
    fn make_rule6(&mut self, pattern: u8) {
        const PROTOTYPE: [SonData; 8] = [
            son(0, 4, 6, 7),
            son(4, 1, 5, 8),
            son(6, 5, 2, 9),
            son(7, 8, 9, 3),
            son(4, 6, 7, 8),
            son(4, 6, 5, 8),
            son(6, 5, 8, 9),
            son(6, 7, 8, 9),
        ];

        debug!("pattern {pattern:#04x}: full refinement, 3 rules");

        // interior edge mid(E2)-mid(E4)
        let mut rule = Rule::default();
        rule.nsons = PROTOTYPE.len();
        rule.sons[..PROTOTYPE.len()].copy_from_slice(&PROTOTYPE);
        fill_pattern(&mut rule, pattern);
        self.add_rule_if_new(&mut rule);

        // interior edge mid(E0)-mid(E5)
        let mut rule = Rule::default();
        rule.nsons = PROTOTYPE.len();
        rule.sons[..PROTOTYPE.len()].copy_from_slice(&PROTOTYPE);
        rotate_corners(&mut rule, &AX1_LEFT);
        fill_pattern(&mut rule, pattern);
        self.first_rule_with_edge_pattern = self.rules.len();
        self.add_rule_if_new(&mut rule);

        // interior edge mid(E1)-mid(E3)
        let mut rule = Rule::default();
        rule.nsons = PROTOTYPE.len();
        rule.sons[..PROTOTYPE.len()].copy_from_slice(&PROTOTYPE);
        rotate_corners(&mut rule, &AX1_RIGHT);
        fill_pattern(&mut rule, pattern);
        self.first_rule_with_edge_pattern = self.rules.len();
        self.add_rule_if_new(&mut rule);

        // the full-refinement marker resolves to the first variant
        self.pattern_to_rule[usize::from(pattern)] = (self.rules.len() - 3) as i16;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::shapes::tet_volume;
    use crate::math::Point3;
    use crate::rules::{COPY_REF_RULE, NO_REF_RULE};
    use crate::simplex::REF_COORD;
    use approx::assert_relative_eq;

    fn node_position(index: usize) -> Point3 {
        let corner = |c: usize| Point3::new(REF_COORD[c][0], REF_COORD[c][1], REF_COORD[c][2]);
        match index {
            c @ 0..=3 => corner(c),
            m @ 4..=9 => {
                let e = m - 4;
                nalgebra::center(
                    &corner(CORNER_OF_EDGE[e][0]),
                    &corner(CORNER_OF_EDGE[e][1]),
                )
            }
            10 => Point3::new(0.25, 0.25, 0.25),
            _ => unreachable!(),
        }
    }

    #[test]
    fn full_base_has_the_expected_counts() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        assert_eq!(table.len(), NRULES);
        assert_eq!(table.pattern_map().len(), PATTERN_COUNT);
        assert_eq!(table.rule(NO_REF_RULE).nsons, 0);
        assert_eq!(table.rule(COPY_REF_RULE).nsons, 1);
    }

    #[test]
    fn every_mapped_pattern_resolves_to_its_own_rule() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        for edge_pattern in 0..64_u8 {
            if let Some(id) = table.lookup(edge_pattern, 0) {
                assert_eq!(table.rule(id).pat, edge_pattern, "pattern {edge_pattern:#04x}");
            }
        }
        // every 6-bit pattern without side ambiguity is decodable
        for edge_pattern in 0..64_u8 {
            assert!(table.lookup(edge_pattern, 0).is_some(), "{edge_pattern:#04x}");
        }
    }

    #[test]
    fn sons_partition_the_reference_tetrahedron() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        let father = [
            node_position(0),
            node_position(1),
            node_position(2),
            node_position(3),
        ];
        let father_volume = tet_volume(&father).abs();

        for (id, rule) in table.rules().iter().enumerate().skip(1) {
            let mut sum = 0.0;
            for s in 0..rule.nsons {
                let corners = rule.sons[s].corners.map(|c| node_position(usize::from(c)));
                let v = tet_volume(&corners).abs();
                assert!(v > 1e-9, "rule {id} son {s} is degenerate");
                sum += v;
            }
            assert_relative_eq!(sum, father_volume, epsilon = 1e-12);
        }
    }

    #[test]
    fn son_and_node_covers_exactly_the_refined_edges() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        for (id, rule) in table.rules().iter().enumerate().skip(2) {
            for e in 0..EDGES_OF_ELEM {
                assert_eq!(
                    rule.pattern[e],
                    rule.son_and_node[e].is_some(),
                    "rule {id} edge {e}"
                );
                if let Some((s, c)) = rule.son_and_node[e] {
                    assert_eq!(
                        usize::from(rule.sons[usize::from(s)].corners[usize::from(c)]),
                        CORNERS_OF_ELEM + e
                    );
                }
            }
        }
    }

    #[test]
    fn son_neighbors_are_symmetric() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        for (id, rule) in table.rules().iter().enumerate() {
            for s in 0..rule.nsons {
                for face in 0..SIDES_OF_ELEM {
                    let nb = rule.sons[s].nb[face];
                    if nb >= FATHER_SIDE_OFFSET {
                        assert!(nb < FATHER_SIDE_OFFSET + 4, "rule {id}");
                        continue;
                    }
                    let nb = usize::from(nb);
                    assert!(nb < rule.nsons, "rule {id}");
                    let reciprocal = (0..SIDES_OF_ELEM)
                        .any(|f| usize::from(rule.sons[nb].nb[f]) == s);
                    assert!(reciprocal, "rule {id}: son {s} face {face}");
                }
            }
        }
    }

    #[test]
    fn paths_reach_every_son() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        for (id, rule) in table.rules().iter().enumerate() {
            for s in 1..rule.nsons {
                let path = rule.sons[s].path;
                let mut at = 0_usize;
                for step in 0..path.depth() {
                    let face = path.step(step);
                    let nb = rule.sons[at].nb[face];
                    assert!(nb < FATHER_SIDE_OFFSET, "rule {id}: path leaves the father");
                    at = usize::from(nb);
                }
                assert_eq!(at, s, "rule {id}: path to son {s}");
            }
        }
    }

    #[test]
    fn full_rule_variants_have_eight_sons_each() {
        let table = generate_rules(0, EDGES_OF_ELEM, false);
        let full = table.full_rule();
        for id in [
            table.full_rule_0_5(),
            table.full_rule_1_3(),
            table.full_rule_2_4(),
        ] {
            assert_eq!(table.rule(id).nsons, 8);
            assert_eq!(table.rule(id).pat, 0x3F);
            assert!(id >= full && id < full + 3);
        }
    }
}
