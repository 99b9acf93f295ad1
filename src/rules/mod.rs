//! The refinement rule base.
//!
//! A rule describes one legal subdivision of a tetrahedron over the eleven
//! numbered nodes (4 corners, 6 edge midpoints, 1 center). The full base of
//! [`NRULES`] rules is produced offline by [`generate`] and addressed at
//! runtime through a dense pattern map indexed by
//! `edge_pattern | (side_pattern << 6)`.

pub mod generate;
pub mod io;

use crate::simplex::{CORNERS_OF_ELEM, EDGES_OF_ELEM, SIDES_OF_ELEM};

/// Index into the rule table.
pub type RuleId = usize;

/// The rule that leaves an element unrefined.
pub const NO_REF_RULE: RuleId = 0;

/// The rule that copies an element unchanged onto the next level.
pub const COPY_REF_RULE: RuleId = 1;

/// Total number of rules in a complete base.
pub const NRULES: usize = 242;

/// Maximal number of sons of a rule.
pub const MAX_SONS: usize = 12;

/// Maximal number of new interior edges of a rule.
pub const MAX_NEW_EDGES: usize = 16;

/// Midpoint nodes plus the center node.
pub const NEW_CORNERS: usize = 7;

/// Son neighbor values at or above this offset denote a father side.
pub const FATHER_SIDE_OFFSET: u8 = 20;

/// Number of entries of the pattern map: `1 << (6 + 4)`.
pub const PATTERN_COUNT: usize = 1 << (EDGES_OF_ELEM + SIDES_OF_ELEM);

/// Classification of an edge introduced by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeKind {
    /// Unused slot in the fixed-size edge list.
    #[default]
    None,
    /// Inner edge of the father (center node to a corner or midpoint diagonal).
    Inner,
    /// Inner edge of one father side.
    Side,
    /// Half of a bisected father edge.
    HalfFather,
    /// An edge of the father itself.
    Father,
}

impl EdgeKind {
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Inner),
            2 => Some(Self::Side),
            3 => Some(Self::HalfFather),
            4 => Some(Self::Father),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_raw(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Inner => 1,
            Self::Side => 2,
            Self::HalfFather => 3,
            Self::Father => 4,
        }
    }
}

/// One edge introduced by a rule, over node indices 0..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeDatum {
    pub kind: EdgeKind,
    pub from: u8,
    pub to: u8,
    /// The side this edge is interior to, for [`EdgeKind::Side`] edges.
    pub side: u8,
}

/// Packed neighbor walk from son 0 to another son.
///
/// Bits 28..32 hold the number of steps, bits `2n..2n+2` the face crossed
/// at step `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SonPath(pub u32);

impl SonPath {
    const DEPTH_SHIFT: u32 = 28;
    const DEPTH_MASK: u32 = 0xF000_0000;
    const STEP_MASK: u32 = 0x3;

    #[must_use]
    pub fn depth(self) -> usize {
        ((self.0 & Self::DEPTH_MASK) >> Self::DEPTH_SHIFT) as usize
    }

    pub fn set_depth(&mut self, depth: usize) {
        let depth = (depth as u32) << Self::DEPTH_SHIFT;
        self.0 = (self.0 & !Self::DEPTH_MASK) | (depth & Self::DEPTH_MASK);
    }

    #[must_use]
    pub fn step(self, n: usize) -> usize {
        ((self.0 >> (2 * n as u32)) & Self::STEP_MASK) as usize
    }

    pub fn set_step(&mut self, n: usize, side: usize) {
        let shift = 2 * n as u32;
        self.0 = (self.0 & !(Self::STEP_MASK << shift)) | (((side as u32) & Self::STEP_MASK) << shift);
    }
}

/// One son tetrahedron of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SonData {
    /// Node indices (0..=10) of the son corners, sorted ascending.
    pub corners: [u8; 4],
    /// Per face: sibling son index, or `FATHER_SIDE_OFFSET + father side`.
    pub nb: [u8; 4],
    /// Neighbor walk from son 0 to this son.
    pub path: SonPath,
}

/// A complete refinement recipe for one tetrahedron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub nsons: usize,
    /// Per father edge: is the edge bisected.
    pub pattern: [bool; EDGES_OF_ELEM],
    /// The pattern condensed into a 6-bit mask.
    pub pat: u8,
    /// For each new node 4..=10, the (son, local corner) where it is found.
    pub son_and_node: [Option<(u8, u8)>; NEW_CORNERS],
    /// New interior edges, type-`None` slots at the tail.
    pub edges: [EdgeDatum; MAX_NEW_EDGES],
    pub sons: [SonData; MAX_SONS],
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            nsons: 0,
            pattern: [false; EDGES_OF_ELEM],
            pat: 0,
            son_and_node: [None; NEW_CORNERS],
            edges: [EdgeDatum::default(); MAX_NEW_EDGES],
            sons: [SonData::default(); MAX_SONS],
        }
    }
}

impl Rule {
    /// Does this rule bisect father edge `e`.
    #[must_use]
    pub fn bisects_edge(&self, e: usize) -> bool {
        self.pattern[e]
    }

    /// Does this rule call for the interior center node.
    #[must_use]
    pub fn has_center_node(&self) -> bool {
        self.son_and_node[NEW_CORNERS - 1].is_some()
    }

    /// Interior edges of kind `Inner` or `Side`, skipping unused slots.
    pub fn interior_edges(&self) -> impl Iterator<Item = &EdgeDatum> {
        self.edges.iter().filter(|e| e.kind != EdgeKind::None)
    }
}

impl std::fmt::Display for Rule {
    /// Audit dump in the generator's historical layout.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "nsons {}; pattern ", self.nsons)?;
        for e in (0..EDGES_OF_ELEM).rev() {
            write!(f, "{}", u8::from(self.pattern[e]))?;
        }
        writeln!(f, "; pat {:#04x}", self.pat)?;

        write!(f, "edges: ")?;
        for (i, e) in self.edges.iter().enumerate() {
            if i == 8 {
                write!(f, "\n\t")?;
            }
            write!(f, "{{{},{},{},{}}}", e.kind.as_raw(), e.from, e.to, e.side)?;
        }
        writeln!(f)?;

        write!(f, "sons:  ")?;
        for (i, s) in self.sons.iter().enumerate() {
            if i == 6 {
                write!(f, "\n\t")?;
            }
            write!(
                f,
                "{{{{{},{},{},{}}}{{{},{},{},{}}}}}",
                s.corners[0], s.corners[1], s.corners[2], s.corners[3], s.nb[0], s.nb[1],
                s.nb[2], s.nb[3]
            )?;
        }
        writeln!(f)?;

        for s in 1..self.nsons {
            write!(f, "path to {s}: son0")?;
            let path = self.sons[s].path;
            for step in 0..path.depth() {
                write!(f, "-->nb{}", path.step(step))?;
            }
            writeln!(f, " ({} steps)", path.depth())?;
        }

        write!(f, "sonandnode:")?;
        for (i, entry) in self.son_and_node.iter().enumerate() {
            match entry {
                Some((s, c)) => write!(f, " {}->({s},{c})", i + CORNERS_OF_ELEM)?,
                None => write!(f, " {}->unused", i + CORNERS_OF_ELEM)?,
            }
        }
        writeln!(f)
    }
}

/// The runtime rule base: all rules plus the dense pattern map.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    /// `edge_pattern | (side_pattern << 6)` to rule index, -1 for unused.
    pattern_to_rule: Vec<i16>,
}

impl RuleTable {
    pub(crate) fn from_parts(rules: Vec<Rule>, pattern_to_rule: Vec<i16>) -> Self {
        debug_assert_eq!(pattern_to_rule.len(), PATTERN_COUNT);
        Self {
            rules,
            pattern_to_rule,
        }
    }

    /// Generates the complete rule base in process.
    #[must_use]
    pub fn generate() -> Self {
        generate::generate_rules(0, EDGES_OF_ELEM, false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn pattern_map(&self) -> &[i16] {
        &self.pattern_to_rule
    }

    /// Resolves a combined edge/side pattern to a rule.
    #[must_use]
    pub fn lookup(&self, edge_pattern: u8, side_pattern: u8) -> Option<RuleId> {
        let key = usize::from(edge_pattern) | (usize::from(side_pattern) << EDGES_OF_ELEM);
        let id = self.pattern_to_rule[key];
        usize::try_from(id).ok()
    }

    /// The full-refinement marker rule: `lookup(0b11_1111, 0)`.
    #[must_use]
    pub fn full_rule(&self) -> RuleId {
        self.lookup(0x3F, 0).unwrap_or(NO_REF_RULE)
    }

    /// Full refinement slicing the octahedron along mid(E0)-mid(E5).
    #[must_use]
    pub fn full_rule_0_5(&self) -> RuleId {
        self.full_rule() + 1
    }

    /// Full refinement slicing the octahedron along mid(E1)-mid(E3).
    #[must_use]
    pub fn full_rule_1_3(&self) -> RuleId {
        self.full_rule() + 2
    }

    /// Full refinement slicing the octahedron along mid(E2)-mid(E4).
    #[must_use]
    pub fn full_rule_2_4(&self) -> RuleId {
        self.full_rule()
    }
}
