//! Best-full-refrule policies.
//!
//! Full refinement leaves a choice: the central octahedron can be sliced
//! along any of the three diagonals between midpoints of opposite edges.
//! A policy picks the variant from the father's corner positions alone.

use log::debug;

use crate::error::ConfigError;
use crate::math::shapes::{tet_angle_and_length, tet_max_side_angle};
use crate::math::{Point3, Vector3};
use crate::simplex::{CORNER_OF_EDGE, EDGES_OF_ELEM, OPPOSITE_EDGE, SIDE_EDGES_OF_EDGE};

/// Which diagonal of the octahedron the full-refinement rule uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullRuleVariant {
    /// mid(E0)-mid(E5)
    Mid05,
    /// mid(E1)-mid(E3)
    Mid13,
    /// mid(E2)-mid(E4)
    Mid24,
}

impl FullRuleVariant {
    fn from_index(i: usize) -> Self {
        match i {
            0 => Self::Mid05,
            1 => Self::Mid13,
            _ => Self::Mid24,
        }
    }
}

/// The built-in policies choosing among the full-refinement variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullRulePolicy {
    /// Minimize the length of the interior edge.
    #[default]
    ShortestInteriorEdge,
    /// Minimize the maximal side angle over the sons.
    MinimalSideAngle,
    /// Minimize the obtuse-angle cotangent sum (M-matrix friendliness).
    BestLaplace,
    /// Maximize perpendicularity of the interior edge to its opposite pair.
    MaxPerpendicular,
    /// Maximize the minimal right angle between the opposite edge pair.
    MaxRightAngle,
    /// Maximize the area spanned by the opposite edge pair.
    MaxArea,
    /// Minimize the maximal obtuse off-diagonal entry.
    MinimalSideEntry,
    /// Align the interior edge with a global Y-axis preference.
    YAlignment,
}

impl FullRulePolicy {
    /// Resolves a policy by its registered name.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "shortestie" => Ok(Self::ShortestInteriorEdge),
            "minangle" => Ok(Self::MinimalSideAngle),
            "bestm" => Ok(Self::BestLaplace),
            "maxper" => Ok(Self::MaxPerpendicular),
            "mra" => Ok(Self::MaxRightAngle),
            "maxarea" => Ok(Self::MaxArea),
            "minentry" => Ok(Self::MinimalSideEntry),
            "y-align" => Ok(Self::YAlignment),
            _ => Err(ConfigError::UnknownPolicy(name.to_owned())),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ShortestInteriorEdge => "shortestie",
            Self::MinimalSideAngle => "minangle",
            Self::BestLaplace => "bestm",
            Self::MaxPerpendicular => "maxper",
            Self::MaxRightAngle => "mra",
            Self::MaxArea => "maxarea",
            Self::MinimalSideEntry => "minentry",
            Self::YAlignment => "y-align",
        }
    }

    /// Chooses the full-refinement variant for a father with the given
    /// corner positions.
    #[must_use]
    pub fn select(self, corners: &[Point3; 4]) -> FullRuleVariant {
        match self {
            Self::ShortestInteriorEdge => shortest_interior_edge(corners),
            Self::MinimalSideAngle => minimal_side_angle(corners),
            Self::BestLaplace => best_laplace(corners),
            Self::MaxPerpendicular => max_perpendicular(corners),
            Self::MaxRightAngle => max_right_angle(corners),
            Self::MaxArea => max_area(corners),
            Self::MinimalSideEntry => minimal_side_entry(corners),
            Self::YAlignment => y_alignment(corners),
        }
    }
}

fn edge_midpoints(corners: &[Point3; 4]) -> [Point3; EDGES_OF_ELEM] {
    let mut mid = [Point3::origin(); EDGES_OF_ELEM];
    for (e, m) in mid.iter_mut().enumerate() {
        *m = nalgebra::center(
            &corners[CORNER_OF_EDGE[e][0]],
            &corners[CORNER_OF_EDGE[e][1]],
        );
    }
    mid
}

fn interior_distances(mid: &[Point3; EDGES_OF_ELEM]) -> [f64; 3] {
    [
        (mid[0] - mid[5]).norm(),
        (mid[1] - mid[3]).norm(),
        (mid[2] - mid[4]).norm(),
    ]
}

fn shortest_interior_edge(corners: &[Point3; 4]) -> FullRuleVariant {
    let mid = edge_midpoints(corners);
    let [dist_0_5, dist_1_3, dist_2_4] = interior_distances(&mid);

    let mut flags = u8::from(dist_0_5 < dist_1_3);
    flags |= u8::from(dist_1_3 < dist_2_4) << 1;
    flags |= u8::from(dist_2_4 < dist_0_5) << 2;
    debug_assert!(flags != 7);

    match flags {
        0 | 1 | 3 => FullRuleVariant::Mid05,
        2 | 6 => FullRuleVariant::Mid13,
        _ => FullRuleVariant::Mid24,
    }
}

/// The two son tetrahedra spanned by the interior diagonal `i` and the
/// side-edge pair `k`.
fn diagonal_son(
    mid: &[Point3; EDGES_OF_ELEM],
    i: usize,
    j: usize,
    k: usize,
    around: usize,
) -> [Point3; 4] {
    [
        mid[SIDE_EDGES_OF_EDGE[around][k][0]],
        mid[SIDE_EDGES_OF_EDGE[around][k][1]],
        mid[i],
        mid[j],
    ]
}

fn minimal_side_angle(corners: &[Point3; 4]) -> FullRuleVariant {
    let mid = edge_midpoints(corners);

    let mut min = 190.0_f64;
    let mut imin = 0;
    for i in 0..3 {
        let j = OPPOSITE_EDGE[i];
        let mut max = 0.0_f64;
        for around in [i, j] {
            for k in 0..2 {
                let sub = diagonal_son(&mid, i, j, k, around);
                let Ok(angle) = tet_max_side_angle(&sub) else {
                    return FullRuleVariant::Mid05;
                };
                max = max.max(angle);
            }
        }
        if max < min {
            min = max;
            imin = i;
        }
    }
    FullRuleVariant::from_index(imin)
}

fn obtuse_cotangent_sum(sub: &[Point3; 4]) -> Option<f64> {
    let (angle, length) = tet_angle_and_length(sub).ok()?;
    let mut sum = 0.0;
    for l in 0..EDGES_OF_ELEM {
        if angle[l] > std::f64::consts::FRAC_PI_2 {
            sum += (length[l] * angle[l].cos() / angle[l].sin()).abs();
        }
    }
    Some(sum)
}

fn obtuse_cotangent_max(sub: &[Point3; 4]) -> Option<f64> {
    let (angle, length) = tet_angle_and_length(sub).ok()?;
    let mut max = 0.0_f64;
    for l in 0..EDGES_OF_ELEM {
        if angle[l] > std::f64::consts::FRAC_PI_2 {
            max = max.max((length[l] * angle[l].cos() / angle[l].sin()).abs());
        }
    }
    Some(max)
}

fn best_laplace(corners: &[Point3; 4]) -> FullRuleVariant {
    let mid = edge_midpoints(corners);

    let mut min = f64::MAX;
    let mut imin: i32 = -1;
    for i in 0..3 {
        let j = OPPOSITE_EDGE[i];
        let mut sum = 0.0;
        let mut degenerate = false;
        for around in [i, j] {
            for k in 0..2 {
                let sub = diagonal_son(&mid, i, j, k, around);
                match obtuse_cotangent_sum(&sub) {
                    Some(s) => sum += s,
                    None => degenerate = true,
                }
            }
        }
        if degenerate {
            return FullRuleVariant::Mid05;
        }
        if sum < min {
            min = sum;
            imin = i32::try_from(i).unwrap_or(-1);
        }
    }

    if imin < 0 {
        debug!("best_laplace: falling back to shortest interior edge");
        return shortest_interior_edge(corners);
    }
    #[allow(clippy::cast_sign_loss)]
    FullRuleVariant::from_index(imin as usize)
}

fn minimal_side_entry(corners: &[Point3; 4]) -> FullRuleVariant {
    let mid = edge_midpoints(corners);

    let mut min = f64::MAX;
    let mut imin: i32 = -1;
    for i in 0..3 {
        let j = OPPOSITE_EDGE[i];
        let mut max = 0.0_f64;
        let mut degenerate = false;
        for around in [i, j] {
            for k in 0..2 {
                let sub = diagonal_son(&mid, i, j, k, around);
                match obtuse_cotangent_max(&sub) {
                    Some(m) => max = max.max(m),
                    None => degenerate = true,
                }
            }
        }
        if degenerate {
            return FullRuleVariant::Mid05;
        }
        if max < min {
            min = max;
            imin = i32::try_from(i).unwrap_or(-1);
        }
    }

    if imin < 0 {
        debug!("minimal_side_entry: falling back to shortest interior edge");
        return shortest_interior_edge(corners);
    }
    #[allow(clippy::cast_sign_loss)]
    FullRuleVariant::from_index(imin as usize)
}

fn max_perpendicular(corners: &[Point3; 4]) -> FullRuleVariant {
    let mid = edge_midpoints(corners);

    let mut max = f64::MIN;
    let mut imin: i32 = -1;
    for i in 0..3 {
        let j = OPPOSITE_EDGE[i];
        let a = corners[CORNER_OF_EDGE[i][0]] - corners[CORNER_OF_EDGE[i][1]];
        let b = corners[CORNER_OF_EDGE[j][0]] - corners[CORNER_OF_EDGE[j][1]];
        let Some(c) = a.cross(&b).try_normalize(0.0) else {
            continue;
        };
        let Some(d) = (mid[i] - mid[j]).try_normalize(0.0) else {
            continue;
        };
        let sprd = d.dot(&c).abs();
        if sprd > max {
            max = sprd;
            imin = i32::try_from(i).unwrap_or(-1);
        }
    }

    if imin < 0 {
        debug!("max_perpendicular: falling back to shortest interior edge");
        return shortest_interior_edge(corners);
    }
    #[allow(clippy::cast_sign_loss)]
    FullRuleVariant::from_index(imin as usize)
}

fn max_right_angle(corners: &[Point3; 4]) -> FullRuleVariant {
    let mut min = f64::MAX;
    let mut imin: i32 = -1;
    for i in 0..3 {
        let j = OPPOSITE_EDGE[i];
        let Some(a) =
            (corners[CORNER_OF_EDGE[i][0]] - corners[CORNER_OF_EDGE[i][1]]).try_normalize(0.0)
        else {
            continue;
        };
        let Some(b) =
            (corners[CORNER_OF_EDGE[j][0]] - corners[CORNER_OF_EDGE[j][1]]).try_normalize(0.0)
        else {
            continue;
        };
        let sprd = a.dot(&b).abs();
        if sprd < min {
            min = sprd;
            imin = i32::try_from(i).unwrap_or(-1);
        }
    }

    if imin < 0 {
        debug!("max_right_angle: falling back to shortest interior edge");
        return shortest_interior_edge(corners);
    }
    #[allow(clippy::cast_sign_loss)]
    FullRuleVariant::from_index(imin as usize)
}

fn max_area(corners: &[Point3; 4]) -> FullRuleVariant {
    let mut max = f64::MIN;
    let mut imin: i32 = -1;
    for i in 0..3 {
        let j = OPPOSITE_EDGE[i];
        let a = corners[CORNER_OF_EDGE[i][0]] - corners[CORNER_OF_EDGE[i][1]];
        let b = corners[CORNER_OF_EDGE[j][0]] - corners[CORNER_OF_EDGE[j][1]];
        let norm = a.cross(&b).norm();
        if norm > max {
            max = norm;
            imin = i32::try_from(i).unwrap_or(-1);
        }
    }

    if imin < 0 {
        debug!("max_area: falling back to shortest interior edge");
        return shortest_interior_edge(corners);
    }
    #[allow(clippy::cast_sign_loss)]
    FullRuleVariant::from_index(imin as usize)
}

fn y_alignment(corners: &[Point3; 4]) -> FullRuleVariant {
    let mid = edge_midpoints(corners);
    let [dist_0_5, dist_1_3, dist_2_4] = interior_distances(&mid);

    let mut max = -1.0_f64;
    let mut imax = 0;
    for e in 0..EDGES_OF_ELEM {
        let help: Vector3 = corners[CORNER_OF_EDGE[e][0]] - corners[CORNER_OF_EDGE[e][1]];
        let help = help.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        let alignment = (help.y + help.z).abs();
        if alignment > max {
            imax = e;
            max = alignment;
        }
    }

    match imax {
        0 | 5 => {
            if dist_1_3 < dist_2_4 {
                FullRuleVariant::Mid13
            } else {
                FullRuleVariant::Mid24
            }
        }
        1 | 3 => {
            if dist_0_5 < dist_2_4 {
                FullRuleVariant::Mid05
            } else {
                FullRuleVariant::Mid24
            }
        }
        _ => {
            if dist_1_3 < dist_0_5 {
                FullRuleVariant::Mid13
            } else {
                FullRuleVariant::Mid05
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn reference_corners() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn reference_tet_tie_breaks_to_0_5() {
        // all three diagonals have length sqrt(2)/2, the first tested wins
        assert_eq!(
            FullRulePolicy::ShortestInteriorEdge.select(&reference_corners()),
            FullRuleVariant::Mid05
        );
    }

    #[test]
    fn stretched_tet_prefers_its_short_diagonal() {
        // pulling corner 3 far away lengthens every diagonal through the
        // midpoints of edges 3, 4 and 5 except the pair closest to the base
        let corners = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 8.0),
        ];
        let mid = edge_midpoints(&corners);
        let d = interior_distances(&mid);
        let best = shortest_interior_edge(&corners);
        let expected = if d[0] <= d[1] && d[0] <= d[2] {
            FullRuleVariant::Mid05
        } else if d[1] <= d[2] {
            FullRuleVariant::Mid13
        } else {
            FullRuleVariant::Mid24
        };
        assert_eq!(best, expected);
    }

    #[test]
    fn policies_resolve_by_name() {
        for name in [
            "shortestie",
            "minangle",
            "bestm",
            "maxper",
            "mra",
            "maxarea",
            "minentry",
            "y-align",
        ] {
            let policy = FullRulePolicy::by_name(name).unwrap();
            assert_eq!(policy.name(), name);
        }
        assert!(FullRulePolicy::by_name("fancy").is_err());
    }

    #[test]
    fn every_policy_returns_a_variant_on_the_reference_tet() {
        let corners = reference_corners();
        for policy in [
            FullRulePolicy::ShortestInteriorEdge,
            FullRulePolicy::MinimalSideAngle,
            FullRulePolicy::BestLaplace,
            FullRulePolicy::MaxPerpendicular,
            FullRulePolicy::MaxRightAngle,
            FullRulePolicy::MaxArea,
            FullRulePolicy::MinimalSideEntry,
            FullRulePolicy::YAlignment,
        ] {
            // no panic and a well-defined choice
            let _ = policy.select(&corners);
        }
    }
}
