//! Geometric queries on a single tetrahedron.

use crate::error::GeometryError;
use crate::math::{Matrix3, Point3, Vector3, TOLERANCE};
use crate::simplex::{
    CORNER_OF_EDGE, CORNER_OF_SIDE, EDGES_OF_CORNER, EDGE_OF_SIDE, OPPOSITE_CORNER,
    OPPOSITE_SIDE, SIDE_WITH_EDGE,
};

/// Transforms a world-space point into local coordinates of the tetrahedron
/// spanned by `corners`.
///
/// # Errors
///
/// Returns an error if the corner Jacobian is singular.
pub fn global_to_local(corners: &[Point3; 4], point: &Point3) -> Result<Vector3, GeometryError> {
    let m = Matrix3::from_columns(&[
        corners[1] - corners[0],
        corners[2] - corners[0],
        corners[3] - corners[0],
    ]);
    let inverse = m.try_inverse().ok_or(GeometryError::SingularJacobian)?;
    Ok(inverse * (point - corners[0]))
}

/// Inner unit normals on the four sides.
///
/// # Errors
///
/// Returns an error if a side is degenerate.
pub fn tetra_side_normals(corners: &[Point3; 4]) -> Result<[Vector3; 4], GeometryError> {
    let mut normals = [Vector3::zeros(); 4];
    for j in 0..4 {
        let k = OPPOSITE_SIDE[j];
        let a = corners[(j + 1) % 4] - corners[(j + 2) % 4];
        let b = corners[(j + 1) % 4] - corners[(j + 3) % 4];
        let mut n = a.cross(&b);
        let len = n.norm();
        if len < TOLERANCE {
            return Err(GeometryError::Degenerate("zero side normal"));
        }
        n /= len;
        let h = n.dot(&(corners[j] - corners[(j + 1) % 4]));
        if h.abs() < TOLERANCE {
            return Err(GeometryError::Degenerate("flat tetrahedron"));
        }
        if h < 0.0 {
            n = -n;
        }
        normals[k] = n;
    }
    Ok(normals)
}

/// Maximal dihedral side angle in degrees.
///
/// # Errors
///
/// Returns an error if the tetrahedron is degenerate.
pub fn tet_max_side_angle(corners: &[Point3; 4]) -> Result<f64, GeometryError> {
    let normals = tetra_side_normals(corners)?;
    let mut max = -1.0_f64;
    for sides in SIDE_WITH_EDGE {
        let help = normals[sides[0]].dot(&normals[sides[1]]);
        max = max.max(help);
    }
    max = max.min(1.0);
    Ok(180.0 / std::f64::consts::PI * (-max).acos())
}

/// Dihedral angle (radians) and length of each of the six edges.
///
/// # Errors
///
/// Returns an error if the tetrahedron is degenerate.
pub fn tet_angle_and_length(corners: &[Point3; 4]) -> Result<([f64; 6], [f64; 6]), GeometryError> {
    let mut edge = [Vector3::zeros(); 6];
    let mut length = [0.0_f64; 6];
    for j in 0..6 {
        edge[j] = corners[CORNER_OF_EDGE[j][1]] - corners[CORNER_OF_EDGE[j][0]];
        length[j] = edge[j].norm();
    }

    let mut normals = [Vector3::zeros(); 4];
    for j in 0..4 {
        let mut n = edge[EDGE_OF_SIDE[j][0]].cross(&edge[EDGE_OF_SIDE[j][1]]);
        let len = n.norm();
        if len < TOLERANCE {
            return Err(GeometryError::Degenerate("zero side normal"));
        }
        n /= len;
        let k = EDGES_OF_CORNER[OPPOSITE_CORNER[j]][0];
        let h = n.dot(&edge[k]);
        if h.abs() < TOLERANCE {
            return Err(GeometryError::Degenerate("flat tetrahedron"));
        }
        if (h < 0.0 && CORNER_OF_EDGE[k][1] == OPPOSITE_CORNER[j])
            || (h > 0.0 && CORNER_OF_EDGE[k][0] == OPPOSITE_CORNER[j])
        {
            n = -n;
        }
        normals[j] = n;
    }

    let mut angle = [0.0_f64; 6];
    for j in 0..6 {
        let mut a = normals[SIDE_WITH_EDGE[j][0]].dot(&normals[SIDE_WITH_EDGE[j][1]]);
        a = a.clamp(-1.0, 1.0);
        angle[j] = a.acos();
    }
    Ok((angle, length))
}

/// Signed volume of the tetrahedron.
#[must_use]
pub fn tet_volume(corners: &[Point3; 4]) -> f64 {
    let a = corners[1] - corners[0];
    let b = corners[2] - corners[0];
    let c = corners[3] - corners[0];
    a.cross(&b).dot(&c) / 6.0
}

/// Checks the corner orientation convention: corner 3 lies on the negative
/// side of the plane spanned by side 0.
#[must_use]
pub fn has_positive_parity(corners: &[Point3; 4]) -> bool {
    let a = corners[CORNER_OF_SIDE[0][1]] - corners[CORNER_OF_SIDE[0][0]];
    let b = corners[CORNER_OF_SIDE[0][2]] - corners[CORNER_OF_SIDE[0][0]];
    let c = corners[OPPOSITE_CORNER[0]] - corners[CORNER_OF_SIDE[0][0]];
    a.cross(&b).dot(&c) < 0.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_corners() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn reference_volume() {
        assert_relative_eq!(tet_volume(&reference_corners()).abs(), 1.0 / 6.0);
    }

    #[test]
    fn local_coordinates_of_corners() {
        let corners = reference_corners();
        let local = global_to_local(&corners, &Point3::new(0.25, 0.25, 0.25)).unwrap();
        assert_relative_eq!(local, Vector3::new(0.25, 0.25, 0.25), epsilon = 1e-12);
    }

    #[test]
    fn singular_jacobian_is_detected() {
        let corners = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ];
        assert!(global_to_local(&corners, &Point3::new(0.5, 0.0, 0.0)).is_err());
    }

    #[test]
    fn normals_point_inward() {
        let corners = reference_corners();
        let normals = tetra_side_normals(&corners).unwrap();
        let centroid = Point3::new(0.25, 0.25, 0.25);
        for (side, normal) in normals.iter().enumerate() {
            let on_side = corners[CORNER_OF_SIDE[side][0]];
            assert!(normal.dot(&(centroid - on_side)) > 0.0, "side {side}");
        }
    }

    #[test]
    fn max_angle_of_reference_tet() {
        let a = tet_max_side_angle(&reference_corners()).unwrap();
        assert!(a > 90.0 && a < 180.0);
    }
}
