//! Point correspondences between two calibrated views.

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// One scene point observed in two views.
///
/// Both observations are homogeneous normalized image coordinates (or bearing
/// vectors). With `X₂ = R X₁ + t` the epipolar constraint reads
/// `x2ᵀ E x1 = 0` for `E = [t]ₓR`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCorrespondence {
    /// Observation in the first view
    pub x1: Vector3<f64>,
    /// Observation in the second view
    pub x2: Vector3<f64>,
}

impl PointCorrespondence {
    pub fn new(x1: Vector3<f64>, x2: Vector3<f64>) -> Self {
        Self { x1, x2 }
    }

    /// Lift normalized image coordinates to the `z = 1` plane.
    pub fn from_normalized(p1: Vector2<f64>, p2: Vector2<f64>) -> Self {
        Self::new(p1.push(1.0), p2.push(1.0))
    }

    /// Build from bearing vectors, normalizing both to unit length.
    pub fn from_bearings(b1: Vector3<f64>, b2: Vector3<f64>) -> Self {
        Self::new(b1.normalize(), b2.normalize())
    }

    pub fn is_finite(&self) -> bool {
        self.x1.iter().chain(self.x2.iter()).all(|v| v.is_finite())
    }

    /// Algebraic epipolar residual `x2ᵀ E x1`.
    pub fn epipolar_residual(&self, e: &Matrix3<f64>) -> f64 {
        self.x2.dot(&(e * self.x1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_normalized_lifts_to_plane() {
        let c =
            PointCorrespondence::from_normalized(Vector2::new(0.1, -0.2), Vector2::new(0.3, 0.4));
        assert_eq!(c.x1, Vector3::new(0.1, -0.2, 1.0));
        assert_eq!(c.x2, Vector3::new(0.3, 0.4, 1.0));
    }

    #[test]
    fn test_from_bearings_normalizes() {
        let c = PointCorrespondence::from_bearings(
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(3.0, 4.0, 0.0),
        );
        assert!((c.x1.norm() - 1.0).abs() < 1e-15);
        assert!((c.x2.norm() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_is_finite() {
        let mut c = PointCorrespondence::new(Vector3::x(), Vector3::y());
        assert!(c.is_finite());
        c.x2.z = f64::NAN;
        assert!(!c.is_finite());
    }

    #[test]
    fn test_epipolar_residual() {
        let c = PointCorrespondence::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.5, 2.0));
        let e = Matrix3::new(1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 3.0, 0.0, 1.0);
        let expected = c.x2.transpose() * e * c.x1;
        assert!((c.epipolar_residual(&e) - expected[(0, 0)]).abs() < 1e-14);
    }
}
