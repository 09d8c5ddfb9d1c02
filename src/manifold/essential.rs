//! Conversions between essential matrices and relative poses.
//!
//! An essential matrix factors as `E = [t]ₓR`. Given `E`, the factorization
//! is unique only up to the sign of `t` and the "twisted pair" of rotations,
//! so four `(R, t)` candidates are generated from the SVD of `E`:
//!
//! ```text
//! E = U diag(σ, σ, 0) Vᵀ,   W = [[0, -1, 0], [1, 0, 0], [0, 0, 1]]
//! (UWVᵀ, +u₃), (UWVᵀ, -u₃), (UWᵀVᵀ, +u₃), (UWᵀVᵀ, -u₃)
//! ```
//!
//! The physically valid candidate is the one that places the observed points
//! in front of both cameras (cheirality).

use crate::core::correspondence::PointCorrespondence;
use crate::manifold::{ManifoldError, ManifoldResult, hat};
use nalgebra::{Matrix3, Vector3};
use tracing::warn;

/// Compose the essential matrix `E = [t]ₓR`.
pub fn compute_e_from_rt(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    hat(translation) * rotation
}

/// SVD of a 3×3 matrix with singular values sorted in descending order.
fn sorted_svd(m: &Matrix3<f64>) -> Option<(Matrix3<f64>, Vector3<f64>, Matrix3<f64>)> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let s = svd.singular_values;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));

    let sorted_u = Matrix3::from_columns(&order.map(|k| u.column(k)));
    let sorted_v_t = Matrix3::from_rows(&order.map(|k| v_t.row(k)));
    let sorted_s = Vector3::new(s[order[0]], s[order[1]], s[order[2]]);
    Some((sorted_u, sorted_s, sorted_v_t))
}

/// Project an arbitrary 3×3 matrix onto the set of essential matrices.
///
/// The nearest matrix in Frobenius norm with two equal singular values and a
/// zero third one: `U diag((σ₁+σ₂)/2, (σ₁+σ₂)/2, 0) Vᵀ`.
pub fn project_to_essential_manifold(e_raw: &Matrix3<f64>) -> Matrix3<f64> {
    let Some((u, s, v_t)) = sorted_svd(e_raw) else {
        return *e_raw;
    };
    let sigma = 0.5 * (s[0] + s[1]);
    u * Matrix3::from_diagonal(&Vector3::new(sigma, sigma, 0.0)) * v_t
}

/// Reject matrices that cannot seed an estimation (non-finite or zero).
pub fn validate_essential_matrix(e: &Matrix3<f64>) -> ManifoldResult<Matrix3<f64>> {
    if e.iter().any(|value| !value.is_finite()) {
        return Err(ManifoldError::InvalidElement(
            "essential matrix contains non-finite entries".to_string(),
        ));
    }
    if e.norm() < f64::EPSILON {
        return Err(ManifoldError::NumericalInstability(
            "essential matrix is numerically zero".to_string(),
        ));
    }
    Ok(*e)
}

/// The four `(R, t)` factorizations of `E`, in a fixed order.
pub fn essential_candidates(e: &Matrix3<f64>) -> [(Matrix3<f64>, Vector3<f64>); 4] {
    let (mut u, mut v_t) = match sorted_svd(e) {
        Some((u, _, v_t)) => (u, v_t),
        None => (Matrix3::identity(), Matrix3::identity()),
    };

    // The third singular value is (close to) zero, so flipping the matching
    // singular vectors keeps E while forcing proper rotations.
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vector3<f64> = u.column(2).normalize();

    [(r1, t), (r1, -t), (r2, t), (r2, -t)]
}

/// Factor `E` with the fixed convention (first candidate), without points.
pub fn compute_rt_from_e_canonical(e: &Matrix3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    essential_candidates(e)[0]
}

/// Depths `(λ₁, λ₂)` of a correspondence under the pose `(R, t)`.
///
/// Solves `λ₂x₂ = λ₁Rx₁ + t` with cross products. Returns `None` when the
/// rays are parallel (no parallax).
pub fn triangulate_depths(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    correspondence: &PointCorrespondence,
) -> Option<(f64, f64)> {
    let rotated = rotation * correspondence.x1;
    let x2 = correspondence.x2;

    let normal = x2.cross(&rotated);
    let denominator = normal.norm_squared();
    if denominator < 1e-12 * rotated.norm_squared() * x2.norm_squared() {
        return None;
    }

    let depth1 = -x2.cross(translation).dot(&normal) / denominator;
    let depth2 = rotated.cross(translation).dot(&(-normal)) / denominator;
    Some((depth1, depth2))
}

/// Number of correspondences in front of both cameras for `(R, t)`.
pub fn cheirality_count(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    points: &[PointCorrespondence],
) -> usize {
    points
        .iter()
        .filter_map(|point| triangulate_depths(rotation, translation, point))
        .filter(|&(depth1, depth2)| depth1 > 0.0 && depth2 > 0.0)
        .count()
}

/// Factor `E` into the `(R, t)` pair consistent with the correspondences.
///
/// Picks the candidate with the most points in front of both cameras. Ties
/// keep the earliest candidate in the fixed order of [`essential_candidates`],
/// so when no point disambiguates the result equals
/// [`compute_rt_from_e_canonical`].
pub fn compute_rt_from_e(
    points: &[PointCorrespondence],
    e: &Matrix3<f64>,
) -> (Matrix3<f64>, Vector3<f64>) {
    let candidates = essential_candidates(e);

    let mut best = 0;
    let mut best_count = 0;
    for (index, (rotation, translation)) in candidates.iter().enumerate() {
        let count = cheirality_count(rotation, translation, points);
        if count > best_count {
            best = index;
            best_count = count;
        }
    }

    if best_count == 0 && !points.is_empty() {
        warn!(
            "No correspondence passes the cheirality test for any of the 4 candidates; \
             falling back to the canonical factorization"
        );
    }

    candidates[best]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::is_rotation;
    use nalgebra::{Rotation3, Unit};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn scene_points(
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> Vec<PointCorrespondence> {
        (0..20)
            .map(|i| {
                let fi = i as f64;
                let landmark = Vector3::new(
                    (fi * 0.37).sin() * 1.5,
                    (fi * 0.71).cos() * 1.2,
                    4.0 + (fi * 0.13).sin(),
                );
                let in_second = rotation * landmark + translation;
                PointCorrespondence::new(landmark / landmark.z, in_second / in_second.z)
            })
            .collect()
    }

    fn ground_truth() -> (Matrix3<f64>, Vector3<f64>) {
        let r = Rotation3::from_scaled_axis(Vector3::new(0.05, -0.2, 0.1)).into_inner();
        let t = Vector3::new(0.8, 0.1, -0.2).normalize();
        (r, t)
    }

    #[test]
    fn test_compose_satisfies_epipolar_constraint() {
        let (r, t) = ground_truth();
        let e = compute_e_from_rt(&r, &t);
        for point in scene_points(&r, &t) {
            assert!(point.epipolar_residual(&e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_projection_equalizes_singular_values() {
        let e_raw = Matrix3::new(1.0, 0.2, -0.3, 0.1, 0.7, 0.4, -0.2, 0.5, 0.9);
        let e = project_to_essential_manifold(&e_raw);
        let mut s = e.singular_values().as_slice().to_vec();
        s.sort_by(|a, b| b.total_cmp(a));
        assert!((s[0] - s[1]).abs() < 1e-12);
        assert!(s[2].abs() < 1e-12);
    }

    #[test]
    fn test_projection_keeps_valid_essential() {
        let (r, t) = ground_truth();
        let e = compute_e_from_rt(&r, &t);
        assert!((project_to_essential_manifold(&e) - e).norm() < 1e-12);
    }

    #[test]
    fn test_candidates_reproduce_essential_up_to_sign() {
        let (r, t) = ground_truth();
        let e = compute_e_from_rt(&r, &t);
        for (candidate_r, candidate_t) in essential_candidates(&e) {
            assert!(is_rotation(&candidate_r, 1e-12));
            assert!((candidate_t.norm() - 1.0).abs() < 1e-12);
            let composed = compute_e_from_rt(&candidate_r, &candidate_t);
            let error = (composed - e).norm().min((composed + e).norm());
            assert!(error < 1e-10, "candidate does not reproduce E: {error}");
        }
    }

    #[test]
    fn test_factor_roundtrip_with_cheirality() {
        let (r, t) = ground_truth();
        let points = scene_points(&r, &t);
        let (r_hat, t_hat) = compute_rt_from_e(&points, &compute_e_from_rt(&r, &t));
        assert!((r_hat - r).norm() < 1e-9);
        assert!((t_hat - t).norm() < 1e-9);
    }

    fn random_pose(rng: &mut StdRng) -> (Matrix3<f64>, Vector3<f64>) {
        let axis_angle = Vector3::from_fn(|_, _| rng.random_range(-0.6..0.6));
        let t = Vector3::from_fn(|_, _| rng.random_range(-1.0..1.0)).normalize();
        (Rotation3::from_scaled_axis(axis_angle).into_inner(), t)
    }

    fn random_points(
        rng: &mut StdRng,
        r: &Matrix3<f64>,
        t: &Vector3<f64>,
    ) -> Vec<PointCorrespondence> {
        (0..40)
            .filter_map(|_| {
                let landmark = Vector3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(4.0..8.0),
                );
                let in_second = r * landmark + t;
                (in_second.z > 0.5).then(|| {
                    PointCorrespondence::new(landmark / landmark.z, in_second / in_second.z)
                })
            })
            .collect()
    }

    #[test]
    fn test_factor_roundtrip_for_random_poses() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..50 {
            let (r, t) = random_pose(&mut rng);
            let points = random_points(&mut rng, &r, &t);
            assert!(points.len() >= 10);

            let (r_hat, t_hat) = compute_rt_from_e(&points, &compute_e_from_rt(&r, &t));
            assert!((r_hat - r).norm() < 1e-8, "rotation error {}", (r_hat - r).norm());
            assert!((t_hat - t).norm() < 1e-8, "translation error {}", (t_hat - t).norm());
        }
    }

    #[test]
    fn test_candidates_cover_pose_and_twisted_pair() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..50 {
            let (r, t) = random_pose(&mut rng);
            let candidates = essential_candidates(&compute_e_from_rt(&r, &t));

            let matches = |sign: f64| {
                candidates
                    .iter()
                    .filter(|(cr, ct)| (cr - r).norm() < 1e-8 && (ct - t * sign).norm() < 1e-8)
                    .count()
            };
            assert_eq!(matches(1.0), 1);
            assert_eq!(matches(-1.0), 1);

            // The remaining two candidates share the twisted rotation, which
            // differs from R by a rotation of π about t.
            let twisted: Vec<_> = candidates
                .iter()
                .filter(|(cr, _)| (cr - r).norm() > 1e-6)
                .collect();
            assert_eq!(twisted.len(), 2);
            assert!((twisted[0].0 - twisted[1].0).norm() < 1e-12);
            assert!((twisted[0].1 + twisted[1].1).norm() < 1e-12);
            let half_turn = Rotation3::from_axis_angle(&Unit::new_normalize(t), PI);
            assert!((twisted[0].0 - half_turn.into_inner() * r).norm() < 1e-8);
        }
    }

    #[test]
    fn test_factor_roundtrip_of_negated_essential() {
        let (r, t) = ground_truth();
        let points = scene_points(&r, &t);
        let (r_hat, t_hat) = compute_rt_from_e(&points, &(-compute_e_from_rt(&r, &t)));
        assert!((r_hat - r).norm() < 1e-9);
        assert!((t_hat - t).norm() < 1e-9);
    }

    #[test]
    fn test_factor_without_points_falls_back_to_canonical() {
        let (r, t) = ground_truth();
        let e = compute_e_from_rt(&r, &t);
        let (r_hat, t_hat) = compute_rt_from_e(&[], &e);
        let (r_canonical, t_canonical) = compute_rt_from_e_canonical(&e);
        assert_eq!(r_hat, r_canonical);
        assert_eq!(t_hat, t_canonical);
    }

    #[test]
    fn test_triangulated_depths_are_positive_for_true_pose() {
        let (r, t) = ground_truth();
        for point in scene_points(&r, &t) {
            let (depth1, depth2) = triangulate_depths(&r, &t, &point).expect("parallax");
            assert!(depth1 > 0.0 && depth2 > 0.0);
        }
    }

    #[test]
    fn test_validate_essential_matrix() {
        assert!(validate_essential_matrix(&Matrix3::identity()).is_ok());
        assert!(validate_essential_matrix(&Matrix3::zeros()).is_err());
        let mut e = Matrix3::identity();
        e[(1, 1)] = f64::INFINITY;
        assert!(validate_essential_matrix(&e).is_err());
    }
}
