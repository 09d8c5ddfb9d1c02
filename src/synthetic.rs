//! Deterministic synthetic two-view scenes.
//!
//! Landmarks are drawn inside a frustum in front of the first camera and
//! observed by a second camera at `X₂ = R X₁ + t` with `|t| = 1`. Gaussian
//! noise (Box-Muller) is added to the normalized image coordinates of both
//! observations. The same configuration and seed always produce the same
//! scene.

use crate::core::{CoreError, CoreResult, PointCorrespondence};
use crate::manifold::essential::compute_e_from_rt;
use nalgebra::{Matrix3, Rotation3, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const MAX_LANDMARK_ATTEMPTS: usize = 100;

/// Parameters of a synthetic scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub num_points: usize,
    /// Standard deviation of the noise on normalized image coordinates
    pub noise_std: f64,
    pub seed: u64,
    /// Upper bound on the relative rotation angle (radians)
    pub max_rotation_angle: f64,
    pub min_depth: f64,
    pub max_depth: f64,
    /// Half-width of the first camera's view in normalized coordinates
    pub field_of_view: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            num_points: 100,
            noise_std: 0.0,
            seed: 42,
            max_rotation_angle: 0.5,
            min_depth: 3.0,
            max_depth: 8.0,
            field_of_view: 0.5,
        }
    }
}

impl SceneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_points(mut self, num_points: usize) -> Self {
        self.num_points = num_points;
        self
    }

    pub fn with_noise(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_rotation_angle(mut self, angle: f64) -> Self {
        self.max_rotation_angle = angle;
        self
    }

    pub fn with_depth_range(mut self, min_depth: f64, max_depth: f64) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    pub fn with_field_of_view(mut self, field_of_view: f64) -> Self {
        self.field_of_view = field_of_view;
        self
    }

    fn validate(&self) -> CoreResult<()> {
        if !(self.noise_std.is_finite() && self.noise_std >= 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "noise standard deviation must be finite and non-negative, got {}",
                self.noise_std
            )));
        }
        let depths_valid = self.min_depth > 0.0
            && self.max_depth >= self.min_depth
            && self.max_depth.is_finite();
        if !depths_valid {
            return Err(CoreError::InvalidInput(format!(
                "invalid depth range [{}, {}]",
                self.min_depth, self.max_depth
            )));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "field of view must be positive, got {}",
                self.field_of_view
            )));
        }
        if !(self.max_rotation_angle >= 0.0 && self.max_rotation_angle.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "rotation angle bound must be non-negative, got {}",
                self.max_rotation_angle
            )));
        }
        Ok(())
    }
}

/// A generated scene together with its ground truth
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub points: Vec<PointCorrespondence>,
    pub rotation: Matrix3<f64>,
    /// Unit-norm translation
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
}

/// Generate a scene from `config`.
pub fn generate_scene(config: &SceneConfig) -> CoreResult<SyntheticScene> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let axis = random_unit_vector(&mut rng);
    let angle = rng.random_range(0.0..=config.max_rotation_angle);
    let rotation = Rotation3::from_scaled_axis(axis * angle).into_inner();
    let translation = random_unit_vector(&mut rng);

    let mut points = Vec::with_capacity(config.num_points);
    for _ in 0..config.num_points {
        let (landmark, observed) = sample_landmark(&mut rng, config, &rotation, &translation)?;
        let p1 = Vector2::new(landmark.x / landmark.z, landmark.y / landmark.z);
        let p2 = Vector2::new(observed.x / observed.z, observed.y / observed.z);
        let noise1 = Vector2::new(
            gaussian(&mut rng, config.noise_std),
            gaussian(&mut rng, config.noise_std),
        );
        let noise2 = Vector2::new(
            gaussian(&mut rng, config.noise_std),
            gaussian(&mut rng, config.noise_std),
        );
        points.push(PointCorrespondence::from_normalized(p1 + noise1, p2 + noise2));
    }

    Ok(SyntheticScene {
        points,
        rotation,
        translation,
        essential: compute_e_from_rt(&rotation, &translation),
    })
}

/// Draw a landmark visible in front of both cameras.
fn sample_landmark(
    rng: &mut StdRng,
    config: &SceneConfig,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
) -> CoreResult<(Vector3<f64>, Vector3<f64>)> {
    let fov = config.field_of_view;
    for _ in 0..MAX_LANDMARK_ATTEMPTS {
        let depth = rng.random_range(config.min_depth..=config.max_depth);
        let landmark = Vector3::new(
            rng.random_range(-fov..=fov) * depth,
            rng.random_range(-fov..=fov) * depth,
            depth,
        );
        let observed = rotation * landmark + translation;
        if observed.z > 1e-3 * config.min_depth {
            return Ok((landmark, observed));
        }
    }
    Err(CoreError::InvalidInput(
        "could not place landmarks in front of both cameras".to_string(),
    ))
}

fn random_unit_vector(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        let norm = v.norm();
        if norm > 1e-3 && norm <= 1.0 {
            return v / norm;
        }
    }
}

/// Zero-mean Gaussian sample via Box-Muller.
fn gaussian(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::is_rotation;

    #[test]
    fn test_noiseless_scene_satisfies_epipolar_constraint() {
        let scene = generate_scene(&SceneConfig::new().with_num_points(50)).unwrap();
        assert_eq!(scene.points.len(), 50);
        assert!(is_rotation(&scene.rotation, 1e-10));
        assert!((scene.translation.norm() - 1.0).abs() < 1e-12);
        for point in &scene.points {
            assert_eq!(point.x1.z, 1.0);
            assert!(point.epipolar_residual(&scene.essential).abs() < 1e-12);
        }
    }

    #[test]
    fn test_same_seed_same_scene() {
        let config = SceneConfig::new().with_noise(1e-3).with_seed(7);
        let a = generate_scene(&config).unwrap();
        let b = generate_scene(&config).unwrap();
        assert_eq!(a.points, b.points);
        assert_eq!(a.rotation, b.rotation);

        let c = generate_scene(&config.clone().with_seed(8)).unwrap();
        assert_ne!(a.points, c.points);
    }

    #[test]
    fn test_noise_perturbs_observations() {
        let scene = generate_scene(&SceneConfig::new().with_noise(1e-2)).unwrap();
        let max_residual = scene
            .points
            .iter()
            .map(|p| p.epipolar_residual(&scene.essential).abs())
            .fold(0.0, f64::max);
        assert!(max_residual > 1e-6);
    }

    #[test]
    fn test_rotation_angle_is_bounded() {
        let scene = generate_scene(&SceneConfig::new().with_max_rotation_angle(0.1)).unwrap();
        let angle = Rotation3::from_matrix_unchecked(scene.rotation).angle();
        assert!(angle <= 0.1 + 1e-12);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(generate_scene(&SceneConfig::new().with_noise(-1.0)).is_err());
        assert!(generate_scene(&SceneConfig::new().with_depth_range(5.0, 1.0)).is_err());
        assert!(generate_scene(&SceneConfig::new().with_field_of_view(0.0)).is_err());
    }
}
