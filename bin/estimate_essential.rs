use std::path::PathBuf;
use std::time::Instant;

use apex_essential::core::{
    EssentialEstimationOptions, EssentialEstimator, PointCorrespondence, PreconditionerType,
};
use apex_essential::init_logger;
use apex_essential::io::{CorrespondenceLoader, DataLoader};
use apex_essential::manifold::compute_e_from_rt;
use apex_essential::synthetic::{SceneConfig, generate_scene};
use clap::Parser;
use nalgebra::{Matrix3, Vector3};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "estimate_essential")]
#[command(about = "Estimate the relative pose between two calibrated views")]
struct Args {
    /// Correspondence file (4 or 6 columns per line). A synthetic scene is used when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of synthetic correspondences
    #[arg(short, long, default_value = "100")]
    points: usize,

    /// Noise standard deviation on synthetic normalized coordinates
    #[arg(short, long, default_value = "0.0")]
    noise: f64,

    /// Seed of the synthetic scene
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Initializer and preconditioner: "none", "any" or "block-jacobi"
    #[arg(long, default_value = "none")]
    precon: PreconditionerType,

    /// Riemannian gradient norm tolerance
    #[arg(long, default_value = "1e-9")]
    tol_grad_norm: f64,

    /// Relative function decrease tolerance
    #[arg(long, default_value = "1e-10")]
    rel_func_decrease_tol: f64,

    /// Maximum number of trust-region iterations
    #[arg(short, long, default_value = "500")]
    max_iterations: usize,

    /// Maximum number of inner conjugate gradient iterations
    #[arg(long, default_value = "2000")]
    max_tcg_iterations: usize,

    /// Write the correspondences used for the run to this file
    #[arg(long)]
    save_points: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

struct Workload {
    points: Vec<PointCorrespondence>,
    ground_truth: Option<(Matrix3<f64>, Vector3<f64>)>,
}

fn load_workload(args: &Args) -> Result<Workload, Box<dyn std::error::Error>> {
    if let Some(path) = &args.input {
        info!("Loading correspondences from {}", path.display());
        let points = CorrespondenceLoader::load(path)?;
        return Ok(Workload {
            points,
            ground_truth: None,
        });
    }

    let config = SceneConfig::new()
        .with_num_points(args.points)
        .with_noise(args.noise)
        .with_seed(args.seed);
    info!(
        "Generating synthetic scene: {} points, noise {:.2e}, seed {}",
        config.num_points, config.noise_std, config.seed
    );
    let scene = generate_scene(&config)?;
    Ok(Workload {
        points: scene.points,
        ground_truth: Some((scene.rotation, scene.translation)),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let args = Args::parse();

    let workload = load_workload(&args)?;
    info!("Loaded {} correspondences", workload.points.len());

    if let Some(path) = &args.save_points {
        CorrespondenceLoader::write(&workload.points, path)?;
        info!("Saved correspondences to {}", path.display());
    }

    let options = EssentialEstimationOptions::new()
        .with_preconditioning(args.precon)
        .with_tol_grad_norm(args.tol_grad_norm)
        .with_rel_func_decrease_tol(args.rel_func_decrease_tol)
        .with_max_rtr_iterations(args.max_iterations)
        .with_max_tcg_iterations(args.max_tcg_iterations)
        .with_estimation_verbose(args.verbose)
        .with_verbose(args.verbose);

    let mut estimator = EssentialEstimator::new(&workload.points, options);
    if args.precon == PreconditionerType::Any {
        // No 8-point estimate in this mode: start from the identity rotation
        // and the forward direction.
        warn!("Selector 'any' skips the 8-point initializer; starting from E = [e_z]x");
        let guess = compute_e_from_rt(&Matrix3::identity(), &Vector3::z());
        estimator = estimator.with_initial_guess(guess);
    }

    let start = Instant::now();
    let result = match estimator.estimate() {
        Ok(result) => result,
        Err(e) => {
            error!("Estimation failed: {}", e);
            return Err(e.into());
        }
    };
    info!("Estimation finished in {:?}", start.elapsed());

    println!("{result}");

    if let Some((r_true, t_true)) = workload.ground_truth {
        let e_true = compute_e_from_rt(&r_true, &t_true);
        let e_error = (result.e_opt - e_true)
            .norm()
            .min((result.e_opt + e_true).norm());
        let rotation_error = rotation_angle(&(result.r_opt.transpose() * r_true));
        let translation_error = result.t_opt.dot(&t_true).clamp(-1.0, 1.0).acos();
        println!("Ground truth comparison");
        println!("-----------------------");
        println!("Essential matrix error (up to sign): {e_error:.6e}");
        println!("Rotation error [deg]:                {:.6}", rotation_error.to_degrees());
        println!("Translation angle [deg]:             {:.6}", translation_error.to_degrees());
    }

    Ok(())
}

/// Angle of a rotation matrix from its trace.
fn rotation_angle(r: &Matrix3<f64>) -> f64 {
    ((r.trace() - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}
