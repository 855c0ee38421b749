//! RANSAC-based robust wrapper for PnP solvers.

use crate::camera::CameraModel;
use crate::ops::{reprojection_sq_error, rmse_px};
use crate::types::{check_lengths, PnPError};
use crate::{solve_pnp, PnPMethod};
use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use rand::{rngs::StdRng, SeedableRng};

/// Parameters for RANSAC over PnP.
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Pixel error threshold to classify an observation as an inlier.
    pub reproj_threshold_px: f64,
    /// Stop as soon as a model gathers at least this many inliers.
    pub target_inliers: Option<usize>,
    /// Desired probability that at least one sample set is outlier-free.
    ///
    /// `1.0` disables adaptive termination.
    pub confidence: f64,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
    /// Whether to refit on all inliers using the base solver.
    pub refine: bool,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            reproj_threshold_px: 8.0,
            target_inliers: None,
            confidence: 0.99,
            random_seed: None,
            refine: true,
        }
    }
}

/// RANSAC result for PnP.
#[derive(Debug, Clone)]
pub struct PnPRansacResult {
    /// Best camera-from-world pose found by RANSAC.
    pub pose: SE3,
    /// Indices of inlier correspondences, empty when no model was found.
    pub inliers: Vec<usize>,
    /// Number of iterations performed.
    pub num_iterations: usize,
    /// Root-mean-square reprojection error over the inliers.
    pub reproj_rmse: Option<f64>,
}

impl PnPRansacResult {
    fn not_converged(num_iterations: usize) -> Self {
        Self {
            pose: SE3::IDENTITY,
            inliers: Vec::new(),
            num_iterations,
            reproj_rmse: None,
        }
    }
}

/// Solve PnP robustly using a RANSAC loop around a base PnP method (e.g., EPnP).
///
/// - Minimal sample size is 5 for EPnP (4 when only 4 points available).
/// - Scoring uses Euclidean pixel reprojection error; points behind the camera are outliers.
/// - Iterations adapt from current inlier ratio and desired confidence; a confidence
///   of `1.0` runs the full `max_iterations` budget.
/// - Stops early once `target_inliers` is reached.
///
/// When no sample produces a valid model the result carries an empty inlier set
/// and an identity pose.
pub fn solve_pnp_ransac(
    world: &[DVec3],
    image: &[DVec2],
    camera: &CameraModel,
    base: PnPMethod,
    params: &RansacParams,
) -> Result<PnPRansacResult, PnPError> {
    check_lengths(world, image)?;
    let n = world.len();
    if n < 4 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 4,
            actual: n,
        });
    }

    let sample_size: usize = if n == 4 { 4 } else { 5 };
    let thresh_sq = params.reproj_threshold_px * params.reproj_threshold_px;

    let mut rng: StdRng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_pose: Option<SE3> = None;

    let mut w_min: Vec<DVec3> = Vec::with_capacity(sample_size);
    let mut i_min: Vec<DVec2> = Vec::with_capacity(sample_size);

    let mut iter: usize = 0;
    let mut required_iters = params.max_iterations;

    while iter < required_iters {
        iter += 1;

        let sample = rand::seq::index::sample(&mut rng, n, sample_size);
        w_min.clear();
        i_min.clear();
        for idx in sample.iter() {
            w_min.push(world[idx]);
            i_min.push(image[idx]);
        }

        let pose = match solve_pnp(&w_min, &i_min, camera, base.clone()) {
            Ok(res) => res.pose,
            Err(e) => {
                log::trace!("RANSAC iteration {}: minimal solve failed: {}", iter, e);
                continue;
            }
        };

        if !w_min.iter().all(|&pw| (pose * pw).z > 0.0) {
            continue;
        }

        let inliers = classify_inliers(world, image, camera, &pose, thresh_sq);
        if inliers.len() <= best_inliers.len() {
            continue;
        }

        log::debug!(
            "RANSAC iteration {}: {} / {} inliers",
            iter,
            inliers.len(),
            n
        );
        best_inliers = inliers;
        best_pose = Some(pose);

        if params
            .target_inliers
            .is_some_and(|target| best_inliers.len() >= target)
        {
            break;
        }

        let ratio = best_inliers.len() as f64 / n as f64;
        required_iters = required_iters.min(adaptive_iterations(
            ratio,
            sample_size,
            params.confidence,
            params.max_iterations,
        ));
    }

    let Some(mut pose) = best_pose else {
        log::debug!("RANSAC found no valid model after {} iterations", iter);
        return Ok(PnPRansacResult::not_converged(iter));
    };

    if params.refine && best_inliers.len() >= sample_size {
        let w_all: Vec<DVec3> = best_inliers.iter().map(|&i| world[i]).collect();
        let i_all: Vec<DVec2> = best_inliers.iter().map(|&i| image[i]).collect();
        match solve_pnp(&w_all, &i_all, camera, base) {
            Ok(refit) => {
                let inliers = classify_inliers(world, image, camera, &refit.pose, thresh_sq);
                if inliers.len() >= best_inliers.len() {
                    pose = refit.pose;
                    best_inliers = inliers;
                }
            }
            Err(e) => log::debug!("RANSAC refit on inliers failed: {}", e),
        }
    }

    let w_in: Vec<DVec3> = best_inliers.iter().map(|&i| world[i]).collect();
    let i_in: Vec<DVec2> = best_inliers.iter().map(|&i| image[i]).collect();
    let rmse = rmse_px(camera, &pose, &w_in, &i_in);

    Ok(PnPRansacResult {
        pose,
        inliers: best_inliers,
        num_iterations: iter,
        reproj_rmse: Some(rmse),
    })
}

/// Number of iterations needed to draw an all-inlier sample with the given confidence.
fn adaptive_iterations(
    inlier_ratio: f64,
    sample_size: usize,
    confidence: f64,
    max_iterations: usize,
) -> usize {
    if confidence >= 1.0 {
        return max_iterations;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let p_good = inlier_ratio.powi(sample_size as i32);
    if p_good <= f64::EPSILON {
        return max_iterations;
    }
    let log_conf = (1.0 - confidence).max(f64::EPSILON).ln();
    let log_denom = (1.0 - p_good).ln();
    let est = (log_conf / log_denom).ceil();
    if est.is_finite() && est > 0.0 {
        (est as usize).min(max_iterations)
    } else {
        max_iterations
    }
}

fn classify_inliers(
    world: &[DVec3],
    image: &[DVec2],
    camera: &CameraModel,
    pose: &SE3,
    thresh_sq: f64,
) -> Vec<usize> {
    world
        .iter()
        .zip(image.iter())
        .enumerate()
        .filter(|(_, (&pw, &uv))| {
            (*pose * pw).z > 0.0 && reprojection_sq_error(camera, pose, pw, uv) < thresh_sq
        })
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::epnp::EPnPParams;
    use approx::assert_relative_eq;
    use kornia_lie::SO3;
    use rand::Rng;

    fn synthetic(n: usize, outliers: usize, seed: u64) -> (Vec<DVec3>, Vec<DVec2>, CameraModel, SE3) {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0));
        let gt = SE3::new(SO3::exp(DVec3::new(0.05, -0.1, 0.02)), DVec3::new(0.2, -0.1, 0.3));
        let mut rng = StdRng::seed_from_u64(seed);
        let world: Vec<DVec3> = (0..n)
            .map(|_| {
                DVec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(4.0..8.0),
                )
            })
            .collect();
        let mut image: Vec<DVec2> = world.iter().map(|&p| camera.project(gt * p)).collect();
        for uv in image.iter_mut().take(outliers) {
            let angle = rng.random_range(0.0..std::f64::consts::TAU);
            let radius = rng.random_range(50.0..200.0);
            *uv += DVec2::new(angle.cos(), angle.sin()) * radius;
        }
        (world, image, camera, gt)
    }

    #[test]
    fn test_ransac_perfect_data() -> Result<(), PnPError> {
        let (world, image, camera, gt) = synthetic(30, 0, 1);
        let params = RansacParams {
            random_seed: Some(42),
            ..Default::default()
        };
        let res = solve_pnp_ransac(&world, &image, &camera, PnPMethod::EPnPDefault, &params)?;
        assert_eq!(res.inliers.len(), 30);
        assert_relative_eq!(res.pose.rotation.angle_to(&gt.rotation), 0.0, epsilon = 1e-6);
        assert!(res.reproj_rmse.is_some_and(|e| e < 1e-3));
        Ok(())
    }

    #[test]
    fn test_ransac_basic_outliers() -> Result<(), PnPError> {
        let (world, image, camera, gt) = synthetic(40, 10, 2);
        let params = RansacParams {
            max_iterations: 200,
            reproj_threshold_px: 2.0,
            random_seed: Some(42),
            ..Default::default()
        };
        let base = PnPMethod::EPnP(EPnPParams::default());
        let res = solve_pnp_ransac(&world, &image, &camera, base, &params)?;

        let expected: Vec<usize> = (10..40).collect();
        assert_eq!(res.inliers, expected);
        assert_relative_eq!((res.pose.translation - gt.translation).length(), 0.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_ransac_target_inliers_stops_early() -> Result<(), PnPError> {
        let (world, image, camera, _) = synthetic(30, 0, 3);
        let params = RansacParams {
            max_iterations: 500,
            target_inliers: Some(24),
            confidence: 0.999999,
            random_seed: Some(7),
            refine: false,
            ..Default::default()
        };
        let res = solve_pnp_ransac(&world, &image, &camera, PnPMethod::EPnPDefault, &params)?;
        assert_eq!(res.num_iterations, 1);
        assert!(res.inliers.len() >= 24);
        Ok(())
    }

    #[test]
    fn test_ransac_seed_is_reproducible() -> Result<(), PnPError> {
        let (world, image, camera, _) = synthetic(40, 15, 4);
        let params = RansacParams {
            reproj_threshold_px: 2.0,
            random_seed: Some(11),
            refine: false,
            ..Default::default()
        };
        let a = solve_pnp_ransac(&world, &image, &camera, PnPMethod::EPnPDefault, &params)?;
        let b = solve_pnp_ransac(&world, &image, &camera, PnPMethod::EPnPDefault, &params)?;
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.pose, b.pose);
        assert_eq!(a.num_iterations, b.num_iterations);
        Ok(())
    }

    #[test]
    fn test_ransac_error_cases() {
        let camera = CameraModel::default();
        let world = [DVec3::new(0.0, 0.0, 1.0), DVec3::new(1.0, 0.0, 1.0), DVec3::new(0.0, 1.0, 1.0)];
        let image = [DVec2::new(100.0, 100.0), DVec2::new(200.0, 100.0), DVec2::new(100.0, 200.0)];
        let params = RansacParams::default();

        let result = solve_pnp_ransac(&world, &image, &camera, PnPMethod::EPnPDefault, &params);
        assert!(matches!(
            result,
            Err(PnPError::InsufficientCorrespondences { .. })
        ));
    }

    #[test]
    fn test_adaptive_iterations() {
        assert_eq!(adaptive_iterations(1.0, 5, 0.99, 100), 1);
        assert_eq!(adaptive_iterations(0.0, 5, 0.99, 100), 100);
        // 0.5^5 = 1/32 -> ln(0.01) / ln(31/32) = 145.05
        assert_eq!(adaptive_iterations(0.5, 5, 0.99, 1000), 146);
        assert_eq!(adaptive_iterations(0.5, 5, 0.99, 100), 100);
        assert_eq!(adaptive_iterations(1.0, 5, 1.0, 100), 100);
        assert_eq!(adaptive_iterations(0.5, 5, 1.0, 300), 300);
    }

    #[test]
    fn test_ransac_full_confidence_uses_whole_budget() -> Result<(), PnPError> {
        let (world, image, camera, _) = synthetic(30, 0, 5);
        let params = RansacParams {
            max_iterations: 25,
            confidence: 1.0,
            random_seed: Some(3),
            refine: false,
            ..Default::default()
        };
        let res = solve_pnp_ransac(&world, &image, &camera, PnPMethod::EPnPDefault, &params)?;
        assert_eq!(res.num_iterations, 25);
        assert_eq!(res.inliers.len(), 30);
        Ok(())
    }
}
