use std::sync::Arc;

use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use kornia_pnp::{CameraModel, RansacParams};
use rand::Rng;

use crate::camera_rig::CameraRig;
use crate::config::{RegistratorConfig, MIN_CORRESPONDENCES};
use crate::error::RegistrationError;
use crate::hypothesis::{evaluation_order, HypothesisPool};
use crate::keyframe::{Keyframe, Match, Observation};
use crate::solver::{EPnPSolver, MinimalPoseSolver, RansacPnPSolver, RobustPoseSolver};

/// Result of a preemptive solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreemptiveResult {
    /// Pose of camera B in keyframe A (`a_from_b`).
    pub pose: SE3,
    /// Score of the winning hypothesis, the negated sum of its robust penalties.
    pub score: f64,
    /// Hypotheses generated before scoring.
    pub num_hypotheses: usize,
    /// Observations scored before the pool collapsed or the budget ran out.
    pub observations_used: usize,
    /// Hypotheses still alive when scoring stopped.
    pub survivors: usize,
}

impl PreemptiveResult {
    /// Whether the winning hypothesis scored at least `min_score`.
    ///
    /// The preemptive solve always commits to a pose; use this to reject weak ones.
    pub fn is_supported(&self, min_score: f64) -> bool {
        self.score >= min_score
    }
}

/// Result of a robust solve.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustResult {
    /// Pose of camera B in keyframe A (`a_from_b`).
    pub pose: SE3,
    /// Indices into the input matches that were classified as inliers.
    pub inliers: Vec<usize>,
}

/// Pose together with the verified matches and their observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Pose of camera B in keyframe A (`a_from_b`).
    pub pose: SE3,
    /// Matches consistent with `pose`.
    pub inliers: Vec<Match>,
    /// Observations of the inlier matches.
    pub observations: Vec<Observation>,
}

/// Estimates the relative pose of two keyframes from landmark-to-keypoint matches.
///
/// The landmarks of keyframe A are matched against the keypoints of keyframe B, and
/// keyframe B's camera is looked up in the shared [`CameraRig`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use glam::DVec3;
/// use kornia_lie::{SE3, SO3};
/// use kornia_pnp::CameraModel;
/// use kornia_registration::{CameraRig, KeyFrame, Match, Registrator};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let camera = CameraModel::default();
/// let b_from_a = SE3::new(SO3::exp(DVec3::new(0.0, 0.05, 0.0)), DVec3::new(0.1, 0.0, 0.0));
///
/// let landmarks: Vec<DVec3> = (0..30)
///     .map(|i| DVec3::new((i % 6) as f64 * 0.3 - 0.8, (i / 6) as f64 * 0.3 - 0.6, 4.0 + (i % 4) as f64))
///     .collect();
/// let keypoints = landmarks.iter().map(|&p| camera.project(b_from_a * p)).collect();
///
/// let kfa = KeyFrame::new(0, landmarks, Vec::new());
/// let kfb = KeyFrame::new(0, Vec::new(), keypoints);
/// let matches: Vec<Match> = (0..30).map(|i| Match::new(i, i)).collect();
///
/// let registrator = Registrator::new(Arc::new(CameraRig::new().with_camera(0, camera)));
/// let mut rng = StdRng::seed_from_u64(0);
/// let result = registrator.preemptive_solve(&kfa, &kfb, &matches, &mut rng)?;
/// assert!(result.pose.rotation.angle_to(&b_from_a.inverse().rotation) < 1e-6);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Registrator<S = EPnPSolver, R = RansacPnPSolver> {
    cameras: Arc<CameraRig>,
    config: RegistratorConfig,
    solver: S,
    robust_solver: R,
}

impl Registrator {
    /// Create a registrator backed by the EPnP solvers with the default configuration.
    pub fn new(cameras: Arc<CameraRig>) -> Self {
        Self::with_solvers(
            cameras,
            RegistratorConfig::default(),
            EPnPSolver::default(),
            RansacPnPSolver::default(),
        )
    }
}

impl<S, R> Registrator<S, R>
where
    S: MinimalPoseSolver,
    R: RobustPoseSolver,
{
    /// Create a registrator with custom solvers.
    pub fn with_solvers(
        cameras: Arc<CameraRig>,
        config: RegistratorConfig,
        solver: S,
        robust_solver: R,
    ) -> Self {
        Self {
            cameras,
            config,
            solver,
            robust_solver,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RegistratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &RegistratorConfig {
        &self.config
    }

    /// The camera rig.
    pub fn cameras(&self) -> &Arc<CameraRig> {
        &self.cameras
    }

    /// Preemptive RANSAC estimate of the pose of camera B in keyframe A.
    ///
    /// Hypotheses are solved from random minimal samples, scored with
    /// `ln(1 + e²)` penalties in a single random observation order and halved
    /// every `block_size` observations. The best hypothesis is returned inverted.
    /// There is no consensus check; see [`PreemptiveResult::is_supported`].
    pub fn preemptive_solve<A, B, G>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
        rng: &mut G,
    ) -> Result<PreemptiveResult, RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
        G: Rng,
    {
        check_num_matches(matches)?;
        let camera = self.cameras.get(kfb.camera_id())?;
        let (world, image) = gather_correspondences(kfa, kfb, matches)?;
        let params = &self.config.preemptive;

        let mut pool = HypothesisPool::generate(&self.solver, &world, &image, camera, params, rng)?;
        let num_hypotheses = pool.num_generated();

        let order = evaluation_order(matches.len(), rng);
        let outcome = pool.score_and_prune(&world, &image, camera, &order, params)?;

        log::debug!(
            "preemptive solve: {} matches, {} hypotheses, {} observations, {} survivors, best score {:.3}",
            matches.len(),
            num_hypotheses,
            outcome.observations_used,
            outcome.survivors,
            outcome.best.score
        );

        Ok(PreemptiveResult {
            pose: outcome.best.pose.inverse(),
            score: outcome.best.score,
            num_hypotheses,
            observations_used: outcome.observations_used,
            survivors: outcome.survivors,
        })
    }

    /// Solve the pose from all matches at once.
    ///
    /// Not robust to outliers. Unlike the other solve modes the pose is returned
    /// as the solver produces it: keyframe A into camera B (`b_from_a`).
    pub fn direct_solve<A, B>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
    ) -> Result<SE3, RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
    {
        check_num_matches(matches)?;
        let camera = self.cameras.get(kfb.camera_id())?;
        let (world, image) = gather_correspondences(kfa, kfb, matches)?;

        let pose = self.solver.solve(&world, &image, camera)?;
        log::debug!("direct solve: {} matches", matches.len());
        Ok(pose)
    }

    /// Estimate the pose with the robust solver.
    ///
    /// The solver gets the full `sample_budget_factor × |matches|` iterations and only
    /// stops early at `target_inlier_fraction × |matches|` inliers. The pose is accepted
    /// only with more than `min_inlier_fraction × |matches|` inliers and is returned
    /// inverted. [`Registrator::robust_register`] takes both thresholds from the config.
    pub fn robust_solve<A, B, G>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
        min_inlier_fraction: f64,
        threshold_px: f64,
        rng: &mut G,
    ) -> Result<RobustResult, RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
        G: Rng,
    {
        check_num_matches(matches)?;
        let camera = self.cameras.get(kfb.camera_id())?;
        let (world, image) = gather_correspondences(kfa, kfb, matches)?;

        let n = matches.len();
        let robust = &self.config.robust;
        let params = RansacParams {
            max_iterations: n.saturating_mul(robust.sample_budget_factor),
            reproj_threshold_px: threshold_px,
            target_inliers: Some((n as f64 * robust.target_inlier_fraction) as usize),
            confidence: 1.0,
            random_seed: Some(rng.random()),
            refine: robust.refine,
        };

        let result = self
            .robust_solver
            .solve_robust(&world, &image, camera, &params)?;

        let required = n as f64 * min_inlier_fraction;
        log::debug!(
            "robust solve: {} / {} inliers after {} iterations",
            result.inliers.len(),
            n,
            result.num_iterations
        );
        if result.inliers.len() as f64 <= required {
            return Err(RegistrationError::LowConsensus {
                inliers: result.inliers.len(),
                required,
            });
        }

        Ok(RobustResult {
            pose: result.pose.inverse(),
            inliers: result.inliers,
        })
    }

    /// Matches whose reprojection error under `a_from_b` is below `threshold_px`,
    /// with their observations.
    pub fn extract_inliers<A, B>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
        a_from_b: &SE3,
        threshold_px: f64,
    ) -> Result<(Vec<Match>, Vec<Observation>), RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
    {
        let camera = self.cameras.get(kfb.camera_id())?;
        let b_from_a = a_from_b.inverse();
        let threshold_sq = threshold_px * threshold_px;

        let mut inliers = Vec::new();
        let mut observations = Vec::new();
        for (index, m) in matches.iter().enumerate() {
            let (point, pixel) = lookup(kfa, kfb, index, m)?;
            let err = camera.project(b_from_a * point) - pixel;
            if err.length_squared() < threshold_sq {
                inliers.push(*m);
                observations.push(observe(camera, point, pixel));
            }
        }

        Ok((inliers, observations))
    }

    /// Observations of the matches selected by `inliers`, without any error test.
    pub fn extract_observations<A, B>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
        inliers: &[usize],
    ) -> Result<Vec<Observation>, RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
    {
        let camera = self.cameras.get(kfb.camera_id())?;
        inliers
            .iter()
            .map(|&index| {
                let m = matches
                    .get(index)
                    .ok_or(RegistrationError::InvalidInlierIndex {
                        index,
                        num_matches: matches.len(),
                    })?;
                let (point, pixel) = lookup(kfa, kfb, index, m)?;
                Ok(observe(camera, point, pixel))
            })
            .collect()
    }

    /// Preemptive solve followed by inlier extraction with `inlier_threshold_px`.
    pub fn register<A, B, G>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
        rng: &mut G,
    ) -> Result<Registration, RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
        G: Rng,
    {
        let solved = self.preemptive_solve(kfa, kfb, matches, rng)?;
        let (inliers, observations) =
            self.extract_inliers(kfa, kfb, matches, &solved.pose, self.config.inlier_threshold_px)?;
        Ok(Registration {
            pose: solved.pose,
            inliers,
            observations,
        })
    }

    /// Robust solve with the configured `robust.min_inlier_fraction` and
    /// `robust.reproj_threshold_px`, followed by observation extraction of its inliers.
    pub fn robust_register<A, B, G>(
        &self,
        kfa: &A,
        kfb: &B,
        matches: &[Match],
        rng: &mut G,
    ) -> Result<Registration, RegistrationError>
    where
        A: Keyframe + ?Sized,
        B: Keyframe + ?Sized,
        G: Rng,
    {
        let robust = &self.config.robust;
        let solved = self.robust_solve(
            kfa,
            kfb,
            matches,
            robust.min_inlier_fraction,
            robust.reproj_threshold_px,
            rng,
        )?;
        let observations = self.extract_observations(kfa, kfb, matches, &solved.inliers)?;
        let inliers = solved
            .inliers
            .iter()
            .filter_map(|&i| matches.get(i).copied())
            .collect();
        Ok(Registration {
            pose: solved.pose,
            inliers,
            observations,
        })
    }
}

fn check_num_matches(matches: &[Match]) -> Result<(), RegistrationError> {
    if matches.len() < MIN_CORRESPONDENCES {
        return Err(RegistrationError::InsufficientCorrespondences {
            required: MIN_CORRESPONDENCES,
            actual: matches.len(),
        });
    }
    Ok(())
}

fn lookup<A, B>(kfa: &A, kfb: &B, index: usize, m: &Match) -> Result<(DVec3, DVec2), RegistrationError>
where
    A: Keyframe + ?Sized,
    B: Keyframe + ?Sized,
{
    match (kfa.landmark(m.landmark), kfb.keypoint(m.keypoint)) {
        (Some(point), Some(pixel)) => Ok((point, pixel)),
        _ => Err(RegistrationError::InvalidMatch {
            index,
            landmark: m.landmark,
            keypoint: m.keypoint,
        }),
    }
}

/// Landmark positions in A and keypoint pixels in B, in match order.
fn gather_correspondences<A, B>(
    kfa: &A,
    kfb: &B,
    matches: &[Match],
) -> Result<(Vec<DVec3>, Vec<DVec2>), RegistrationError>
where
    A: Keyframe + ?Sized,
    B: Keyframe + ?Sized,
{
    let mut world = Vec::with_capacity(matches.len());
    let mut image = Vec::with_capacity(matches.len());
    for (index, m) in matches.iter().enumerate() {
        let (point, pixel) = lookup(kfa, kfb, index, m)?;
        world.push(point);
        image.push(pixel);
    }
    Ok((world, image))
}

#[inline]
fn observe(camera: &CameraModel, point: DVec3, pixel: DVec2) -> Observation {
    Observation {
        point,
        ray: camera.unproject(pixel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::KeyFrame;
    use kornia_pnp::CameraIntrinsics;

    fn registrator() -> Registrator {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0));
        Registrator::new(Arc::new(CameraRig::new().with_camera(1, camera)))
    }

    #[test]
    fn test_gather_rejects_out_of_range() {
        let kfa = KeyFrame::new(0, vec![DVec3::Z; 3], Vec::new());
        let kfb = KeyFrame::new(1, Vec::new(), vec![DVec2::ZERO; 2]);
        let matches = [Match::new(0, 0), Match::new(2, 1), Match::new(1, 2)];
        let res = gather_correspondences(&kfa, &kfb, &matches);
        assert!(matches!(
            res,
            Err(RegistrationError::InvalidMatch {
                index: 2,
                landmark: 1,
                keypoint: 2
            })
        ));
    }

    #[test]
    fn test_observation_ray_is_unit() {
        let reg = registrator();
        let kfa = KeyFrame::new(0, vec![DVec3::new(0.5, -0.2, 3.0)], Vec::new());
        let kfb = KeyFrame::new(1, Vec::new(), vec![DVec2::new(400.0, 200.0)]);
        let obs = reg.extract_observations(&kfa, &kfb, &[Match::new(0, 0)], &[0]);
        assert!(obs.is_ok_and(|o| o.len() == 1
            && (o[0].ray.length() - 1.0).abs() < 1e-12
            && o[0].point == DVec3::new(0.5, -0.2, 3.0)));
    }

    #[test]
    fn test_extract_observations_rejects_bad_index() {
        let reg = registrator();
        let kfa = KeyFrame::new(0, vec![DVec3::Z], Vec::new());
        let kfb = KeyFrame::new(1, Vec::new(), vec![DVec2::ZERO]);
        let res = reg.extract_observations(&kfa, &kfb, &[Match::new(0, 0)], &[1]);
        assert!(matches!(
            res,
            Err(RegistrationError::InvalidInlierIndex {
                index: 1,
                num_matches: 1
            })
        ));
    }

    #[test]
    fn test_unknown_camera() {
        let reg = registrator();
        let kfa = KeyFrame::new(1, vec![DVec3::Z; 5], Vec::new());
        let kfb = KeyFrame::new(7, Vec::new(), vec![DVec2::ZERO; 5]);
        let matches: Vec<Match> = (0..5).map(|i| Match::new(i, i)).collect();
        let res = reg.direct_solve(&kfa, &kfb, &matches);
        assert!(matches!(res, Err(RegistrationError::UnknownCamera(7))));
    }

    #[test]
    fn test_is_supported() {
        let res = PreemptiveResult {
            pose: SE3::IDENTITY,
            score: -12.0,
            num_hypotheses: 20,
            observations_used: 5,
            survivors: 10,
        };
        assert!(res.is_supported(-20.0));
        assert!(!res.is_supported(-5.0));
    }
}
