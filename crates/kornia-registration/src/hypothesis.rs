//! Preemptive hypothesize-and-test pose estimation.
//!
//! Many pose hypotheses are solved from minimal samples and scored against a
//! random stream of observations. The pool is halved every `block_size`
//! observations so the bulk of the scoring is spent on promising hypotheses.
//!
//! Reference: [Nistér, Preemptive RANSAC for live structure and motion estimation, ICCV 2003](https://doi.org/10.1109/ICCV.2003.1238341)

use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use kornia_pnp::CameraModel;
use rand::{seq::SliceRandom, Rng};

use crate::config::{PreemptiveParams, MIN_CORRESPONDENCES};
use crate::error::RegistrationError;
use crate::solver::MinimalPoseSolver;

/// A candidate pose with its accumulated score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypothesis {
    /// Pose mapping points of keyframe A into camera B.
    pub pose: SE3,
    /// Negated sum of the robust penalties of all scored observations.
    pub score: f64,
}

impl Hypothesis {
    /// Create an unscored hypothesis.
    pub fn new(pose: SE3) -> Self {
        Self { pose, score: 0.0 }
    }

    /// Fold one observation into the score.
    pub fn score_observation(&mut self, camera: &CameraModel, point: DVec3, pixel: DVec2) {
        self.score -= robust_penalty(camera, &self.pose, point, pixel);
    }
}

/// `ln(1 + e²)` of the pixel reprojection error `e`.
///
/// Always finite and non-negative; non-finite errors saturate.
pub fn robust_penalty(camera: &CameraModel, pose: &SE3, point: DVec3, pixel: DVec2) -> f64 {
    let err2 = (camera.project(*pose * point) - pixel).length_squared();
    err2.min(f64::MAX).ln_1p()
}

/// Number of hypotheses that survive after `i` scored observations.
///
/// `max(1, num_hypotheses / 2^(i / block_size))`; a zero block size behaves as one.
pub fn preemption(i: usize, num_hypotheses: usize, block_size: usize) -> usize {
    let halvings = i / block_size.max(1);
    let survivors = u32::try_from(halvings)
        .ok()
        .and_then(|shift| num_hypotheses.checked_shr(shift))
        .unwrap_or(0);
    survivors.max(1)
}

/// A random permutation of `0..num_observations`.
pub fn evaluation_order<R: Rng>(num_observations: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..num_observations).collect();
    order.shuffle(rng);
    order
}

/// Outcome of preemptive scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreemptiveOutcome {
    /// Highest scoring hypothesis.
    pub best: Hypothesis,
    /// Observations consumed before scoring stopped.
    pub observations_used: usize,
    /// Hypotheses left when scoring stopped.
    pub survivors: usize,
}

/// A set of pose hypotheses scored against a shared observation stream.
#[derive(Debug, Clone, Default)]
pub struct HypothesisPool {
    hypotheses: Vec<Hypothesis>,
    num_generated: usize,
}

impl HypothesisPool {
    /// Wrap existing hypotheses.
    pub fn from_hypotheses(hypotheses: Vec<Hypothesis>) -> Self {
        let num_generated = hypotheses.len();
        Self {
            hypotheses,
            num_generated,
        }
    }

    /// Generate `params.num_hypotheses(world.len())` hypotheses from random minimal samples.
    ///
    /// At least [`MIN_CORRESPONDENCES`] correspondences, and no fewer than
    /// `params.sample_size`, are required.
    ///
    /// Failed solves are retried and do not count towards the target. Generation
    /// gives up with [`RegistrationError::HypothesisGenerationExhausted`] after
    /// `params.max_generation_attempts` solver calls.
    pub fn generate<S, R>(
        solver: &S,
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
        params: &PreemptiveParams,
        rng: &mut R,
    ) -> Result<Self, RegistrationError>
    where
        S: MinimalPoseSolver + ?Sized,
        R: Rng,
    {
        let n = world.len().min(image.len());
        let required = params.sample_size.max(MIN_CORRESPONDENCES);
        if n < required {
            return Err(RegistrationError::InsufficientCorrespondences {
                required,
                actual: n,
            });
        }

        let target = params.num_hypotheses(n);
        let max_attempts = params.max_generation_attempts(target);

        let mut hypotheses = Vec::with_capacity(target);
        let mut sample_world = Vec::with_capacity(params.sample_size);
        let mut sample_image = Vec::with_capacity(params.sample_size);
        let mut attempts = 0;
        let mut failure_streak = 0;

        while hypotheses.len() < target {
            if attempts >= max_attempts {
                log::warn!(
                    "hypothesis generation exhausted after {} attempts ({} / {} hypotheses)",
                    attempts,
                    hypotheses.len(),
                    target
                );
                return Err(RegistrationError::HypothesisGenerationExhausted { attempts });
            }
            attempts += 1;

            sample_world.clear();
            sample_image.clear();
            for idx in rand::seq::index::sample(rng, n, params.sample_size).iter() {
                sample_world.push(world[idx]);
                sample_image.push(image[idx]);
            }

            match solver.solve(&sample_world, &sample_image, camera) {
                Ok(pose) if pose.is_finite() => {
                    hypotheses.push(Hypothesis::new(pose));
                    failure_streak = 0;
                }
                Ok(_) => failure_streak += 1,
                Err(e) => {
                    log::trace!("minimal solve failed: {}", e);
                    failure_streak += 1;
                }
            }

            if failure_streak == target {
                log::warn!("{} consecutive minimal solves failed", failure_streak);
            }
        }

        if hypotheses.is_empty() {
            return Err(RegistrationError::NoHypotheses);
        }

        log::debug!(
            "generated {} hypotheses in {} attempts",
            hypotheses.len(),
            attempts
        );

        Ok(Self::from_hypotheses(hypotheses))
    }

    /// Number of surviving hypotheses.
    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    /// Whether no hypotheses remain.
    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    /// Number of hypotheses the pool started with.
    pub fn num_generated(&self) -> usize {
        self.num_generated
    }

    /// The surviving hypotheses, in no particular order.
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Fold one observation into every surviving hypothesis.
    pub fn score_observation(&mut self, camera: &CameraModel, point: DVec3, pixel: DVec2) {
        for hypothesis in self.hypotheses.iter_mut() {
            hypothesis.score_observation(camera, point, pixel);
        }
    }

    /// Keep the `k` highest scoring hypotheses.
    pub fn retain_best(&mut self, k: usize) {
        if k >= self.hypotheses.len() {
            return;
        }
        if k == 0 {
            self.hypotheses.clear();
            return;
        }
        self.hypotheses
            .select_nth_unstable_by(k - 1, |a, b| b.score.total_cmp(&a.score));
        self.hypotheses.truncate(k);
    }

    /// The highest scoring hypothesis; the first one on ties.
    pub fn best(&self) -> Option<&Hypothesis> {
        self.hypotheses
            .iter()
            .reduce(|best, h| if h.score > best.score { h } else { best })
    }

    /// Score the pool against the observations in `order`, halving it on schedule.
    ///
    /// Scoring stops after `params.max_observations` observations, when `order` is
    /// exhausted, or once a single hypothesis is scheduled to survive. Every index in
    /// `order` that gets scored must be valid for both `world` and `image`, otherwise
    /// [`RegistrationError::InvalidInlierIndex`] is returned.
    pub fn score_and_prune(
        &mut self,
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
        order: &[usize],
        params: &PreemptiveParams,
    ) -> Result<PreemptiveOutcome, RegistrationError> {
        let num_hypotheses = self.hypotheses.len();
        let max_observations = params.max_observations.min(order.len());

        let mut i = 0;
        let mut survivors = preemption(i, num_hypotheses, params.block_size);
        while i < max_observations && survivors > 1 {
            let idx = order[i];
            let (Some(&point), Some(&pixel)) = (world.get(idx), image.get(idx)) else {
                return Err(RegistrationError::InvalidInlierIndex {
                    index: idx,
                    num_matches: world.len().min(image.len()),
                });
            };
            self.score_observation(camera, point, pixel);

            i += 1;
            let next = preemption(i, num_hypotheses, params.block_size);
            if next != survivors {
                let before = self.hypotheses.len();
                self.retain_best(next);
                log::debug!(
                    "observation {}: pruned hypotheses {} -> {}",
                    i,
                    before,
                    self.hypotheses.len()
                );
            }
            survivors = next;
        }

        let best = *self.best().ok_or(RegistrationError::NoHypotheses)?;

        Ok(PreemptiveOutcome {
            best,
            observations_used: i,
            survivors: self.hypotheses.len(),
        })
    }
}
