use serde::{Deserialize, Serialize};

/// Fewest matches any solve mode accepts.
pub const MIN_CORRESPONDENCES: usize = 5;

/// Parameters of the preemptive hypothesize-and-test estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptiveParams {
    /// Matches drawn per minimal solve.
    pub sample_size: usize,
    /// Hypotheses generated per input match.
    pub hypotheses_per_match: usize,
    /// Upper bound on the observations used for scoring.
    pub max_observations: usize,
    /// Observations scored between two halvings of the hypothesis pool.
    pub block_size: usize,
    /// Solver attempts allowed per requested hypothesis before generation gives up.
    pub max_generation_attempts_factor: usize,
}

impl Default for PreemptiveParams {
    fn default() -> Self {
        Self {
            sample_size: 4,
            hypotheses_per_match: 4,
            max_observations: 500,
            block_size: 10,
            max_generation_attempts_factor: 100,
        }
    }
}

impl PreemptiveParams {
    /// Number of hypotheses to generate for `num_matches` matches.
    pub fn num_hypotheses(&self, num_matches: usize) -> usize {
        num_matches.saturating_mul(self.hypotheses_per_match)
    }

    /// Retry ceiling for generating `num_hypotheses` hypotheses.
    pub fn max_generation_attempts(&self, num_hypotheses: usize) -> usize {
        num_hypotheses
            .saturating_mul(self.max_generation_attempts_factor)
            .max(num_hypotheses)
    }
}

/// Parameters of the library RANSAC solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustParams {
    /// Fraction of matches the inlier count has to exceed.
    pub min_inlier_fraction: f64,
    /// Pixel threshold for RANSAC inliers.
    pub reproj_threshold_px: f64,
    /// RANSAC iterations per input match.
    pub sample_budget_factor: usize,
    /// Fraction of matches that stops RANSAC early.
    pub target_inlier_fraction: f64,
    /// Refit the pose on all inliers.
    pub refine: bool,
}

impl Default for RobustParams {
    fn default() -> Self {
        Self {
            min_inlier_fraction: 0.5,
            reproj_threshold_px: 4.0,
            sample_budget_factor: 4,
            target_inlier_fraction: 0.8,
            refine: true,
        }
    }
}

/// Configuration of a [`crate::Registrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistratorConfig {
    /// Preemptive estimator parameters.
    pub preemptive: PreemptiveParams,
    /// Library RANSAC parameters.
    pub robust: RobustParams,
    /// Pixel threshold used by [`crate::Registrator::register`] to extract inliers.
    pub inlier_threshold_px: f64,
}

impl Default for RegistratorConfig {
    fn default() -> Self {
        Self {
            preemptive: PreemptiveParams::default(),
            robust: RobustParams::default(),
            inlier_threshold_px: 4.0,
        }
    }
}
