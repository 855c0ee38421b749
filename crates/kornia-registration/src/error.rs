use kornia_pnp::PnPError;
use thiserror::Error;

use crate::keyframe::CameraId;

/// Errors raised while registering two keyframes.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Not enough matches to attempt any solve.
    #[error("registration requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences supplied.
        actual: usize,
    },

    /// The pose solver could not produce a valid pose.
    #[error("pose solver diverged: {0}")]
    SolverDivergence(#[from] PnPError),

    /// The robust solve found too few inliers to accept its pose.
    #[error("robust solve found {inliers} inliers, needs more than {required:.1}")]
    LowConsensus {
        /// Inliers reported by the robust solver.
        inliers: usize,
        /// Inlier count that has to be exceeded.
        required: f64,
    },

    /// Hypothesis generation hit its retry ceiling.
    #[error("hypothesis generation gave up after {attempts} solver attempts")]
    HypothesisGenerationExhausted {
        /// Solver attempts made before giving up.
        attempts: usize,
    },

    /// Hypothesis generation produced an empty pool.
    #[error("no pose hypotheses were generated")]
    NoHypotheses,

    /// The keyframe refers to a camera missing from the rig.
    #[error("camera {0} is not registered in the camera rig")]
    UnknownCamera(CameraId),

    /// A match points outside the keyframe landmarks or keypoints.
    #[error("match #{index} ({landmark} -> {keypoint}) is out of range")]
    InvalidMatch {
        /// Position of the match in the input slice.
        index: usize,
        /// Landmark index in keyframe A.
        landmark: usize,
        /// Keypoint index in keyframe B.
        keypoint: usize,
    },

    /// An inlier index points outside the match list.
    #[error("inlier index {index} is out of range for {num_matches} matches")]
    InvalidInlierIndex {
        /// The offending inlier index.
        index: usize,
        /// Number of matches supplied.
        num_matches: usize,
    },
}
