#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Registration
//!
//! Relative pose between two keyframes from putative matches between the
//! landmarks of keyframe A and the keypoints of keyframe B.
//!
//! ## Solve modes
//!
//! - **Preemptive**: preemptive RANSAC over minimal EPnP hypotheses, returns `a_from_b`.
//! - **Direct**: a single EPnP solve over all matches, returns `b_from_a`.
//! - **Robust**: RANSAC over EPnP with a consensus check, returns `a_from_b` and the inliers.
//!
//! Randomness is always passed in by the caller, so seeding the generator
//! makes every solve reproducible.

/// Camera models indexed by camera identity.
pub mod camera_rig;

/// Registration parameters.
pub mod config;

/// Error types for the registration.
pub mod error;

/// Pose hypotheses and preemptive scoring.
pub mod hypothesis;

/// Keyframe, match and observation types.
pub mod keyframe;

/// The registrator and its solve modes.
pub mod registrator;

/// Pose solver capabilities.
pub mod solver;

pub use camera_rig::CameraRig;
pub use config::{PreemptiveParams, RegistratorConfig, RobustParams, MIN_CORRESPONDENCES};
pub use error::RegistrationError;
pub use hypothesis::{Hypothesis, HypothesisPool};
pub use keyframe::{CameraId, KeyFrame, Keyframe, Match, Observation};
pub use registrator::{PreemptiveResult, Registration, Registrator, RobustResult};
pub use solver::{EPnPSolver, MinimalPoseSolver, RansacPnPSolver, RobustPoseSolver};
