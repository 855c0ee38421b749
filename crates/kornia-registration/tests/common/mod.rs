#![allow(dead_code)]

use glam::{DVec2, DVec3};
use kornia_lie::{SE3, SO3};
use kornia_pnp::{CameraIntrinsics, CameraModel};
use kornia_registration::{CameraRig, KeyFrame, Match};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const CAMERA_A: u32 = 0;
pub const CAMERA_B: u32 = 1;

pub struct Scene {
    pub rig: CameraRig,
    pub kfa: KeyFrame,
    pub kfb: KeyFrame,
    pub matches: Vec<Match>,
    /// Ground truth pose mapping keyframe A into camera B.
    pub b_from_a: SE3,
    /// Indices of the matches whose keypoints were perturbed.
    pub outliers: Vec<usize>,
}

pub fn camera() -> CameraModel {
    CameraModel::pinhole(CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0))
}

pub fn ground_truth() -> SE3 {
    SE3::new(
        SO3::exp(DVec3::new(0.05, -0.1, 0.08)),
        DVec3::new(0.3, -0.1, 0.2),
    )
}

/// `n` matches; `round(n * outlier_ratio)` of them, chosen at random, have their
/// keypoint moved 30 to 100 pixels away from the true projection.
pub fn scene(n: usize, outlier_ratio: f64, seed: u64) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let cam = camera();
    let b_from_a = ground_truth();

    let landmarks: Vec<DVec3> = (0..n)
        .map(|_| {
            DVec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(4.0..8.0),
            )
        })
        .collect();

    // keypoints are stored in reverse order so match indices differ
    let mut keypoints = vec![DVec2::ZERO; n];
    let matches: Vec<Match> = (0..n).map(|i| Match::new(i, n - 1 - i)).collect();
    for m in &matches {
        keypoints[m.keypoint] = cam.project(b_from_a * landmarks[m.landmark]);
    }

    let num_outliers = (n as f64 * outlier_ratio).round() as usize;
    let outliers: Vec<usize> = rand::seq::index::sample(&mut rng, n, num_outliers).into_vec();
    for &i in &outliers {
        let angle = rng.random_range(0.0..std::f64::consts::TAU);
        let radius = rng.random_range(30.0..100.0);
        keypoints[matches[i].keypoint] += DVec2::new(angle.cos(), angle.sin()) * radius;
    }

    Scene {
        rig: CameraRig::new()
            .with_camera(CAMERA_A, cam.clone())
            .with_camera(CAMERA_B, cam),
        kfa: KeyFrame::new(CAMERA_A, landmarks, Vec::new()),
        kfb: KeyFrame::new(CAMERA_B, Vec::new(), keypoints),
        matches,
        b_from_a,
        outliers,
    }
}

pub fn rotation_error(a: &SE3, b: &SE3) -> f64 {
    a.rotation.angle_to(&b.rotation)
}

pub fn translation_error(a: &SE3, b: &SE3) -> f64 {
    (a.translation - b.translation).length()
}
