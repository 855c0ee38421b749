use std::sync::Arc;

use argh::FromArgs;
use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use kornia_pnp::{CameraIntrinsics, CameraModel, PolynomialDistortion};
use kornia_registration::{CameraRig, KeyFrame, Match, Registrator};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(FromArgs)]
/// Register a synthetic keyframe pair with preemptive RANSAC
struct Args {
    /// number of landmark to keypoint matches
    #[argh(option, default = "200")]
    num_matches: usize,

    /// fraction of matches with a wrong keypoint
    #[argh(option, default = "0.3")]
    outlier_ratio: f64,

    /// pixel noise added to every keypoint
    #[argh(option, default = "0.5")]
    noise_px: f64,

    /// random seed
    #[argh(option, default = "0")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut rng = StdRng::seed_from_u64(args.seed);

    let camera = CameraModel::with_distortion(
        CameraIntrinsics::new(718.0, 718.0, 607.0, 185.0),
        PolynomialDistortion::radial(-0.03, 0.001),
    );
    let cameras = Arc::new(CameraRig::new().with_camera(0, camera.clone()));

    let b_from_a = SE3::from_random(&mut rng, 0.5);
    println!("ground truth a_from_b: {:?}", b_from_a.inverse());

    // landmarks placed along the rays of camera B so every match is visible
    let a_from_b = b_from_a.inverse();
    let mut landmarks = Vec::with_capacity(args.num_matches);
    let mut keypoints = Vec::with_capacity(args.num_matches);
    for _ in 0..args.num_matches {
        let pixel = DVec2::new(rng.random_range(0.0..1214.0), rng.random_range(0.0..370.0));
        let depth = rng.random_range(5.0..30.0);
        let ray = camera.unproject(pixel);
        landmarks.push(a_from_b * (ray * (depth / ray.z)));

        let noise = DVec2::new(
            rng.random_range(-args.noise_px..=args.noise_px),
            rng.random_range(-args.noise_px..=args.noise_px),
        );
        let outlier = if rng.random_bool(args.outlier_ratio.clamp(0.0, 1.0)) {
            DVec2::new(rng.random_range(-100.0..100.0), rng.random_range(-100.0..100.0))
        } else {
            DVec2::ZERO
        };
        keypoints.push(pixel + noise + outlier);
    }

    let kfa = KeyFrame::new(0, landmarks, Vec::new());
    let kfb = KeyFrame::new(0, Vec::new(), keypoints);
    let matches: Vec<Match> = (0..args.num_matches).map(|i| Match::new(i, i)).collect();

    let registrator = Registrator::new(cameras);

    let now = std::time::Instant::now();
    let registration = registrator.register(&kfa, &kfb, &matches, &mut rng)?;
    println!("preemptive registration took {:?}", now.elapsed());
    println!("estimated a_from_b: {:?}", registration.pose);
    println!(
        "inliers: {} / {}, rotation error: {:.2e} rad, translation error: {:.2e}",
        registration.inliers.len(),
        matches.len(),
        registration.pose.rotation.angle_to(&a_from_b.rotation),
        (registration.pose.translation - a_from_b.translation).length()
    );

    let now = std::time::Instant::now();
    match registrator.robust_solve(&kfa, &kfb, &matches, 0.5, 4.0, &mut rng) {
        Ok(robust) => println!(
            "robust solve took {:?}: {} inliers, rotation error: {:.2e} rad",
            now.elapsed(),
            robust.inliers.len(),
            robust.pose.rotation.angle_to(&a_from_b.rotation)
        ),
        Err(e) => println!("robust solve failed: {e}"),
    }

    let origin: DVec3 = registration.pose * DVec3::ZERO;
    println!("camera B center in keyframe A: {origin:?}");

    Ok(())
}
