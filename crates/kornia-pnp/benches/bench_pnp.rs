use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use glam::{DVec2, DVec3};
use kornia_lie::{SE3, SO3};
use kornia_pnp as kpnp;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};

type PnpDataset = (Vec<DVec3>, Vec<DVec2>, kpnp::CameraModel);
const NUM_SEEDS: usize = 1;

fn generate_cube_dataset_with_seed(num_points: usize, noise_px: f64, seed: u64) -> PnpDataset {
    let camera = kpnp::CameraModel::pinhole(kpnp::CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0));

    // points in a 1m cube around z in [3,6]
    let mut rng = StdRng::seed_from_u64(seed);
    let world: Vec<DVec3> = (0..num_points)
        .map(|_| {
            DVec3::new(
                rng.random_range(-0.5..0.5),
                rng.random_range(-0.5..0.5),
                rng.random_range(3.0..6.0),
            )
        })
        .collect();

    let gt = SE3::new(SO3::exp(DVec3::new(0.05, 0.26, 0.11)), DVec3::new(0.2, -0.1, 0.3));
    let image = world
        .iter()
        .map(|&p| {
            let noise = DVec2::new(
                rng.random_range(-noise_px..noise_px),
                rng.random_range(-noise_px..noise_px),
            );
            camera.project(gt * p) + noise
        })
        .collect();

    (world, image, camera)
}

fn inject_outliers_random(image: &mut [DVec2], fraction: f64, seed: u64) {
    let num_out = (fraction.clamp(0.0, 1.0) * image.len() as f64) as usize;
    if num_out == 0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut idxs: Vec<usize> = (0..image.len()).collect();
    idxs.shuffle(&mut rng);
    for &i in idxs.iter().take(num_out) {
        let angle = rng.random_range(0.0..std::f64::consts::TAU);
        let radius = rng.random_range(300.0..800.0);
        image[i] += DVec2::new(angle.cos(), angle.sin()) * radius;
    }
}

fn bench_epnp(c: &mut Criterion) {
    let mut group = c.benchmark_group("pnp_epnp");
    for &n in &[8usize, 32, 128, 512, 2048] {
        let (world, image, camera) = generate_cube_dataset_with_seed(n, 0.5, 42);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let res = kpnp::solve_pnp(&world, &image, &camera, kpnp::PnPMethod::EPnPDefault);
                std::hint::black_box(res)
            });
        });
    }
    group.finish();
}

fn bench_ransac(c: &mut Criterion) {
    let mut group = c.benchmark_group("pnp_ransac");
    for &n in &[32usize, 128, 512, 2048] {
        let seeds: Vec<u64> = (0..NUM_SEEDS).map(|i| 10_000u64 + i as u64).collect();
        group.throughput(Throughput::Elements(n as u64));
        for &seed in &seeds {
            let (world, mut image, camera) = generate_cube_dataset_with_seed(n, 0.5, seed);
            inject_outliers_random(&mut image, 0.20, seed.wrapping_add(12345));

            let params = kpnp::RansacParams {
                max_iterations: 200,
                reproj_threshold_px: 3.0,
                confidence: 0.99,
                random_seed: Some(seed),
                ..Default::default()
            };

            group.bench_with_input(
                BenchmarkId::new("n", format!("{}_s{}", n, seed)),
                &seed,
                |b, _| {
                    b.iter(|| {
                        let res = kpnp::solve_pnp_ransac(
                            &world,
                            &image,
                            &camera,
                            kpnp::PnPMethod::EPnPDefault,
                            &params,
                        );
                        std::hint::black_box(res)
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_epnp, bench_ransac);
criterion_main!(benches);
