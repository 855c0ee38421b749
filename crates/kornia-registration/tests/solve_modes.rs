mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use kornia_pnp::{CameraModel, PnPError, PnPRansacResult, RansacParams};
use kornia_registration::{
    EPnPSolver, MinimalPoseSolver, RegistrationError, Registrator, RegistratorConfig,
    RobustPoseSolver,
};
use rand::{rngs::StdRng, SeedableRng};

/// Counts calls and fails every one of them.
#[derive(Clone, Default)]
struct CountingSolver {
    calls: Rc<Cell<usize>>,
}

impl MinimalPoseSolver for CountingSolver {
    fn solve(&self, _: &[DVec3], _: &[DVec2], _: &CameraModel) -> Result<SE3, PnPError> {
        self.calls.set(self.calls.get() + 1);
        Err(PnPError::Degenerate("counting solver".to_string()))
    }
}

impl RobustPoseSolver for CountingSolver {
    fn solve_robust(
        &self,
        _: &[DVec3],
        _: &[DVec2],
        _: &CameraModel,
        _: &RansacParams,
    ) -> Result<PnPRansacResult, PnPError> {
        self.calls.set(self.calls.get() + 1);
        Err(PnPError::Degenerate("counting solver".to_string()))
    }
}

/// Records the parameters it was called with and reports a fixed result.
struct RecordingRobustSolver {
    params: Rc<Cell<Option<(usize, f64, Option<usize>, f64)>>>,
    inliers: Vec<usize>,
}

impl RecordingRobustSolver {
    fn new(inliers: Vec<usize>) -> Self {
        Self {
            params: Rc::new(Cell::new(None)),
            inliers,
        }
    }
}

impl RobustPoseSolver for RecordingRobustSolver {
    fn solve_robust(
        &self,
        _: &[DVec3],
        _: &[DVec2],
        _: &CameraModel,
        params: &RansacParams,
    ) -> Result<PnPRansacResult, PnPError> {
        self.params.set(Some((
            params.max_iterations,
            params.reproj_threshold_px,
            params.target_inliers,
            params.confidence,
        )));
        Ok(PnPRansacResult {
            pose: common::ground_truth(),
            inliers: self.inliers.clone(),
            num_iterations: 1,
            reproj_rmse: None,
        })
    }
}

#[test]
fn fewer_than_five_matches_never_reach_a_solver() {
    let s = common::scene(4, 0.0, 1);
    let minimal = CountingSolver::default();
    let robust = CountingSolver::default();
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        RegistratorConfig::default(),
        minimal.clone(),
        robust.clone(),
    );
    let mut rng = StdRng::seed_from_u64(0);

    let preemptive = registrator.preemptive_solve(&s.kfa, &s.kfb, &s.matches, &mut rng);
    let direct = registrator.direct_solve(&s.kfa, &s.kfb, &s.matches);
    let robust_res = registrator.robust_solve(&s.kfa, &s.kfb, &s.matches, 0.5, 4.0, &mut rng);
    let register = registrator.register(&s.kfa, &s.kfb, &s.matches, &mut rng);
    let robust_register = registrator.robust_register(&s.kfa, &s.kfb, &s.matches, &mut rng);

    for err in [
        preemptive.err(),
        direct.err(),
        robust_res.err(),
        register.err(),
        robust_register.err(),
    ] {
        assert!(matches!(
            err,
            Some(RegistrationError::InsufficientCorrespondences {
                required: 5,
                actual: 4
            })
        ));
    }
    assert_eq!(minimal.calls.get(), 0);
    assert_eq!(robust.calls.get(), 0);
}

#[test]
fn failing_minimal_solver_exhausts_generation() {
    let s = common::scene(5, 0.0, 2);
    let solver = CountingSolver::default();
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        RegistratorConfig::default(),
        solver.clone(),
        CountingSolver::default(),
    );
    let mut rng = StdRng::seed_from_u64(0);

    let res = registrator.preemptive_solve(&s.kfa, &s.kfb, &s.matches, &mut rng);
    // 5 matches x 4 hypotheses x 100 attempts each
    assert!(matches!(
        res,
        Err(RegistrationError::HypothesisGenerationExhausted { attempts: 2000 })
    ));
    assert_eq!(solver.calls.get(), 2000);
}

#[test]
fn direct_solve_surfaces_solver_failure() {
    let s = common::scene(10, 0.0, 3);
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        RegistratorConfig::default(),
        CountingSolver::default(),
        CountingSolver::default(),
    );
    let res = registrator.direct_solve(&s.kfa, &s.kfb, &s.matches);
    assert!(matches!(
        res,
        Err(RegistrationError::SolverDivergence(PnPError::Degenerate(_)))
    ));
}

#[test]
fn robust_solve_budget_and_inversion() -> Result<(), RegistrationError> {
    let s = common::scene(50, 0.0, 4);
    let robust = RecordingRobustSolver::new((0..30).collect());
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        RegistratorConfig::default(),
        EPnPSolver::default(),
        robust,
    );
    let mut rng = StdRng::seed_from_u64(0);

    let res = registrator.robust_solve(&s.kfa, &s.kfb, &s.matches, 0.5, 2.5, &mut rng)?;
    assert_eq!(res.pose, common::ground_truth().inverse());
    assert_eq!(res.inliers.len(), 30);

    // strictly more than 30 inliers are needed at 0.6
    let res = registrator.robust_solve(&s.kfa, &s.kfb, &s.matches, 0.6, 2.5, &mut rng);
    assert!(matches!(
        res,
        Err(RegistrationError::LowConsensus { inliers: 30, .. })
    ));
    Ok(())
}

#[test]
fn robust_solve_passes_budget_to_solver() -> Result<(), RegistrationError> {
    let s = common::scene(50, 0.0, 5);
    let robust = RecordingRobustSolver::new((0..50).collect());
    let recorded = robust.params.clone();
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        RegistratorConfig::default(),
        EPnPSolver::default(),
        robust,
    );
    let mut rng = StdRng::seed_from_u64(0);
    registrator.robust_solve(&s.kfa, &s.kfb, &s.matches, 0.5, 2.5, &mut rng)?;

    // 4 x 50 iterations with no adaptive termination, early exit at 0.8 x 50 inliers
    assert_eq!(recorded.get(), Some((200, 2.5, Some(40), 1.0)));
    Ok(())
}

#[test]
fn robust_register_reads_thresholds_from_config() -> Result<(), RegistrationError> {
    let s = common::scene(50, 0.0, 7);
    let robust = RecordingRobustSolver::new((0..35).collect());
    let recorded = robust.params.clone();
    let mut config = RegistratorConfig::default();
    config.robust.reproj_threshold_px = 1.5;
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        config.clone(),
        EPnPSolver::default(),
        robust,
    );
    let mut rng = StdRng::seed_from_u64(0);

    let reg = registrator.robust_register(&s.kfa, &s.kfb, &s.matches, &mut rng)?;
    assert_eq!(recorded.get().map(|p| p.1), Some(1.5));
    assert_eq!(reg.pose, common::ground_truth().inverse());
    assert_eq!(reg.inliers, s.matches[..35].to_vec());
    assert_eq!(reg.observations.len(), 35);

    // 35 inliers do not exceed 0.99 x 50
    config.robust.min_inlier_fraction = 0.99;
    let registrator = registrator.with_config(config);
    let res = registrator.robust_register(&s.kfa, &s.kfb, &s.matches, &mut rng);
    assert!(matches!(
        res,
        Err(RegistrationError::LowConsensus { inliers: 35, .. })
    ));
    Ok(())
}

#[test]
fn robust_solve_without_convergence_is_low_consensus() {
    let s = common::scene(50, 0.0, 6);
    let registrator = Registrator::with_solvers(
        Arc::new(s.rig),
        RegistratorConfig::default(),
        EPnPSolver::default(),
        RecordingRobustSolver::new(Vec::new()),
    );
    let mut rng = StdRng::seed_from_u64(0);
    let res = registrator.robust_solve(&s.kfa, &s.kfb, &s.matches, 0.5, 2.5, &mut rng);
    assert!(matches!(
        res,
        Err(RegistrationError::LowConsensus { inliers: 0, .. })
    ));
}
