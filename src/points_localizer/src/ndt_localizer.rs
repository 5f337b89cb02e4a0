//! NDT localizer with a double-buffered engine.
//!
//! Two engine slots are kept:
//!
//! - `active` serves parameter access and alignment
//! - `staged` receives the engine built for a new map
//!
//! Both slots start out as the same instance. [`NdtLocalizer::build_map`]
//! constructs a fresh engine with the active tunables, points it at the new
//! map, warms it up and stages it, leaving the active engine untouched.
//! [`NdtLocalizer::swap_instance`] then makes the staged engine active; the
//! previous one is dropped once no other handle refers to it.
//!
//! The localizer itself spawns nothing. Callers that want to build off the
//! alignment thread use [`build_instance`] there and hand the result to
//! [`NdtLocalizer::stage_instance`].

use std::marker::PhantomData;
use std::sync::Arc;

use nalgebra::{Matrix3, Matrix4, Vector3};
use ndt_cpu::NdtScanMatcher;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::engine::{FitnessScore, RegistrationEngine};
use crate::localizer::Localizer;
use crate::point::{Point, PointCloud};
use crate::pose::{convert_to_matrix, convert_to_pose, Pose};

/// Shared, lockable engine slot.
pub type EngineHandle<E> = Arc<RwLock<E>>;

type EngineFactory<E> = Box<dyn Fn() -> E + Send + Sync>;

/// The four tunables carried from one engine to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub trans_epsilon: f64,
    pub step_size: f64,
    pub resolution: f32,
    pub max_iterations: usize,
}

impl EngineParams {
    pub fn read_from<S, T, E>(engine: &E) -> Self
    where
        S: Point,
        T: Point,
        E: RegistrationEngine<S, T>,
    {
        Self {
            trans_epsilon: engine.transformation_epsilon(),
            step_size: engine.step_size(),
            resolution: engine.resolution(),
            max_iterations: engine.maximum_iterations(),
        }
    }

    pub fn apply_to<S, T, E>(&self, engine: &mut E)
    where
        S: Point,
        T: Point,
        E: RegistrationEngine<S, T>,
    {
        engine.set_transformation_epsilon(self.trans_epsilon);
        engine.set_step_size(self.step_size);
        engine.set_resolution(self.resolution);
        engine.set_maximum_iterations(self.max_iterations);
    }
}

/// Create an engine for `map` with `params`, ready to align.
///
/// The engine is warmed up by aligning a single default point from the
/// identity transform, so structures it builds lazily from the target exist
/// before the engine starts serving.
pub fn build_instance<S, T, E>(
    factory: impl FnOnce() -> E,
    params: EngineParams,
    map: &PointCloud<T>,
) -> Result<E, E::Error>
where
    S: Point,
    T: Point,
    E: RegistrationEngine<S, T>,
{
    let mut engine = factory();
    params.apply_to::<S, T, E>(&mut engine);
    engine.set_input_target(map)?;

    let warm_up = PointCloud::from_points(vec![S::default()]);
    engine.set_input_source(&warm_up)?;
    engine.align(&Matrix4::identity())?;

    Ok(engine)
}

pub struct NdtLocalizer<S, T, E = NdtScanMatcher> {
    active: EngineHandle<E>,
    staged: EngineHandle<E>,
    factory: EngineFactory<E>,
    last_fitness_score: f64,
    swap_count: usize,
    _points: PhantomData<fn() -> (S, T)>,
}

impl<S: Point, T: Point> NdtLocalizer<S, T, NdtScanMatcher> {
    pub fn new() -> Self {
        Self::with_factory(NdtScanMatcher::default)
    }
}

impl<S: Point, T: Point> Default for NdtLocalizer<S, T, NdtScanMatcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T, E> NdtLocalizer<S, T, E>
where
    S: Point,
    T: Point,
    E: RegistrationEngine<S, T> + 'static,
{
    /// Localizer whose engines come from `factory`. The first engine is
    /// created right away and fills both slots.
    pub fn with_factory(factory: impl Fn() -> E + Send + Sync + 'static) -> Self {
        let engine = Arc::new(RwLock::new(factory()));
        Self {
            active: Arc::clone(&engine),
            staged: engine,
            factory: Box::new(factory),
            last_fitness_score: 0.0,
            swap_count: 0,
            _points: PhantomData,
        }
    }

    /// Handle of the engine serving alignment.
    pub fn active_instance(&self) -> EngineHandle<E> {
        Arc::clone(&self.active)
    }

    /// Handle of the engine the next swap will activate.
    pub fn staged_instance(&self) -> EngineHandle<E> {
        Arc::clone(&self.staged)
    }

    pub fn params(&self) -> EngineParams {
        EngineParams::read_from::<S, T, E>(&*self.active.read())
    }

    /// Fitness recorded after the last successful [`Localizer::align`].
    pub fn last_fitness_score(&self) -> f64 {
        self.last_fitness_score
    }

    pub fn swap_count(&self) -> usize {
        self.swap_count
    }

    pub fn has_converged(&self) -> bool {
        self.active.read().has_converged()
    }

    pub fn final_num_iterations(&self) -> usize {
        self.active.read().final_num_iterations()
    }

    /// Put an engine built elsewhere into the staged slot.
    pub fn stage_instance(&mut self, engine: E) {
        self.staged = Arc::new(RwLock::new(engine));
    }
}

impl<S, T, E> Localizer<S, T> for NdtLocalizer<S, T, E>
where
    S: Point,
    T: Point,
    E: RegistrationEngine<S, T> + 'static,
{
    type Error = E::Error;

    fn set_transformation_epsilon(&mut self, epsilon: f64) {
        self.active.write().set_transformation_epsilon(epsilon);
    }

    fn set_step_size(&mut self, step_size: f64) {
        self.active.write().set_step_size(step_size);
    }

    fn set_resolution(&mut self, resolution: f32) {
        self.active.write().set_resolution(resolution);
    }

    fn set_maximum_iterations(&mut self, max_iterations: usize) {
        self.active.write().set_maximum_iterations(max_iterations);
    }

    fn transformation_epsilon(&self) -> f64 {
        self.active.read().transformation_epsilon()
    }

    fn step_size(&self) -> f64 {
        self.active.read().step_size()
    }

    fn resolution(&self) -> f32 {
        self.active.read().resolution()
    }

    fn maximum_iterations(&self) -> usize {
        self.active.read().maximum_iterations()
    }

    fn transformation_probability(&self) -> f64 {
        self.active.read().transformation_probability()
    }

    fn centroids(&self) -> Vec<Vector3<f64>> {
        self.active.read().centroids()
    }

    fn covariances(&self) -> Vec<Matrix3<f64>> {
        self.active.read().covariances()
    }

    fn set_input_target(&mut self, map: &PointCloud<T>) -> Result<(), E::Error> {
        self.active.write().set_input_target(map)
    }

    fn set_input_source(&mut self, scan: &PointCloud<S>) -> Result<(), E::Error> {
        self.active.write().set_input_source(scan)
    }

    fn align(&mut self, predict_pose: &Pose) -> Result<(), E::Error> {
        let guess = convert_to_matrix(predict_pose);

        let mut engine = self.active.write();
        engine.align(&guess)?;
        self.last_fitness_score = engine.fitness_score();

        debug!(
            converged = engine.has_converged(),
            iterations = engine.final_num_iterations(),
            fitness = self.last_fitness_score,
            "Aligned scan"
        );
        Ok(())
    }

    fn final_pose(&self) -> Pose {
        convert_to_pose(&self.active.read().final_transformation())
    }

    fn fitness_score(&self) -> f64 {
        self.active.read().fitness_score()
    }

    fn fitness_score_with(
        &self,
        source: &PointCloud<S>,
        max_range: f64,
    ) -> Result<FitnessScore, E::Error> {
        self.active.read().fitness_score_with(source, max_range)
    }

    fn build_map(&mut self, map: &PointCloud<T>) -> Result<(), E::Error> {
        let params = self.params();
        let engine = build_instance::<S, T, E>(&*self.factory, params, map)?;

        info!(
            points = map.len(),
            resolution = params.resolution,
            "Built staged map instance"
        );
        self.stage_instance(engine);
        Ok(())
    }

    fn swap_instance(&mut self) {
        self.active = Arc::clone(&self.staged);
        self.swap_count += 1;
        info!(swap_count = self.swap_count, "Swapped in staged map instance");
    }

    fn log_file_content(&self) -> String {
        format!("{},{:.6}", self.base_log_content(), self.last_fitness_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointXyzi;
    use approx::assert_relative_eq;
    use ndt_cpu::test_utils::{make_default_half_cubic_pcd, make_default_sensor_pcd, translate_points};
    use ndt_cpu::NdtError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    type Cloud = PointCloud<[f32; 3]>;
    type DefaultLocalizer = NdtLocalizer<[f32; 3], [f32; 3]>;

    fn half_cubic_map() -> Cloud {
        PointCloud::from_points(make_default_half_cubic_pcd())
    }

    fn assert_pose_near(a: &Pose, b: &Pose, eps: f64) {
        assert_relative_eq!(a.x, b.x, epsilon = eps);
        assert_relative_eq!(a.y, b.y, epsilon = eps);
        assert_relative_eq!(a.z, b.z, epsilon = eps);
        assert_relative_eq!(a.roll, b.roll, epsilon = eps);
        assert_relative_eq!(a.pitch, b.pitch, epsilon = eps);
        assert_relative_eq!(a.yaw, b.yaw, epsilon = eps);
    }

    #[test]
    fn test_constructor_aliases_slots() {
        let localizer = DefaultLocalizer::new();

        assert!(Arc::ptr_eq(
            &localizer.active_instance(),
            &localizer.staged_instance()
        ));
        assert_eq!(localizer.swap_count(), 0);
    }

    #[test]
    fn test_tunables_round_trip() {
        let mut localizer = DefaultLocalizer::new();

        localizer.set_transformation_epsilon(0.05);
        localizer.set_step_size(0.25);
        localizer.set_resolution(1.5);
        localizer.set_maximum_iterations(7);

        assert_eq!(localizer.transformation_epsilon(), 0.05);
        assert_eq!(localizer.step_size(), 0.25);
        assert_eq!(localizer.resolution(), 1.5);
        assert_eq!(localizer.maximum_iterations(), 7);

        // no validation on the way through
        localizer.set_resolution(-1.0);
        assert_eq!(localizer.resolution(), -1.0);
    }

    #[test]
    fn test_tunables_survive_alignment() {
        let mut localizer = DefaultLocalizer::new();
        localizer.set_step_size(0.05);
        localizer
            .set_input_target(&PointCloud::from_points(vec![[1.0, 2.0, 3.0]]))
            .unwrap();
        localizer
            .set_input_source(&PointCloud::from_points(vec![[0.0, 0.0, 0.0]]))
            .unwrap();

        localizer.align(&Pose::default()).unwrap();

        assert_eq!(localizer.step_size(), 0.05);
    }

    #[test]
    fn test_build_leaves_active_untouched() {
        let mut localizer = DefaultLocalizer::new();
        let original_target = PointCloud::from_points(vec![[5.0, 5.0, 5.0]]);
        localizer.set_input_target(&original_target).unwrap();
        let before = localizer.active_instance();

        localizer.build_map(&half_cubic_map()).unwrap();

        assert!(Arc::ptr_eq(&before, &localizer.active_instance()));
        assert!(!Arc::ptr_eq(&before, &localizer.staged_instance()));
        assert_eq!(
            localizer.active_instance().read().input_target(),
            Some(&[[5.0f32, 5.0, 5.0]][..])
        );
    }

    #[test]
    fn test_build_warms_up_staged_engine() {
        let mut localizer = DefaultLocalizer::new();

        localizer.build_map(&half_cubic_map()).unwrap();

        let staged = localizer.staged_instance();
        let engine = staged.read();
        assert!(engine.is_target_initialized());
        assert_eq!(engine.input_source(), Some(&[[0.0f32, 0.0, 0.0]][..]));
        assert!(engine.last_result().is_some());
    }

    #[test]
    fn test_swap_activates_built_instance() {
        let mut localizer = DefaultLocalizer::new();
        localizer.set_transformation_epsilon(0.02);
        localizer.set_step_size(0.2);
        localizer.set_resolution(1.0);
        localizer.set_maximum_iterations(12);
        let previous = Arc::downgrade(&localizer.active_instance());
        let map = half_cubic_map();

        localizer.build_map(&map).unwrap();
        let staged = localizer.staged_instance();
        localizer.swap_instance();

        assert!(Arc::ptr_eq(&staged, &localizer.active_instance()));
        assert!(previous.upgrade().is_none());
        assert_eq!(localizer.swap_count(), 1);
        assert_eq!(
            localizer.params(),
            EngineParams {
                trans_epsilon: 0.02,
                step_size: 0.2,
                resolution: 1.0,
                max_iterations: 12,
            }
        );
        assert_eq!(
            localizer.active_instance().read().input_target(),
            Some(map.positions().as_slice())
        );
        assert!(!localizer.centroids().is_empty());
    }

    #[test]
    fn test_outside_handle_keeps_old_instance_alive() {
        let mut localizer = DefaultLocalizer::new();
        let held = localizer.active_instance();

        localizer.update_points_map(&half_cubic_map()).unwrap();

        assert!(!Arc::ptr_eq(&held, &localizer.active_instance()));
        assert_eq!(Arc::strong_count(&held), 1);
        assert!(held.read().input_target().is_none());
    }

    #[test]
    fn test_single_point_alignment_is_pinned() {
        let run = || {
            let mut localizer = DefaultLocalizer::new();
            localizer
                .set_input_target(&PointCloud::from_points(vec![[1.0, 2.0, 3.0]]))
                .unwrap();
            localizer
                .set_input_source(&PointCloud::from_points(vec![[0.0, 0.0, 0.0]]))
                .unwrap();
            localizer.align(&Pose::default()).unwrap();
            (localizer.final_pose(), localizer.last_fitness_score())
        };

        let (pose, fitness) = run();
        assert_pose_near(&pose, &Pose::default(), 1e-12);
        assert_relative_eq!(fitness, 14.0, epsilon = 1e-9);
        assert_eq!(run(), (pose, fitness));
    }

    #[test]
    fn test_localize_recovers_offset() {
        let mut localizer = DefaultLocalizer::new();
        localizer.update_points_map(&half_cubic_map()).unwrap();
        let scan = PointCloud::from_points(translate_points(
            &make_default_sensor_pcd(),
            [-0.3, 0.2, 0.0],
        ));

        let pose = localizer.localize(&scan, &Pose::default()).unwrap();

        assert_pose_near(&pose, &Pose::new(0.3, -0.2, 0.0, 0.0, 0.0, 0.0), 0.05);
        assert!(localizer.transformation_probability() > 0.0);
        assert!(localizer.last_fitness_score() < 0.05);
    }

    #[test]
    fn test_localize_from_predicted_pose() {
        let mut localizer = DefaultLocalizer::new();
        let map = PointCloud::from_points(translate_points(
            &make_default_half_cubic_pcd(),
            [100.0, 100.0, 0.0],
        ));
        localizer.update_points_map(&map).unwrap();
        let scan = PointCloud::from_points(make_default_sensor_pcd());

        let pose = localizer
            .localize(&scan, &Pose::new(100.1, 99.9, 0.0, 0.0, 0.0, 0.0))
            .unwrap();

        assert_pose_near(&pose, &Pose::new(100.0, 100.0, 0.0, 0.0, 0.0, 0.0), 0.1);
    }

    #[test]
    fn test_engine_errors_pass_through() {
        let mut localizer = DefaultLocalizer::new();

        assert_eq!(localizer.align(&Pose::default()), Err(NdtError::NoTarget));

        localizer
            .set_input_target(&PointCloud::from_points(vec![[0.0, 0.0, 0.0]]))
            .unwrap();
        assert_eq!(localizer.align(&Pose::default()), Err(NdtError::NoSource));

        assert_eq!(localizer.build_map(&PointCloud::new()), Err(NdtError::EmptyTarget));
        assert!(Arc::ptr_eq(
            &localizer.active_instance(),
            &localizer.staged_instance()
        ));
    }

    #[test]
    fn test_fitness_with_range() {
        let mut localizer: NdtLocalizer<PointXyzi, PointXyzi> = NdtLocalizer::new();
        localizer
            .set_input_target(&PointCloud::from_points(vec![PointXyzi::new(0.0, 0.0, 0.0, 1.0)]))
            .unwrap();
        let scan = PointCloud::from_points(vec![
            PointXyzi::new(0.5, 0.0, 0.0, 0.0),
            PointXyzi::new(9.0, 0.0, 0.0, 0.0),
        ]);

        let fitness = localizer.fitness_score_with(&scan, 1.0).unwrap();

        assert_eq!(fitness.inliers, 1);
        assert_relative_eq!(fitness.score, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_log_file_content() {
        let mut localizer = DefaultLocalizer::new();
        localizer
            .set_input_target(&PointCloud::from_points(vec![[1.0, 2.0, 3.0]]))
            .unwrap();
        localizer
            .set_input_source(&PointCloud::from_points(vec![[0.0, 0.0, 0.0]]))
            .unwrap();
        localizer
            .align(&Pose::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();

        let line = localizer.log_file_content();

        assert_eq!(
            line,
            format!("{},{:.6}", localizer.final_pose(), localizer.last_fitness_score())
        );
        assert!(line.starts_with("1.000000,"), "{line}");
        assert!(line.ends_with(",13.000000"), "{line}");
        assert_eq!(line.split(',').count(), 7);
    }

    #[test]
    fn test_build_on_worker_thread() {
        let mut localizer = DefaultLocalizer::new();
        localizer.update_points_map(&half_cubic_map()).unwrap();
        let params = localizer.params();
        let next_map = Arc::new(PointCloud::from_points(translate_points(
            &make_default_half_cubic_pcd(),
            [50.0, 0.0, 0.0],
        )));

        let worker = {
            let map = Arc::clone(&next_map);
            thread::spawn(move || {
                build_instance::<[f32; 3], [f32; 3], _>(NdtScanMatcher::default, params, &map)
            })
        };

        // the active engine keeps serving meanwhile
        let scan = PointCloud::from_points(make_default_sensor_pcd());
        let pose = localizer.localize(&scan, &Pose::default()).unwrap();
        assert_pose_near(&pose, &Pose::default(), 0.05);

        let engine = worker.join().unwrap().unwrap();
        localizer.stage_instance(engine);
        localizer.swap_instance();

        let pose = localizer
            .localize(&scan, &Pose::new(50.0, 0.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        assert_pose_near(&pose, &Pose::new(50.0, 0.0, 0.0, 0.0, 0.0, 0.0), 0.05);
    }

    #[derive(Debug, thiserror::Error, PartialEq)]
    enum MockError {
        #[error("no map loaded")]
        NoMap,
    }

    #[derive(Default)]
    struct MockEngine {
        epsilon: f64,
        step: f64,
        resolution: f32,
        iterations: usize,
        target_len: Option<usize>,
        aligned_from: Option<Matrix4<f64>>,
    }

    impl RegistrationEngine<[f32; 3], [f32; 3]> for MockEngine {
        type Error = MockError;

        fn set_transformation_epsilon(&mut self, epsilon: f64) {
            self.epsilon = epsilon;
        }
        fn transformation_epsilon(&self) -> f64 {
            self.epsilon
        }
        fn set_step_size(&mut self, step_size: f64) {
            self.step = step_size;
        }
        fn step_size(&self) -> f64 {
            self.step
        }
        fn set_resolution(&mut self, resolution: f32) {
            self.resolution = resolution;
        }
        fn resolution(&self) -> f32 {
            self.resolution
        }
        fn set_maximum_iterations(&mut self, max_iterations: usize) {
            self.iterations = max_iterations;
        }
        fn maximum_iterations(&self) -> usize {
            self.iterations
        }
        fn set_input_target(&mut self, target: &Cloud) -> Result<(), MockError> {
            self.target_len = Some(target.len());
            Ok(())
        }
        fn set_input_source(&mut self, _source: &Cloud) -> Result<(), MockError> {
            Ok(())
        }
        fn align(&mut self, initial_guess: &Matrix4<f64>) -> Result<(), MockError> {
            self.target_len.ok_or(MockError::NoMap)?;
            self.aligned_from = Some(*initial_guess);
            Ok(())
        }
        fn final_transformation(&self) -> Matrix4<f64> {
            self.aligned_from.unwrap_or_else(Matrix4::identity)
        }
        fn fitness_score(&self) -> f64 {
            0.5
        }
        fn fitness_score_with(&self, source: &Cloud, _max_range: f64) -> Result<FitnessScore, MockError> {
            Ok(FitnessScore {
                score: 0.5,
                inliers: source.len(),
            })
        }
        fn transformation_probability(&self) -> f64 {
            1.0
        }
        fn centroids(&self) -> Vec<Vector3<f64>> {
            Vec::new()
        }
        fn covariances(&self) -> Vec<Matrix3<f64>> {
            Vec::new()
        }
        fn has_converged(&self) -> bool {
            self.aligned_from.is_some()
        }
        fn final_num_iterations(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_injected_engine() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let mut localizer: NdtLocalizer<[f32; 3], [f32; 3], MockEngine> =
            NdtLocalizer::with_factory(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                MockEngine::default()
            });
        assert_eq!(created.load(Ordering::SeqCst), 1);

        assert_eq!(localizer.align(&Pose::default()), Err(MockError::NoMap));

        localizer.set_maximum_iterations(9);
        localizer.build_map(&PointCloud::from_points(vec![[0.0; 3]; 4])).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(localizer.staged_instance().read().iterations, 9);
        assert_eq!(localizer.staged_instance().read().target_len, Some(4));
        assert_eq!(localizer.maximum_iterations(), 9);

        localizer.swap_instance();
        let predicted = Pose::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.5);
        let pose = localizer
            .localize(&PointCloud::from_points(vec![[0.0; 3]]), &predicted)
            .unwrap();

        assert_pose_near(&pose, &predicted, 1e-12);
        assert!(localizer.has_converged());
        assert_eq!(localizer.last_fitness_score(), 0.5);
        assert!(localizer.log_file_content().ends_with(",0.500000"));
    }
}
