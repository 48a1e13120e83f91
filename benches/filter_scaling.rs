//! Predict/update cost of the planar SLAM filter versus map size
//!
//! The state grows by two dimensions per landmark and both steps are dense,
//! so the cost is expected to grow roughly cubically with the landmark count.
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --bench filter_scaling
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use inekf::manifold::{Planar, SO2};
use inekf::measure::LandmarkSensor;
use inekf::process::OdometryProcess;
use inekf::{AugmentedState, ErrorFrame, InEKF, init_logger};
use nalgebra::{DMatrix, DVector};
use std::hint::black_box;
use tracing::info;

const MAP_SIZES: [usize; 4] = [0, 10, 50, 100];

fn slam_filter(landmarks: usize) -> InEKF<OdometryProcess<SO2>> {
    let process =
        OdometryProcess::<SO2>::with_noise_std(&DVector::from_vec(vec![0.01, 0.05, 0.05]));
    let mut state = AugmentedState::new(
        Planar::se2_slam(0.0, 0.0, 0.0),
        DMatrix::identity(3, 3) * 0.01,
    )
    .expect("valid prior");
    for i in 0..landmarks {
        let angle = i as f64 * 0.37;
        let position = DVector::from_vec(vec![10.0 * angle.cos(), 10.0 * angle.sin()]);
        state
            .add_column(&position, &DMatrix::identity(2, 2))
            .expect("dynamic layout");
    }
    let mut filter = InEKF::new(process, state, ErrorFrame::Right);
    filter.add_measure_model("landmark", LandmarkSensor::new(0.1, 0.01));
    filter
}

fn bench_predict(c: &mut Criterion) {
    init_logger();
    info!("Filter scaling over map sizes {:?}", MAP_SIZES);

    let mut group = c.benchmark_group("predict");
    let u = Planar::se2(0.01, 0.1, 0.0);
    for &size in &MAP_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut filter = slam_filter(size);
            info!("{} landmarks, state dimension {}", size, filter.state().dim());
            b.iter(|| {
                filter.predict(black_box(&u), 0.1).expect("predict");
            })
        });
    }
    group.finish();
}

fn bench_landmark_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("landmark_update");
    let z = DVector::from_vec(vec![10.0, 0.0]);
    for &size in MAP_SIZES.iter().filter(|&&s| s > 0) {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let filter = slam_filter(size);
            b.iter_batched(
                || filter_clone_state(&filter),
                |mut filter| {
                    filter
                        .update_landmark("landmark", 1, black_box(&z))
                        .expect("update");
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn filter_clone_state(template: &InEKF<OdometryProcess<SO2>>) -> InEKF<OdometryProcess<SO2>> {
    let mut filter = InEKF::new(
        template.process().clone(),
        template.state().clone(),
        template.error_frame(),
    );
    filter.add_measure_model("landmark", LandmarkSensor::new(0.1, 0.01));
    filter
}

criterion_group!(benches, bench_predict, bench_landmark_update);
criterion_main!(benches);
