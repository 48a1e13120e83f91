use std::time::Instant;

use clap::{Parser, ValueEnum};
use inekf::manifold::{ManifoldResult, Planar, SO2};
use inekf::measure::{InvariantMeasure, LandmarkSensor};
use inekf::process::CarProcess;
use inekf::{
    Association, AssociationConfig, AugmentedState, ErrorFrame, InEKF, associate, init_logger,
};
use nalgebra::{DMatrix, DVector, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Frame {
    Left,
    Right,
}

impl From<Frame> for ErrorFrame {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Left => ErrorFrame::Left,
            Frame::Right => ErrorFrame::Right,
        }
    }
}

#[derive(Parser)]
#[command(name = "simulate_planar_slam")]
#[command(about = "Simulate a car-like robot mapping range-bearing landmarks")]
struct Args {
    /// Number of simulation steps
    #[arg(short, long, default_value = "600")]
    steps: usize,

    /// Time step in seconds
    #[arg(long, default_value = "0.1")]
    dt: f64,

    /// Number of landmarks scattered in the arena
    #[arg(short, long, default_value = "25")]
    landmarks: usize,

    /// Half-width of the square arena in meters
    #[arg(long, default_value = "30.0")]
    arena: f64,

    /// Maximum sensing range in meters
    #[arg(long, default_value = "15.0")]
    max_range: f64,

    /// Wheel speed in m/s
    #[arg(long, default_value = "2.0")]
    speed: f64,

    /// Steering angle in radians
    #[arg(long, default_value = "0.1")]
    steering: f64,

    /// Range noise standard deviation
    #[arg(long, default_value = "0.1")]
    range_std: f64,

    /// Bearing noise standard deviation
    #[arg(long, default_value = "0.01")]
    bearing_std: f64,

    /// GPS noise standard deviation
    #[arg(long, default_value = "0.5")]
    gps_std: f64,

    /// Steps between GPS fixes (0 disables GPS)
    #[arg(long, default_value = "20")]
    gps_every: usize,

    /// Error frame of the filter
    #[arg(long, value_enum, default_value = "right")]
    frame: Frame,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

struct Noise {
    speed: Normal<f64>,
    steering: Normal<f64>,
    range: Normal<f64>,
    bearing: Normal<f64>,
    gps: Normal<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let noise = Noise {
        speed: Normal::new(0.0, 0.05)?,
        steering: Normal::new(0.0, 0.005)?,
        range: Normal::new(0.0, args.range_std)?,
        bearing: Normal::new(0.0, args.bearing_std)?,
        gps: Normal::new(0.0, args.gps_std)?,
    };

    let map: Vec<Vector2<f64>> = (0..args.landmarks)
        .map(|_| {
            Vector2::new(
                rng.gen_range(-args.arena..=args.arena),
                rng.gen_range(-args.arena..=args.arena),
            )
        })
        .collect();

    let car = CarProcess::default().with_noise_std(&DVector::from_vec(vec![0.02, 0.1, 0.1]));
    let initial = AugmentedState::new(
        Planar::se2_slam(0.0, 0.0, 0.0),
        DMatrix::identity(3, 3) * 1e-4,
    )?;
    let frame = ErrorFrame::from(args.frame);
    let sensor = LandmarkSensor::new(args.range_std, args.bearing_std);
    let mut filter = InEKF::new(car.clone(), initial, frame);
    filter.add_measure_model("gps", InvariantMeasure::<SO2>::position_fix(args.gps_std));
    filter.add_measure_model("landmark", sensor.clone());
    let association = AssociationConfig::default();
    let landmark_cov = DMatrix::identity(2, 2) * 100.0;

    info!(
        "Simulating {} steps with {} landmarks, {:?} error frame",
        args.steps, args.landmarks, frame
    );

    let mut truth = Planar::se2(0.0, 0.0, 0.0);
    let (mut matched, mut created, mut rejected, mut failed) = (0usize, 0usize, 0usize, 0usize);
    let start = Instant::now();

    for step in 1..=args.steps {
        let u = Vector2::new(args.speed, args.steering);
        truth = truth.compose(&car.increment(&u, args.dt)?)?;

        let measured = Vector2::new(
            u.x + noise.speed.sample(&mut rng),
            u.y + noise.steering.sample(&mut rng),
        );
        filter.predict(&measured, args.dt)?;

        if args.gps_every > 0 && step % args.gps_every == 0 {
            let p = truth.position()?;
            let z = DVector::from_vec(vec![
                p.x + noise.gps.sample(&mut rng),
                p.y + noise.gps.sample(&mut rng),
            ]);
            if let Err(e) = filter.update(&z, "gps") {
                warn!("GPS update at step {} failed: {}", step, e);
                failed += 1;
            }
        }

        let observations = observe(&truth, &map, args.max_range, &noise, &mut rng)?;
        let decisions = associate(filter.state(), &sensor, &observations, frame, &association)?;
        for (z, decision) in observations.iter().zip(decisions) {
            let index = match decision {
                Association::Existing(index) => {
                    matched += 1;
                    index
                }
                Association::New => {
                    created += 1;
                    let position = landmark_guess(filter.state(), z)?;
                    filter.state_mut().add_column(&position, &landmark_cov)?
                }
                Association::Reject => {
                    rejected += 1;
                    continue;
                }
            };
            if let Err(e) = filter.update_landmark("landmark", index, z) {
                warn!("landmark update at step {} failed: {}", step, e);
                failed += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let state = filter.state();
    let estimate = state.mean();
    let position_error = (estimate.position()? - truth.position()?).norm();
    let heading_error = (estimate.theta() - truth.theta()).abs();

    info!("Simulation completed in {:.1}ms", elapsed.as_secs_f64() * 1000.0);
    info!("  Final pose: {}", estimate);
    info!("  Position error: {:.3} m", position_error);
    info!("  Heading error: {:.4} rad", heading_error);
    info!(
        "  Map: {} landmarks estimated, {} in the world",
        state.landmarks(),
        map.len()
    );
    info!(
        "  Observations: {} matched, {} new, {} rejected, {} failed updates",
        matched, created, rejected, failed
    );
    info!("  Mean landmark error: {:.3} m", map_error(state, &map));
    Ok(())
}

/// Noisy range-bearing observations of every landmark within range.
fn observe(
    truth: &Planar,
    map: &[Vector2<f64>],
    max_range: f64,
    noise: &Noise,
    rng: &mut StdRng,
) -> ManifoldResult<Vec<DVector<f64>>> {
    let position = truth.position()?;
    let theta = truth.theta();
    Ok(map
        .iter()
        .filter_map(|landmark| {
            let offset = landmark - position;
            let range = offset.norm();
            if range > max_range {
                return None;
            }
            let bearing = inekf::process::odometry::wrap_angle(offset.y.atan2(offset.x) - theta);
            Some(DVector::from_vec(vec![
                range + noise.range.sample(rng),
                bearing + noise.bearing.sample(rng),
            ]))
        })
        .collect())
}

/// World position of a range-bearing observation seen from the current estimate.
fn landmark_guess(state: &AugmentedState<SO2>, z: &DVector<f64>) -> ManifoldResult<DVector<f64>> {
    let mean = state.mean();
    let (range, bearing) = (z[0], z[1]);
    let world = mean.rotate(&Vector2::new(range * bearing.cos(), range * bearing.sin()))
        + mean.position()?;
    Ok(DVector::from_vec(vec![world.x, world.y]))
}

/// Mean distance from each estimated landmark to the closest true one.
fn map_error(state: &AugmentedState<SO2>, map: &[Vector2<f64>]) -> f64 {
    let first = state.mean().layout().core_columns;
    let count = state.landmarks();
    if count == 0 || map.is_empty() {
        return 0.0;
    }
    let total: f64 = (first..first + count)
        .filter_map(|i| state.column(i).ok())
        .map(|c| {
            let estimate = Vector2::new(c[0], c[1]);
            map.iter()
                .map(|l| (l - estimate).norm())
                .fold(f64::INFINITY, f64::min)
        })
        .sum();
    total / count as f64
}
