//! Short-horizon queue length projection.
//!
//! This is a coarse analytic approximation and never calls into the
//! simulator. Each sample draws the change in the number of queued vehicles
//! as a Poisson arrival count minus, while the phase is green, a Poisson
//! departure count. The projected length is the current length plus the mean
//! sampled change, converted to metres and floored at zero.

use crate::topology::StaticTopology;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use serde::Serialize;

/// The queue length occupied by one vehicle, in m.
pub const VEHICLE_SPACING: f64 = 6.0; // m

/// Mean vehicles leaving a green phase per sample.
pub const DEPARTURE_RATE: f64 = 4.0;

/// Mean vehicles joining the average queue per sample.
pub const AVERAGE_ARRIVAL_RATE: f64 = 2.0;

/// Mean vehicles joining the longest queue per sample.
pub const MAX_ARRIVAL_RATE: f64 = 3.0;

/// The default number of samples per projection.
pub const DEFAULT_SAMPLES: usize = 10;

/// Queue length statistics of one phase, in m.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total_length: f64,
    pub count: usize,
    pub max_length: f64,
    pub average_length: f64,
}

/// A projected queue length of one phase, in m.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ProjectedQueue {
    pub average_length: f64,
    pub max_length: f64,
}

/// Computes the queue statistics of each phase from per-movement jam lengths
/// given in topology order.
pub fn phase_queue_lengths(topology: &StaticTopology, jam_lengths: &[f32]) -> Vec<QueueStats> {
    topology
        .phases()
        .iter()
        .map(|phase| {
            let mut stats = QueueStats::default();
            for key in &phase.movements {
                let length = topology
                    .index_of(key)
                    .ok()
                    .and_then(|idx| jam_lengths.get(idx))
                    .map_or(0.0, |l| *l as f64);
                stats.total_length += length;
                stats.count += 1;
                stats.max_length = f64::max(stats.max_length, length);
            }
            if stats.count > 0 {
                stats.average_length = stats.total_length / stats.count as f64;
            }
            stats
        })
        .collect()
}

/// Samples short-horizon queue projections.
pub struct QueueProjector<R = StdRng> {
    rng: R,
    samples: usize,
    departures: Poisson<f64>,
    average_arrivals: Poisson<f64>,
    max_arrivals: Poisson<f64>,
}

impl QueueProjector<StdRng> {
    /// Creates a projector with a deterministic random source.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Creates a projector seeded from system entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> QueueProjector<R> {
    /// Creates a projector drawing from the given random source.
    pub fn new(rng: R) -> Self {
        let poisson = |rate| Poisson::new(rate).expect("Invalid Poisson rate");
        Self {
            rng,
            samples: DEFAULT_SAMPLES,
            departures: poisson(DEPARTURE_RATE),
            average_arrivals: poisson(AVERAGE_ARRIVAL_RATE),
            max_arrivals: poisson(MAX_ARRIVAL_RATE),
        }
    }

    /// Sets the number of samples per projection. At least one sample is always drawn.
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    /// The number of samples per projection.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Projects a phase's queue under a green or red signal.
    pub fn project(&mut self, stats: &QueueStats, green: bool) -> ProjectedQueue {
        let departures = if green { Some(&self.departures) } else { None };
        ProjectedQueue {
            average_length: project_length(
                &mut self.rng,
                self.samples,
                stats.average_length,
                &self.average_arrivals,
                departures,
            ),
            max_length: project_length(
                &mut self.rng,
                self.samples,
                stats.max_length,
                &self.max_arrivals,
                departures,
            ),
        }
    }

    /// Projects every phase, with only `green_phase` shown green.
    pub fn project_phases(&mut self, stats: &[QueueStats], green_phase: usize) -> Vec<ProjectedQueue> {
        stats
            .iter()
            .enumerate()
            .map(|(idx, stats)| self.project(stats, idx == green_phase))
            .collect()
    }
}

fn project_length<R: Rng>(
    rng: &mut R,
    samples: usize,
    current: f64,
    arrivals: &Poisson<f64>,
    departures: Option<&Poisson<f64>>,
) -> f64 {
    let mut delta = 0.0;
    for _ in 0..samples {
        delta += arrivals.sample(rng);
        if let Some(departures) = departures {
            delta -= departures.sample(rng);
        }
    }
    let mean = delta * VEHICLE_SPACING / samples as f64;
    f64::max(current + mean, 0.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::test::three_way;
    use crate::topology::StaticTopology;
    use assert_approx_eq::assert_approx_eq;

    fn stats(length: f64) -> QueueStats {
        QueueStats {
            total_length: length,
            count: 1,
            max_length: length,
            average_length: length,
        }
    }

    #[test]
    fn projection_is_never_negative() {
        let mut projector = QueueProjector::seeded(7).with_samples(1);
        for start in [0.0, 1.0, 5.0, 30.0] {
            for _ in 0..200 {
                let p = projector.project(&stats(start), true);
                assert!(p.average_length >= 0.0);
                assert!(p.max_length >= 0.0);
            }
        }
    }

    #[test]
    fn green_tends_below_red() {
        let mut projector = QueueProjector::seeded(42);
        let trials = 1000;
        let (mut green, mut red) = (0.0, 0.0);
        for _ in 0..trials {
            green += projector.project(&stats(60.0), true).average_length;
            red += projector.project(&stats(60.0), false).average_length;
        }
        let (green, red) = (green / trials as f64, red / trials as f64);
        // Expected: 60 + 6 * (2 - 4) = 48 and 60 + 6 * 2 = 72
        assert!(green < red);
        assert_approx_eq!(green, 48.0, 2.0);
        assert_approx_eq!(red, 72.0, 2.0);
    }

    #[test]
    fn seeded_projections_repeat() {
        let a = QueueProjector::seeded(3).project(&stats(10.0), true);
        let b = QueueProjector::seeded(3).project(&stats(10.0), true);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_samples_draws_one() {
        assert_eq!(QueueProjector::seeded(0).with_samples(0).samples(), 1);
    }

    #[test]
    fn phase_statistics() {
        let topo = StaticTopology::from_junction(&three_way()).unwrap();
        // E0--l, E0--s, -E1--r, -E1--s, E2--l, E2--r
        let jams = [12.0, 30.0, 0.0, 18.0, 6.0, 0.0];
        let stats = phase_queue_lengths(&topo, &jams);
        assert_eq!(stats.len(), 3);
        assert_approx_eq!(stats[0].total_length, 48.0);
        assert_eq!(stats[0].count, 3);
        assert_approx_eq!(stats[0].max_length, 30.0);
        assert_approx_eq!(stats[0].average_length, 16.0);
        assert_approx_eq!(stats[1].average_length, 12.0);
        assert_approx_eq!(stats[2].average_length, 3.0);
    }

    #[test]
    fn only_one_phase_green() {
        let mut projector = QueueProjector::seeded(11).with_samples(200);
        let out = projector.project_phases(&[stats(50.0), stats(50.0)], 1);
        assert!(out[1].average_length < out[0].average_length);
    }
}
