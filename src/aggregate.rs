use crate::error::{EnvError, Result};

/// Collects the occupancy vectors reported by every simulator substep of one
/// decision step and reduces them to a single mean vector.
///
/// Samples are in percent, the reduced vector is a fraction in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct OccupancyAggregator {
    /// The number of values in each sample.
    width: usize,
    /// The samples recorded since the last reduction.
    samples: Vec<Vec<f32>>,
}

impl OccupancyAggregator {
    /// Creates an empty aggregator for samples of the given width.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            samples: vec![],
        }
    }

    /// The number of values in each sample.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The number of samples recorded since the last reduction.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples have been recorded since the last reduction.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Records one substep's occupancy vector, in percent.
    pub fn record(&mut self, sample: &[f32]) -> Result<()> {
        if sample.len() != self.width {
            return Err(EnvError::SampleLength {
                expected: self.width,
                got: sample.len(),
            });
        }
        if let Some((index, value)) = sample.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(EnvError::NonNumeric {
                index,
                value: *value,
            });
        }
        self.samples.push(sample.to_vec());
        Ok(())
    }

    /// Computes the element-wise mean of the recorded samples as a fraction,
    /// and empties the buffer.
    pub fn reduce(&mut self) -> Result<Vec<f32>> {
        if self.samples.is_empty() {
            return Err(EnvError::NoSamples);
        }
        let mut sums = vec![0.0f64; self.width];
        for sample in &self.samples {
            for (sum, value) in sums.iter_mut().zip(sample) {
                *sum += *value as f64;
            }
        }
        let count = self.samples.len() as f64;
        self.samples.clear();
        Ok(sums
            .into_iter()
            .map(|sum| (sum / count / 100.0) as f32)
            .collect())
    }

    /// Discards any recorded samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
