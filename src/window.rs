use crate::error::{EnvError, Result};
use crate::fault::FAULT_SENTINEL;
use ndarray::Array2;
use std::collections::VecDeque;

/// The default number of decision steps kept in the history.
pub const DEFAULT_HISTORY: usize = 5;

/// A fixed-capacity history of aggregated occupancy vectors, oldest first.
#[derive(Clone, Debug)]
pub struct TemporalStateWindow {
    /// The number of rows kept.
    capacity: usize,
    /// The number of values in each row.
    width: usize,
    /// The rows, oldest first. Always holds `capacity` rows.
    rows: VecDeque<Vec<f32>>,
}

impl TemporalStateWindow {
    /// Creates a window filled with zero rows.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize, width: usize) -> Self {
        assert!(capacity > 0, "Window capacity must be at least one");
        let mut window = Self {
            capacity,
            width,
            rows: VecDeque::with_capacity(capacity),
        };
        window.reset();
        window
    }

    /// Refills the window with zero rows.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.rows
            .extend(std::iter::repeat(vec![0.0; self.width]).take(self.capacity));
    }

    /// The number of rows, which is always the capacity.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always `false`; a window holds at least one row.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The number of rows kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of values in each row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Appends a row, evicting the oldest.
    pub fn push(&mut self, row: Vec<f32>) -> Result<()> {
        if row.len() != self.width {
            return Err(EnvError::SampleLength {
                expected: self.width,
                got: row.len(),
            });
        }
        self.rows.pop_front();
        self.rows.push_back(row);
        Ok(())
    }

    /// The most recently pushed row.
    pub fn latest(&self) -> &[f32] {
        self.rows.back().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates over the rows, oldest first.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Stacks the rows into a `(capacity, width)` array, oldest first,
    /// with every column in `masked` set to [FAULT_SENTINEL] in every row.
    pub fn snapshot(&self, masked: &[usize]) -> Array2<f32> {
        let mut out = Array2::zeros((self.capacity, self.width));
        for (mut dst, src) in out.rows_mut().into_iter().zip(&self.rows) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = *s;
            }
        }
        for &col in masked.iter().filter(|col| **col < self.width) {
            out.column_mut(col).fill(FAULT_SENTINEL);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_full_of_zeros() {
        let window = TemporalStateWindow::new(DEFAULT_HISTORY, 12);
        let snap = window.snapshot(&[]);
        assert_eq!(snap.dim(), (5, 12));
        assert!(snap.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn capacity_holds_for_any_push_count() {
        let mut window = TemporalStateWindow::new(3, 2);
        for i in 0..10 {
            window.push(vec![i as f32, -(i as f32)]).unwrap();
            assert_eq!(window.len(), 3);
            assert_eq!(window.snapshot(&[]).nrows(), 3);
        }
        let rows: Vec<_> = window.rows().map(|r| r[0]).collect();
        assert_eq!(rows, vec![7.0, 8.0, 9.0]);
        assert_eq!(window.latest(), &[9.0, -9.0]);
    }

    #[test]
    fn mask_applies_to_history() {
        let mut window = TemporalStateWindow::new(2, 3);
        window.push(vec![0.1, 0.2, 0.3]).unwrap();
        window.push(vec![0.4, 0.5, 0.6]).unwrap();
        let snap = window.snapshot(&[1]);
        assert_eq!(snap.column(1).to_vec(), vec![FAULT_SENTINEL; 2]);
        assert_eq!(snap.column(2).to_vec(), vec![0.3, 0.6]);
        // The stored rows are untouched
        assert_eq!(window.latest(), &[0.4, 0.5, 0.6]);
    }

    #[test]
    fn rejects_wrong_width() {
        let mut window = TemporalStateWindow::new(2, 3);
        assert!(window.push(vec![0.0; 4]).is_err());
        assert_eq!(window.len(), 2);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        TemporalStateWindow::new(0, 3);
    }
}
