//! Positional window arithmetic shared by the scorer and the explainer.

use std::ops::Range;

use crate::config::PipelineConfig;

/// Reference/current window lengths and the index formula that places them.
///
/// Both the scorer and the explainer call [`WindowSpec::bounds`], so a day is
/// scored exactly when it can be explained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub reference: usize,
    pub current: usize,
}

/// Row ranges of the two adjacent windows ending at some index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowBounds {
    pub reference: Range<usize>,
    pub current: Range<usize>,
}

impl WindowSpec {
    pub fn new(reference: usize, current: usize) -> Self {
        Self { reference, current }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.reference_window, config.current_window)
    }

    /// Total rows spanned by both windows.
    pub fn span(&self) -> usize {
        self.reference + self.current
    }

    /// Windows ending at `index`: reference `[i-C-R+1, i-C]`, current `[i-C+1, i]`.
    ///
    /// `None` when the reference start would be negative.
    pub fn bounds(&self, index: usize) -> Option<WindowBounds> {
        let ref_start = (index + 1).checked_sub(self.span())?;
        let cur_start = ref_start + self.reference;
        Some(WindowBounds {
            reference: ref_start..cur_start,
            current: cur_start..index + 1,
        })
    }

    /// First index with a full pair of windows.
    pub fn first_index(&self) -> usize {
        self.span().saturating_sub(1)
    }
}

/// Per-column arithmetic mean of `rows`, summed in row order.
///
/// Returns zeros when `rows` is empty.
pub fn mean_vector<'a, I>(rows: I, dim: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut sums = vec![0.0f64; dim];
    let mut count = 0usize;

    for row in rows {
        for (sum, value) in sums.iter_mut().zip(row.iter()) {
            *sum += *value;
        }
        count += 1;
    }

    if count == 0 {
        return sums;
    }

    let n = count as f64;
    sums.iter_mut().for_each(|s| *s /= n);
    sums
}

/// Euclidean norm.
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_first_index() {
        let spec = WindowSpec::new(30, 14);
        assert!(spec.bounds(42).is_none());
        let b = spec.bounds(43).unwrap();
        assert_eq!(b.reference, 0..30);
        assert_eq!(b.current, 30..44);
        assert_eq!(spec.first_index(), 43);
    }

    #[test]
    fn test_bounds_adjacent_and_sized() {
        let spec = WindowSpec::new(5, 3);
        for i in 7..40 {
            let b = spec.bounds(i).unwrap();
            assert_eq!(b.reference.len(), 5);
            assert_eq!(b.current.len(), 3);
            assert_eq!(b.reference.end, b.current.start);
            assert_eq!(b.current.end, i + 1);
        }
    }

    #[test]
    fn test_mean_vector() {
        let rows = [vec![1.0, 10.0], vec![3.0, 20.0]];
        let mean = mean_vector(rows.iter().map(Vec::as_slice), 2);
        assert_eq!(mean, vec![2.0, 15.0]);
    }

    #[test]
    fn test_mean_vector_empty() {
        let mean = mean_vector(std::iter::empty::<&[f64]>(), 3);
        assert_eq!(mean, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_norms() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert!((l2_distance(&[1.0, 1.0], &[4.0, 5.0]) - 5.0).abs() < 1e-12);
        assert_eq!(l2_distance(&[2.0], &[2.0]), 0.0);
    }
}
