/// Summary statistics of the values falling into one period bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std: Option<f64>,
}

impl Summary {
    /// Compute count, mean, median, min, max and sample standard deviation.
    ///
    /// Standard deviation uses the `n - 1` denominator and is undefined for
    /// fewer than two values.
    pub fn of(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::empty();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = sorted.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };

        let std = if count > 1 {
            let sum_sq = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            Some((sum_sq / (count - 1) as f64).sqrt())
        } else {
            None
        };

        Self {
            count,
            mean: Some(mean),
            median: Some(median),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            std,
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            mean: None,
            median: None,
            min: None,
            max: None,
            std: None,
        }
    }

    /// Drop all statistics, keeping the observed count.
    pub fn masked(self) -> Self {
        Self {
            count: self.count,
            ..Self::empty()
        }
    }

    /// Apply a coverage gate: buckets with fewer than `min_count` values are masked.
    pub fn gate(self, min_count: usize) -> Self {
        if self.count < min_count {
            self.masked()
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.map(|a| (a - b).abs() < 1e-9).unwrap_or(false)
    }

    #[test]
    fn test_summary_basic() {
        let s = Summary::of(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(s.count, 4);
        assert!(approx(s.mean, 2.5));
        assert!(approx(s.median, 2.5));
        assert!(approx(s.min, 1.0));
        assert!(approx(s.max, 4.0));
        // sample variance = 5/3
        assert!(approx(s.std, (5.0f64 / 3.0).sqrt()));
    }

    #[test]
    fn test_summary_odd_median() {
        let s = Summary::of(&[10.0, 30.0, 20.0]);
        assert!(approx(s.median, 20.0));
    }

    #[test]
    fn test_single_value_has_undefined_std() {
        let s = Summary::of(&[55.0]);
        assert_eq!(s.count, 1);
        assert!(approx(s.mean, 55.0));
        assert_eq!(s.std, None);
    }

    #[test]
    fn test_empty_summary() {
        let s = Summary::of(&[]);
        assert_eq!(s, Summary::empty());
    }

    #[test]
    fn test_gate_keeps_count() {
        let s = Summary::of(&[1.0, 2.0, 3.0]).gate(4);
        assert_eq!(s.count, 3);
        assert_eq!(s.mean, None);
        assert_eq!(s.median, None);
        assert_eq!(s.min, None);
        assert_eq!(s.max, None);
        assert_eq!(s.std, None);

        let s = Summary::of(&[1.0, 2.0, 3.0]).gate(3);
        assert!(approx(s.mean, 2.0));
    }
}
