use crate::errors::{EnvError, EnvResult};
use crate::price_series::PriceSeries;
use serde::Serialize;

/// A `rows x cols` feature window stored row-major, oldest bar first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

impl Observation {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        Some(&self.values[start..start + self.cols])
    }

    pub fn latest_row(&self) -> &[f64] {
        let start = (self.rows - 1) * self.cols;
        &self.values[start..]
    }
}

/// Lookback view over a shared series.
#[derive(Debug, Clone)]
pub struct ObservationWindow {
    series: PriceSeries,
    window_size: usize,
}

impl ObservationWindow {
    pub fn new(series: PriceSeries, window_size: usize) -> EnvResult<Self> {
        if window_size == 0 {
            return Err(EnvError::configuration("window_size must be positive"));
        }
        if series.len() < window_size + 1 {
            return Err(EnvError::configuration(format!(
                "price series has {} bars but window_size {} needs at least {}",
                series.len(),
                window_size,
                window_size + 1
            )));
        }
        Ok(Self {
            series,
            window_size,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.window_size, self.series.feature_count())
    }

    /// First step index with a full window of history behind it.
    pub fn first_step_index(&self) -> usize {
        self.window_size - 1
    }

    /// Bars `[step_index - window_size + 1, step_index]`. Nothing after `step_index` is read.
    pub fn observe(&self, step_index: usize) -> EnvResult<Observation> {
        if step_index + 1 < self.window_size || step_index >= self.series.len() {
            return Err(EnvError::OutOfRange {
                step_index,
                window_size: self.window_size,
                len: self.series.len(),
            });
        }

        let start = step_index + 1 - self.window_size;
        let cols = self.series.feature_count();
        let mut values = Vec::with_capacity(self.window_size * cols);
        for bar in &self.series.bars()[start..=step_index] {
            bar.write_feature_row(&mut values);
        }

        Ok(Observation {
            rows: self.window_size,
            cols,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_series::test_support::hourly_bars;

    fn ramp_series(count: usize) -> PriceSeries {
        let prices: Vec<_> = (0..count)
            .map(|i| {
                let p = 100.0 + i as f64;
                (p, p + 0.5, p - 0.5, p + 0.25)
            })
            .collect();
        PriceSeries::new("GOOG", hourly_bars(&prices), vec!["idx".to_string()]).unwrap()
    }

    #[test]
    fn test_window_covers_inclusive_lookback() {
        let window = ObservationWindow::new(ramp_series(10), 3).unwrap();
        let obs = window.observe(5).unwrap();

        assert_eq!(obs.shape(), (3, 6));
        assert_eq!(obs.row(0).unwrap()[5], 3.0);
        assert_eq!(obs.latest_row()[5], 5.0);
        assert_eq!(obs.latest_row()[0], 105.0);
    }

    #[test]
    fn test_rejects_steps_without_full_history() {
        let window = ObservationWindow::new(ramp_series(10), 4).unwrap();
        assert!(matches!(
            window.observe(2),
            Err(EnvError::OutOfRange { step_index: 2, .. })
        ));
        assert!(window.observe(3).is_ok());
        assert!(window.observe(10).is_err());
    }

    #[test]
    fn test_rejects_series_shorter_than_window_plus_one() {
        assert!(matches!(
            ObservationWindow::new(ramp_series(3), 3),
            Err(EnvError::Configuration(_))
        ));
        assert!(ObservationWindow::new(ramp_series(4), 3).is_ok());
        assert!(ObservationWindow::new(ramp_series(4), 0).is_err());
    }
}
