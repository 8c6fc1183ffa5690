//! Price forecasting.
//!
//! Fits an ordinary-least-squares line through `(index, price)` and
//! evaluates it one step past the last sample. Pure: no state, no
//! randomness, same series in means same forecast out.

use tracing::debug;

use crate::types::{AgentError, Forecast, PriceSeries};

/// Minimum number of samples needed to fit a trend.
pub const MIN_SAMPLES: usize = 2;

/// Slope and intercept of a fitted trend line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

pub struct PriceForecaster;

impl PriceForecaster {
    /// Fit the OLS trend line for `samples[i]` against `i`.
    pub fn fit(samples: &[f64]) -> Option<TrendLine> {
        let n = samples.len();
        if n < MIN_SAMPLES {
            return None;
        }

        let nf = n as f64;
        let x_mean = (nf - 1.0) / 2.0;
        let y_mean = samples.iter().sum::<f64>() / nf;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (i, y) in samples.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y - y_mean);
            sxx += dx * dx;
        }

        // sxx > 0 whenever n >= 2
        let slope = sxy / sxx;
        Some(TrendLine {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    /// Predict the next price of a series.
    pub fn forecast(series: &PriceSeries) -> Result<Forecast, AgentError> {
        let samples = series.samples();
        let line = Self::fit(samples).ok_or_else(|| AgentError::InsufficientData {
            asset: series.asset().to_string(),
            samples: samples.len(),
        })?;

        let forecast = Forecast {
            predicted: line.at(samples.len() as f64),
            current: series.last(),
        };

        debug!(
            asset = series.asset(),
            samples = samples.len(),
            slope = line.slope,
            current = forecast.current,
            predicted = forecast.predicted,
            "Forecast computed"
        );

        Ok(forecast)
    }
}
