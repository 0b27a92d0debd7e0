use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("regression cannot be fit over {points} point(s)")]
    Regression { points: usize },
}

/// Sign of the fitted slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendType {
    Decreasing,
    Neutral,
    Increasing,
}

/// Least-squares slope of `values` against their index.
///
/// slope = cov(x, y) / var(x), with x = 0..n.
pub fn slope(values: &[f64]) -> Result<f64, SignalError> {
    let fail = || SignalError::Regression { points: values.len() };
    if values.len() < 2 {
        return Err(fail());
    }

    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let var_x = xs.iter().copied().variance();
    let cov = xs.iter().copied().covariance(values.iter().copied());

    let k = cov / var_x;
    if !k.is_finite() {
        return Err(fail());
    }
    Ok(k)
}

pub fn classify(values: &[f64]) -> Result<TrendType, SignalError> {
    let k = slope(values)?;
    Ok(if k > 0.0 {
        TrendType::Increasing
    } else if k < 0.0 {
        TrendType::Decreasing
    } else {
        TrendType::Neutral
    })
}
