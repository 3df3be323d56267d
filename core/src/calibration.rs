//! Per-year probability calibration
//!
//! Calibrators are fitted offline and stored as JSON keyed by year index:
//!
//! ```json
//! {
//!   "0": {"kind": "isotonic", "x": [0.0, 0.1, 1.0], "y": [0.0, 0.05, 1.0]},
//!   "1": {"kind": "sigmoid", "a": -4.2, "b": 2.1}
//! }
//! ```

use crate::error::{MiraiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A fitted scalar → probability mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FittedCalibration {
    /// Piecewise-linear through `(x, y)`, clipped outside `x`
    Isotonic { x: Vec<f64>, y: Vec<f64> },
    /// Platt scaling: `1 / (1 + exp(a * p + b))`
    Sigmoid { a: f64, b: f64 },
    /// `1 / (1 + exp(-(coef * p + intercept)))`
    Logistic { coef: f64, intercept: f64 },
    Identity,
}

impl FittedCalibration {
    fn validate(&self) -> Result<()> {
        if let FittedCalibration::Isotonic { x, y } = self {
            if x.is_empty() || x.len() != y.len() {
                return Err(MiraiError::Calibration(format!(
                    "isotonic thresholds need equal non-empty x/y, got {}/{}",
                    x.len(),
                    y.len()
                )));
            }
            if x.windows(2).any(|w| w[1] < w[0]) {
                return Err(MiraiError::Calibration(
                    "isotonic x thresholds must be sorted".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn apply(&self, p: f64) -> f64 {
        if p.is_nan() {
            return f64::NAN;
        }
        let out = match self {
            FittedCalibration::Isotonic { x, y } => interpolate(x, y, p),
            FittedCalibration::Sigmoid { a, b } => 1.0 / (1.0 + (a * p + b).exp()),
            FittedCalibration::Logistic { coef, intercept } => {
                1.0 / (1.0 + (-(coef * p + intercept)).exp())
            }
            FittedCalibration::Identity => p,
        };
        out.clamp(0.0, 1.0)
    }
}

fn interpolate(x: &[f64], y: &[f64], p: f64) -> f64 {
    let last = x.len() - 1;
    if p <= x[0] {
        return y[0];
    }
    if p >= x[last] {
        return y[last];
    }
    // First threshold strictly above p; p > x[0] so idx >= 1
    let idx = x.partition_point(|&t| t <= p);
    let (x0, x1, y0, y1) = (x[idx - 1], x[idx], y[idx - 1], y[idx]);
    if x1 == x0 {
        y1
    } else {
        y0 + (p - x0) * (y1 - y0) / (x1 - x0)
    }
}

/// Year index → fitted function, immutable once loaded
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Calibrator {
    years: BTreeMap<usize, FittedCalibration>,
}

impl Calibrator {
    pub fn new(years: BTreeMap<usize, FittedCalibration>) -> Result<Self> {
        for fitted in years.values() {
            fitted.validate()?;
        }
        Ok(Self { years })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, FittedCalibration> = serde_json::from_str(json)
            .map_err(|e| MiraiError::Calibration(format!("malformed calibrator: {}", e)))?;
        let years = raw
            .into_iter()
            .map(|(key, fitted)| {
                key.trim()
                    .parse::<usize>()
                    .map(|year| (year, fitted))
                    .map_err(|_| {
                        MiraiError::Calibration(format!("year key '{}' is not an index", key))
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Self::new(years)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MiraiError::Configuration(format!("cannot read calibrator {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn years(&self) -> impl Iterator<Item = &usize> {
        self.years.keys()
    }

    /// Maps each year's probability through its own function
    ///
    /// Years without a fitted function are reported as 0.0.
    pub fn calibrate(&self, probs: &[f64]) -> Result<Vec<f64>> {
        let mut calibrated = vec![0.0; probs.len()];
        for (&year, fitted) in &self.years {
            let p = probs.get(year).ok_or_else(|| {
                MiraiError::Calibration(format!(
                    "calibrator has year {} but the model predicts {} years",
                    year,
                    probs.len()
                ))
            })?;
            calibrated[year] = fitted.apply(*p);
        }
        Ok(calibrated)
    }
}

/// Applies `calibrator`, or passes probabilities through when there is none
pub fn calibrate(calibrator: Option<&Calibrator>, probs: &[f64]) -> Result<Vec<f64>> {
    match calibrator {
        Some(calibrator) => calibrator.calibrate(probs),
        None => Ok(probs.to_vec()),
    }
}
