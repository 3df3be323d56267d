use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Version reported alongside predictions
pub const MODEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Calibrated per-year risk of one exam
///
/// Serializes as `{"predictions": {"Year 1": p, ...}, "model_version": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
    #[serde(serialize_with = "serialize_years")]
    pub predictions: Vec<f64>,
    pub model_version: String,
}

impl PredictionReport {
    /// Builds a report, rounding each probability to 4 decimals
    pub fn new(probabilities: &[f64]) -> Self {
        Self {
            predictions: probabilities.iter().map(|&p| round4(p)).collect(),
            model_version: MODEL_VERSION.to_string(),
        }
    }

    /// `(label, probability)` pairs in horizon order
    pub fn years(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.predictions
            .iter()
            .enumerate()
            .map(|(i, &p)| (year_label(i), p))
    }

    /// Probability for a label such as "Year 3"
    pub fn get(&self, label: &str) -> Option<f64> {
        self.years().find(|(l, _)| l == label).map(|(_, p)| p)
    }
}

pub fn year_label(index: usize) -> String {
    format!("Year {}", index + 1)
}

fn round4(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

fn serialize_years<S: Serializer>(predictions: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(predictions.len()))?;
    for (i, p) in predictions.iter().enumerate() {
        map.serialize_entry(&year_label(i), p)?;
    }
    map.end()
}
