//! Intent election math.
//!
//! Pure, deterministic functions used to normalize and score competing NLU
//! predictions before transition conditions consume them. None of them mutate
//! their inputs.

use crate::models::Prediction;
use serde::Serialize;

/// Intent elected when nothing is confident enough.
pub const NONE_INTENT: &str = "none";

/// Half-width of the band around `1/n` in which predictions are considered confused.
pub const AMBIGUITY_BAND: f64 = 0.1;

const Z_CLAMP: f64 = 6.5;
const INV_SQRT_2PI: f64 = 0.3989422804;

/// Converts a z-score to the cumulative probability of the standard normal
/// distribution using its Taylor series. Clamped to 0 below -6.5 and 1 above 6.5.
pub fn z_score_to_probability(z: f64) -> f64 {
    if z < -Z_CLAMP {
        return 0.0;
    }
    if z > Z_CLAMP {
        return 1.0;
    }

    let loop_stop = (-23.0f64).exp();
    let mut factorial_k = 1.0;
    let mut sum = 0.0;
    let mut term = 1.0f64;
    let mut k: i32 = 0;

    while term.abs() > loop_stop {
        term = INV_SQRT_2PI * (-1.0f64).powi(k) * z.powi(k) / f64::from(2 * k + 1) / 2.0f64.powi(k)
            * z.powi(k + 1)
            / factorial_k;
        sum += term;
        k += 1;
        factorial_k *= f64::from(k);
    }

    sum + 0.5
}

/// True iff every value lies in `[lower, upper)`.
pub fn all_in_range(values: &[f64], lower: f64, upper: f64) -> bool {
    values.iter().all(|v| *v >= lower && *v < upper)
}

/// Renormalizes confidences so they sum to 1. Empty or all-zero input is returned
/// unchanged.
pub fn scale_confidences(predictions: &[Prediction]) -> Vec<Prediction> {
    let total: f64 = predictions.iter().map(|p| p.confidence).sum();
    if total == 0.0 || !total.is_finite() {
        return predictions.to_vec();
    }

    predictions
        .iter()
        .map(|p| Prediction {
            name: p.name.clone(),
            confidence: p.confidence / total,
        })
        .collect()
}

/// Population standard deviation. Zero for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Probability that the best prediction genuinely beats the runner-up, treating
/// confidences as log-normally distributed. Expects predictions sorted by
/// descending confidence. `None` with fewer than two predictions.
pub fn top_two_margin(sorted: &[Prediction]) -> Option<f64> {
    let [first, second, ..] = sorted else {
        return None;
    };

    let logs: Vec<f64> = sorted.iter().map(|p| p.confidence.ln()).collect();
    let z = (first.confidence.ln() - second.confidence.ln()) / std_dev(&logs);
    let probability = z_score_to_probability(z);

    Some(if probability.is_nan() { 0.5 } else { probability })
}

/// More than one prediction and all of them within the ambiguity band around a
/// perfectly even split.
pub fn detect_ambiguity(predictions: &[Prediction]) -> bool {
    if predictions.len() < 2 {
        return false;
    }
    let even = 1.0 / predictions.len() as f64;
    let confidences: Vec<f64> = predictions.iter().map(|p| p.confidence).collect();
    all_in_range(&confidences, even - AMBIGUITY_BAND, even + AMBIGUITY_BAND)
}

/// Outcome of scoring one event's predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Election {
    /// Scaled predictions, highest confidence first.
    pub predictions: Vec<Prediction>,
    /// The winning intent, `none` when the best one is below the threshold.
    pub elected: Option<Prediction>,
    pub ambiguous: bool,
    pub margin: Option<f64>,
}

impl Election {
    pub fn intent_name(&self) -> Option<&str> {
        self.elected.as_ref().map(|p| p.name.as_str())
    }

    pub fn confidence_of(&self, intent: &str) -> f64 {
        self.predictions
            .iter()
            .find(|p| p.name == intent)
            .map(|p| p.confidence)
            .unwrap_or(0.0)
    }
}

/// Scales, ranks and elects a winning intent.
pub fn elect(predictions: &[Prediction], min_confidence: f64) -> Election {
    if predictions.is_empty() {
        return Election::default();
    }

    let mut scaled = scale_confidences(predictions);
    scaled.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let elected = match scaled.first() {
        Some(best) if best.confidence >= min_confidence => best.clone(),
        _ => Prediction::new(NONE_INTENT, 1.0),
    };

    Election {
        ambiguous: detect_ambiguity(&scaled),
        margin: top_two_margin(&scaled),
        elected: Some(elected),
        predictions: scaled,
    }
}
