//! Percentile clipping of raw pixel values into the 0-255 display range

use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Which end of the output range the faint pixels land on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleConvention {
    /// Low percentile to 0 (black sky, white stars)
    Standard,
    /// Low percentile to 255 (white sky, dark stars), the printed-chart look
    #[default]
    Inverted,
}

impl std::str::FromStr for ScaleConvention {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "normal" => Ok(ScaleConvention::Standard),
            "inverted" | "invert" => Ok(ScaleConvention::Inverted),
            _ => Err(ChartError::InputFormat(format!(
                "unknown scale convention: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ScaleConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleConvention::Standard => write!(f, "standard"),
            ScaleConvention::Inverted => write!(f, "inverted"),
        }
    }
}

/// Percentile of the finite values, linear between closest ranks
pub fn percentile(data: &[f64], pct: f64) -> Option<f64> {
    let mut values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(percentile_of_sorted(&values, pct))
}

fn percentile_of_sorted(sorted: &[f64], pct: f64) -> f64 {
    let rank = (sorted.len() - 1) as f64 * pct.clamp(0.0, 100.0) / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Clip `data` to its `[low_pct, high_pct]` percentiles and map linearly onto
/// 0..=255 (or 255..=0 for [`ScaleConvention::Inverted`]).
///
/// Non-finite pixels and every pixel of a flat image map to the low bound.
pub fn normalize(
    data: &[f64],
    low_pct: f64,
    high_pct: f64,
    convention: ScaleConvention,
) -> Vec<f64> {
    let mut finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));

    let low_bound = match convention {
        ScaleConvention::Standard => 0.0,
        ScaleConvention::Inverted => 255.0,
    };
    if finite.is_empty() {
        return vec![low_bound; data.len()];
    }

    let low = percentile_of_sorted(&finite, low_pct);
    let high = percentile_of_sorted(&finite, high_pct);
    let range = high - low;
    if !(range > 0.0) {
        return vec![low_bound; data.len()];
    }

    let scale = 255.0 / range;
    data.iter()
        .map(|&v| {
            if !v.is_finite() {
                return low_bound;
            }
            let scaled = (v.clamp(low, high) - low) * scale;
            match convention {
                ScaleConvention::Standard => scaled,
                ScaleConvention::Inverted => 255.0 - scaled,
            }
        })
        .collect()
}

/// Round normalized values to 8-bit grey levels
pub fn to_u8(values: &[f64]) -> Vec<u8> {
    values
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect()
}
