//! Turning raw classifier losses into a probability distribution.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

const EPSILON: f32 = 0.00001;

/// Loss-to-probability mapping; every variant leaves values summing to 1
/// for non-empty input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Normalization {
    /// Clip to `[0, 1]` and use `1 - loss`; suited to squared loss.
    #[default]
    ClippedLinear,
    /// `exp(-loss)`; suited to logistic loss. Computed relative to the
    /// smallest loss so it cannot underflow to all zeros.
    Logistic,
    /// Negate and shift by the minimum.
    MinShift,
    /// `1 / (1 + exp(loss))`, evaluated in log space.
    Sigmoid,
}

impl Normalization {
    pub fn apply(&self, losses: &mut [f32]) {
        match self {
            Normalization::ClippedLinear => {
                for x in losses.iter_mut() {
                    *x = 1.0 - x.clamp(0.0, 1.0);
                }
                normalize_or_uniform(losses);
            }
            Normalization::Logistic => {
                let min = losses.iter().copied().fold(f32::INFINITY, f32::min);
                for x in losses.iter_mut() {
                    *x = (min - *x).exp();
                }
                normalize_or_uniform(losses);
            }
            Normalization::MinShift => {
                let min = losses.iter().map(|x| -x).fold(f32::INFINITY, f32::min);
                for x in losses.iter_mut() {
                    *x = -*x - min;
                }
                normalize_or_uniform(losses);
            }
            Normalization::Sigmoid => {
                // log(1 / (1 + e^x)) = -softplus(x)
                for x in losses.iter_mut() {
                    *x = -(x.max(0.0) + (-x.abs()).exp().ln_1p());
                }
                let max = losses.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                for x in losses.iter_mut() {
                    *x = (*x - max).exp();
                }
                normalize_or_uniform(losses);
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::ClippedLinear => "squared_loss",
            Normalization::Logistic => "logistic_loss_basic",
            Normalization::MinShift => "min_shift",
            Normalization::Sigmoid => "sigmoid",
        }
    }
}

fn normalize_or_uniform(values: &mut [f32]) {
    let sum: f32 = values.iter().sum();
    if sum.abs() < EPSILON {
        let uniform = 1.0 / values.len() as f32;
        values.fill(uniform);
    } else {
        for x in values.iter_mut() {
            *x /= sum;
        }
    }
}

impl FromStr for Normalization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "squared_loss" | "clipped-linear" => Ok(Normalization::ClippedLinear),
            "logistic_loss_basic" | "logistic" => Ok(Normalization::Logistic),
            "min_shift" => Ok(Normalization::MinShift),
            "sigmoid" => Ok(Normalization::Sigmoid),
            _ => Err(Error::UnknownNormalization(s.to_string())),
        }
    }
}

impl TryFrom<String> for Normalization {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Normalization> for String {
    fn from(n: Normalization) -> String {
        n.as_str().to_string()
    }
}

impl Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
