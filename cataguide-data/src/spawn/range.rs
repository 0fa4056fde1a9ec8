//! Count, repeat and charge ranges, and the repeat-probability math.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RepeatModel;
use crate::numbers::{
    clamp_probability, round_f64_to_i64, round_f64_to_u32, u32_to_f64, u32_to_i32_saturating,
};

/// Inclusive integer range used for item counts and roll repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const ONE: Self = Self { min: 1, max: 1 };

    #[must_use]
    pub const fn exact(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    #[must_use]
    pub const fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    /// Parse `n`, `[n]` or `[min, max]`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(|v| Self::exact(round_f64_to_u32(v))),
            Value::Array(bounds) => match bounds.as_slice() {
                [single] => single.as_f64().map(|v| Self::exact(round_f64_to_u32(v))),
                [lo, hi] => Some(Self::new(
                    round_f64_to_u32(lo.as_f64()?),
                    round_f64_to_u32(hi.as_f64()?),
                )),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn midpoint(self) -> f64 {
        (u32_to_f64(self.min) + u32_to_f64(self.max)) / 2.0
    }

    #[must_use]
    pub const fn is_one(self) -> bool {
        self.min == 1 && self.max == 1
    }

    /// Share of the range's integers that are at least one.
    #[must_use]
    pub fn nonzero_fraction(self) -> f64 {
        if self.min > 0 {
            return 1.0;
        }
        let span = u32_to_f64(self.max) + 1.0;
        u32_to_f64(self.max) / span
    }
}

impl Default for CountRange {
    fn default() -> Self {
        Self::ONE
    }
}

/// Charges declared on an item entry; descriptive only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRange {
    pub min: i64,
    pub max: i64,
}

impl ChargeRange {
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let bound = |v: &Value| v.as_f64().map(round_f64_to_i64);
        match value {
            Value::Number(_) => bound(value).map(|v| Self { min: v, max: v }),
            Value::Array(bounds) => match bounds.as_slice() {
                [single] => bound(single).map(|v| Self { min: v, max: v }),
                [lo, hi] => {
                    let (lo, hi) = (bound(lo)?, bound(hi)?);
                    Some(Self {
                        min: lo.min(hi),
                        max: lo.max(hi),
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Smallest range covering both.
    #[must_use]
    pub fn envelope(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Probability that something with per-roll chance `p` appears at least once
/// over `rolls` independent rolls.
#[must_use]
pub fn repeat_probability(p: f64, rolls: CountRange, model: RepeatModel) -> f64 {
    let p = clamp_probability(p);
    let miss = 1.0 - p;
    let hit = match model {
        RepeatModel::ExpectedRolls => 1.0 - miss.powf(rolls.midpoint()),
        RepeatModel::UniformRolls => {
            if miss >= 1.0 {
                return 0.0;
            }
            // Mean of 1 - miss^k over k in [min, max], via the geometric sum.
            let span = u32_to_f64(rolls.max - rolls.min) + 1.0;
            let count = u32_to_i32_saturating(rolls.max - rolls.min + 1);
            let first = miss.powi(u32_to_i32_saturating(rolls.min));
            let misses = first * (1.0 - miss.powi(count)) / (1.0 - miss);
            1.0 - misses / span
        }
    };
    clamp_probability(hit)
}
