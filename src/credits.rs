//! Credit balance stored in a user's public metadata.

use serde_json::{Map, Number, Value};

/// Public metadata key holding the balance.
pub const CREDITS_KEY: &str = "credits";

/// Provider-managed key/value attributes attached to a user.
pub type PublicMetadata = Map<String, Value>;

/// Largest magnitude below which every integral `f64` is exact.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A numeric balance. Always finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Credits(f64);

impl Credits {
    /// Non-finite values collapse to zero.
    pub fn new(value: f64) -> Self {
        Self(if value.is_finite() { value } else { 0.0 })
    }

    /// Read the balance from public metadata.
    ///
    /// Any JSON number or numeric string is accepted as is, fractions
    /// included. Anything else, including a missing entry, reads as zero.
    pub fn from_metadata(metadata: &PublicMetadata) -> Self {
        Self::new(metadata.get(CREDITS_KEY).and_then(parse_value).unwrap_or(0.0))
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    pub fn is_exhausted(self) -> bool {
        self.0 <= 0.0
    }

    pub fn decremented(self) -> Self {
        Self::new(self.0 - 1.0)
    }

    /// JSON form of the balance; integral balances are written as integers.
    pub fn to_json(self) -> Value {
        if self.0.fract() == 0.0 && self.0.abs() < MAX_EXACT_INTEGER {
            Value::from(self.0 as i64)
        } else {
            Number::from_f64(self.0).map_or(Value::from(0), Value::Number)
        }
    }

    /// Metadata patch that stores this balance.
    pub fn to_patch(self) -> PublicMetadata {
        let mut patch = Map::with_capacity(1);
        patch.insert(CREDITS_KEY.to_string(), self.to_json());
        patch
    }
}

fn parse_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
