//! Lenient scalar decoding.
//!
//! The rate API and the comparison procedure both return loosely typed
//! payloads: the same column can hold `"12"`, `12`, `12.0` or `null`
//! depending on the row. These helpers accept any of them and normalise to
//! either display text or a float.
//!
//! # Examples
//!
//! ```
//! use rates_core::lenient::{format_number, parse_rate};
//!
//! assert_eq!(format_number(12.0), "12");
//! assert_eq!(format_number(3.25), "3.25");
//! assert_eq!(parse_rate(" 3.10 "), Some(3.1));
//! assert_eq!(parse_rate("n/a"), None);
//! ```

use serde::{Deserialize, Deserializer};

/// A JSON-ish scalar of unknown type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Textual value
    Text(String),
    /// Numeric value (integers are widened)
    Number(f64),
    /// Boolean value
    Flag(bool),
}

impl Scalar {
    /// Render the scalar as display text.
    pub fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => format_number(n),
            Scalar::Flag(b) => b.to_string(),
        }
    }

    /// Interpret the scalar as a number, parsing text if needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(s) => parse_rate(s),
            Scalar::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }
}

/// Format a number without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// Parse a rate or other decimal, returning `None` for anything unparseable.
pub fn parse_rate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Deserialize an optional scalar into optional display text.
///
/// Blank strings become `None`.
pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(Scalar::into_text)
        .filter(|s| !s.trim().is_empty()))
}

/// Deserialize an optional scalar into an optional float.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}
