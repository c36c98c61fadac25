// File: src/services/snapshots/normalizer.rs
//
// Display text of the ranking table -> typed, nullable values.
use std::num::IntErrorKind;
use thiserror::Error;
use tracing::warn;

/// Placeholders the table shows instead of a value.
pub const NULL_SENTINELS: [&str; 3] = ["", "--", "?"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("'{text}' is not a decimal number")]
    Decimal { text: String },

    #[error("'{text}' is not an integer")]
    Integer { text: String },
}

pub fn is_null_sentinel(text: &str) -> bool {
    NULL_SENTINELS.contains(&text.trim())
}

/// Price, market cap and volume cells: `"$1,234.56"` -> `1234.56`.
pub fn money(text: &str) -> Result<Option<f64>, NormalizeError> {
    decimal(text, &['$', ','])
}

/// Change cells: `"-3.4%"`, `"<0.01%"`, `"1,204.5 %"`.
pub fn percent_change(text: &str) -> Result<Option<f64>, NormalizeError> {
    decimal(text, &['%', ',', '<', '>', ' '])
}

/// Supply cells carry a unit after the number: `"1,000,000 XYZ"` -> `1000000`.
///
/// Values beyond `i64` become null rather than failing the run; hyper-inflated
/// tokens legitimately report supplies that large.
pub fn supply(text: &str) -> Result<Option<i64>, NormalizeError> {
    let trimmed = text.trim();
    let number = trimmed.split_whitespace().next().unwrap_or_default();
    if is_null_sentinel(number) {
        return Ok(None);
    }

    let digits = strip(number, &[',', ' ']);
    match digits.parse::<i64>() {
        Ok(value) => Ok(Some(value)),
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            warn!("Supply '{}' does not fit in i64, storing null", trimmed);
            Ok(None)
        }
        Err(_) => Err(NormalizeError::Integer {
            text: text.to_string(),
        }),
    }
}

/// Rank cells. `None` means the row cannot be placed in the ranking at all.
pub fn rank(text: &str) -> Option<i32> {
    text.trim().parse::<i32>().ok().filter(|rank| *rank > 0)
}

fn decimal(text: &str, decorations: &[char]) -> Result<Option<f64>, NormalizeError> {
    if is_null_sentinel(text) {
        return Ok(None);
    }

    let stripped = strip(text.trim(), decorations);
    if is_null_sentinel(&stripped) {
        return Ok(None);
    }

    match stripped.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(NormalizeError::Decimal {
            text: text.to_string(),
        }),
    }
}

fn strip(text: &str, decorations: &[char]) -> String {
    text.chars().filter(|c| !decorations.contains(c)).collect()
}
