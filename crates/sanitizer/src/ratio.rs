use thiserror::Error;

use crate::cjk_count;

/// Highest CJK share accepted by default.
pub const DEFAULT_MAX_RATIO: f64 = 0.1;

/// Code rejected for carrying too much CJK prose.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("CJK character ratio too high ({:.1}% > {:.1}%)", .ratio * 100.0, .max_ratio * 100.0)]
pub struct PolicyViolation {
    pub ratio: f64,
    pub max_ratio: f64,
}

/// Share of CJK ideographs among all characters of `code`, and whether it is
/// within `max_ratio`. Empty input passes with a ratio of zero.
pub fn validate_ratio(code: &str, max_ratio: f64) -> (bool, f64) {
    let total = code.chars().count();
    if total == 0 {
        return (true, 0.0);
    }
    let ratio = cjk_count(code) as f64 / total as f64;
    (ratio <= max_ratio, ratio)
}

/// [`validate_ratio`] as a `Result`, for callers that propagate with `?`.
pub fn check_ratio(code: &str, max_ratio: f64) -> Result<f64, PolicyViolation> {
    match validate_ratio(code, max_ratio) {
        (true, ratio) => Ok(ratio),
        (false, ratio) => Err(PolicyViolation { ratio, max_ratio }),
    }
}
