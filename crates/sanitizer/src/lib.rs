//! Pre-execution content checks for submitted source code.
//!
//! - [`clean`]: strip pasted prose, fences and stray characters from code
//! - [`validate_ratio`] / [`check_ratio`]: reject code that is mostly CJK text
//! - [`sanitize_input`]: bound and de-control free-text fields
//! - [`detect_language`]: rough Python/JavaScript guess
//!
//! Every function here is pure and total.

mod clean;
mod input;
mod language;
mod ratio;

pub use clean::clean;
pub use input::{MAX_INPUT_CHARS, sanitize_input};
pub use language::{Language, detect_language};
pub use ratio::{DEFAULT_MAX_RATIO, PolicyViolation, check_ratio, validate_ratio};

/// Whether `c` is in the CJK Unified Ideographs block (U+4E00..=U+9FFF).
pub(crate) fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Count of CJK ideographs in `s`.
pub(crate) fn cjk_count(s: &str) -> usize {
    s.chars().filter(|&c| is_cjk(c)).count()
}
