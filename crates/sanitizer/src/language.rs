use std::fmt;
use std::sync::LazyLock;

use regex::RegexSet;

#[allow(clippy::expect_used)]
static PYTHON_MARKERS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bimport\s+\w+",
        r"\bfrom\s+\w+\s+import",
        r"\bdef\s+\w+\s*\(",
        r"\bclass\s+\w+\s*\(",
        r#"\bif\s+__name__\s*==\s*["']__main__["']"#,
        r"\bprint\s*\(",
    ])
    .expect("python marker patterns are valid")
});

#[allow(clippy::expect_used)]
static JAVASCRIPT_MARKERS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bfunction\s+\w+\s*\(",
        r"\bvar\s+\w+\s*=",
        r"\blet\s+\w+\s*=",
        r"\bconst\s+\w+\s*=",
        r"\bconsole\.log\s*\(",
        r"=>",
    ])
    .expect("javascript marker patterns are valid")
});

/// Best guess at the language of a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    Unknown,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::JavaScript => write!(f, "javascript"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Guess the language of `code` by counting which marker patterns appear.
///
/// Python needs strictly more distinct markers than JavaScript; otherwise any
/// JavaScript marker wins.
pub fn detect_language(code: &str) -> Language {
    let python = PYTHON_MARKERS.matches(code).iter().count();
    let javascript = JAVASCRIPT_MARKERS.matches(code).iter().count();

    if python > javascript {
        Language::Python
    } else if javascript > 0 {
        Language::JavaScript
    } else {
        Language::Unknown
    }
}
