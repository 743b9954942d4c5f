use std::sync::LazyLock;

use regex::{Regex, RegexSet};

use crate::{cjk_count, is_cjk};

/// Opening fence at line start with an optional language tag.
#[allow(clippy::expect_used)]
static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```\w*\s*\n?").expect("opening fence pattern is valid"));

/// Any leftover fence delimiter.
#[allow(clippy::expect_used)]
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\n?").expect("fence pattern is valid"));

#[allow(clippy::expect_used)]
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run pattern is valid"));

/// Phrases that mark a line as explanation written around the code rather
/// than code.
#[allow(clippy::expect_used)]
static EXPLANATORY_PHRASES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"这段代码",
        r"以上代码",
        r"这个.*实现了",
        r"注意.*事项",
        r"建议.*使用",
        r"可以.*优化",
        r"推荐.*方式",
        r"另外.*可以",
        r"如果.*需要",
        r"当.*时候",
        r"为了.*安全",
        r"确保.*正确",
        r"避免.*问题",
    ])
    .expect("explanatory phrase patterns are valid")
});

/// CJK share above which a line with an explanatory phrase is dropped.
const PHRASE_LINE_RATIO: f64 = 0.3;

/// CJK share above which a non-comment line is dropped.
const PROSE_LINE_RATIO: f64 = 0.6;

fn is_allowed(c: char) -> bool {
    matches!(c, ' '..='~' | '\t' | '\n' | '\r') || is_cjk(c)
}

/// Whether a trimmed, non-empty line should survive cleaning.
fn keep_line(trimmed: &str) -> bool {
    let len = trimmed.chars().count() as f64;
    let cjk = cjk_count(trimmed) as f64;

    if cjk > len * PHRASE_LINE_RATIO && EXPLANATORY_PHRASES.is_match(trimmed) {
        return false;
    }
    if cjk > len * PROSE_LINE_RATIO && !trimmed.starts_with('#') {
        return false;
    }
    true
}

/// Clean pasted source code.
///
/// Characters outside printable ASCII, CJK ideographs, tab, newline and
/// carriage return are removed first, so zero-width spaces, BOMs, controls and
/// replacement characters never reach the later steps. Markdown fences are
/// then stripped, and lines are dropped when blank, when they read as
/// explanatory prose (CJK share above 30% plus a known phrase), or when they
/// are mostly CJK (above 60%) without being `#` comments. Kept lines retain
/// their indentation.
///
/// The output is never longer than the input, and `clean(clean(x)) == clean(x)`.
pub fn clean(raw: &str) -> String {
    let filtered: String = raw.chars().filter(|&c| is_allowed(c)).collect();
    let unfenced = OPENING_FENCE.replace_all(&filtered, "");
    let unfenced = FENCE.replace_all(&unfenced, "");

    let kept: Vec<&str> = unfenced
        .split('\n')
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && keep_line(trimmed)
        })
        .collect();

    let joined = kept.join("\n");
    BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
}
