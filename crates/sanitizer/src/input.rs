/// Longest free-text input kept, in characters.
pub const MAX_INPUT_CHARS: usize = 50_000;

/// Strip control characters (keeping tab, newline and carriage return) and
/// truncate to [`MAX_INPUT_CHARS`] characters.
pub fn sanitize_input(text: &str) -> String {
    text.chars()
        .filter(|&c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .take(MAX_INPUT_CHARS)
        .collect()
}
