//! Small display/normalization helpers shared across modules.

/// Terminal line-break representation used by `format_display_text`.
const LINE_BREAK: &str = "\n";

/// Normalize assistant-originated text for display.
///
/// The assistant sometimes emits the literal two-character sequence `\n`
/// instead of a real newline. Both forms (and CRLF) must render as a line
/// break, so every assistant-originated string shown to the user passes
/// through this transform.
pub fn format_display_text(raw: &str) -> String {
    raw.replace("\r\n", LINE_BREAK)
        .replace("\\n", LINE_BREAK)
}

/// Normalize a string for fuzzy matching: lowercase + ASCII alphanumeric only.
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_escape_becomes_line_break() {
        let formatted = format_display_text("Line1\\nLine2");
        assert_eq!(formatted, "Line1\nLine2");
        assert_eq!(formatted.lines().count(), 2);
    }

    #[test]
    fn test_real_newline_preserved() {
        let formatted = format_display_text("Line3\nLine4");
        assert_eq!(formatted, "Line3\nLine4");
        assert_eq!(formatted.lines().count(), 2);
    }

    #[test]
    fn test_crlf_normalized() {
        assert_eq!(format_display_text("a\r\nb"), "a\nb");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Acme Cheese Co."), "acmecheeseco");
        assert_eq!(normalize_key("  RRB-01 "), "rrb01");
    }
}
