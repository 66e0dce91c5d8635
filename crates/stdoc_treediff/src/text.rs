//! Line-level rendering for changed text files.

use similar::TextDiff;

/// Lines of unchanged context around each hunk, as in `diff -u`.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Render a unified diff between the reference and generated contents of `path`.
///
/// Headers are `--- reference/<path>` and `+++ generated/<path>`.
pub fn unified_diff(path: &str, reference: &str, generated: &str) -> String {
    let old_header = format!("reference/{path}");
    let new_header = format!("generated/{path}");

    TextDiff::from_lines(reference, generated)
        .unified_diff()
        .context_radius(DEFAULT_CONTEXT_LINES)
        .header(&old_header, &new_header)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_change() {
        let diff = unified_diff("index.html", "hello\n", "hello!\n");
        assert!(diff.starts_with("--- reference/index.html\n+++ generated/index.html\n"));
        assert!(diff.contains("\n-hello\n"));
        assert!(diff.contains("\n+hello!\n"));
    }

    #[test]
    fn test_context_is_bounded() {
        let reference: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        let generated = reference.replace("line 10\n", "line ten\n");
        let diff = unified_diff("page.html", &reference, &generated);

        assert!(diff.contains(" line 7\n"));
        assert!(diff.contains(" line 13\n"));
        assert!(!diff.contains(" line 6\n"));
        assert!(!diff.contains(" line 14\n"));
    }

    #[test]
    fn test_identical_text_has_no_hunks() {
        let diff = unified_diff("same.txt", "a\nb\n", "a\nb\n");
        assert!(!diff.contains("@@"));
    }
}
