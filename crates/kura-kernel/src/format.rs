//! Text formatting shared by every backend.
//!
//! Backends return the same strings for the same situations so an agent
//! cannot tell which substrate served a path: `cat -n` style numbering,
//! the empty-file notice, and the not-found/ambiguous-edit messages.

use kura_types::FileRecord;

/// Notice returned when a file exists but holds no content.
pub const EMPTY_CONTENT_WARNING: &str = "System reminder: File exists but has empty contents";

/// Lines longer than this are split into continuation rows.
pub const MAX_LINE_LENGTH: usize = 10_000;

/// Width of the right-aligned line number column.
pub const LINE_NUMBER_WIDTH: usize = 6;

/// Default number of lines returned by a read.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Token budget for a single tool result (4 chars per token).
pub const TOOL_RESULT_TOKEN_LIMIT: usize = 20_000;

/// Appended to a result cut by [`truncate_if_too_long`].
pub const TRUNCATION_GUIDANCE: &str =
    "... [results truncated, try being more specific with your parameters]";

/// Format lines with 1-based numbers, starting at `start_line`.
///
/// A line over [`MAX_LINE_LENGTH`] characters becomes several rows; the
/// first keeps the plain number, the rest are tagged `N.1`, `N.2`, ...
pub fn format_with_line_numbers<S: AsRef<str>>(lines: &[S], start_line: usize) -> String {
    let mut rows = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let number = i + start_line;
        for (chunk_idx, chunk) in chunk_chars(line, MAX_LINE_LENGTH).into_iter().enumerate() {
            if chunk_idx == 0 {
                rows.push(format!("{:>width$}\t{}", number, chunk, width = LINE_NUMBER_WIDTH));
            } else {
                let marker = format!("{}.{}", number, chunk_idx);
                rows.push(format!("{:>width$}\t{}", marker, chunk, width = LINE_NUMBER_WIDTH));
            }
        }
    }
    rows.join("\n")
}

/// Format a whole string; a single trailing newline does not produce a row.
pub fn format_content_with_line_numbers(content: &str, start_line: usize) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    format_with_line_numbers(&lines, start_line)
}

/// Split on character (not byte) boundaries into pieces of at most `size`.
fn chunk_chars(line: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in line.char_indices() {
        if count == size {
            chunks.push(&line[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&line[start..]);
    chunks
}

/// The empty-file notice, if `content` is blank.
pub fn check_empty_content(content: &str) -> Option<&'static str> {
    if content.trim().is_empty() {
        Some(EMPTY_CONTENT_WARNING)
    } else {
        None
    }
}

/// Format a window of `content` for a read.
pub fn format_read_window(content: &str, offset: usize, limit: usize) -> String {
    if let Some(notice) = check_empty_content(content) {
        return notice.to_string();
    }

    let lines: Vec<&str> = content.lines().collect();
    if offset >= lines.len() {
        return offset_past_end(offset, lines.len());
    }

    let end = offset.saturating_add(limit).min(lines.len());
    format_with_line_numbers(&lines[offset..end], offset + 1)
}

/// Format a window of a stored record for a read.
pub fn format_read_response(record: &FileRecord, offset: usize, limit: usize) -> String {
    format_read_window(&record.content(), offset, limit)
}

/// Error string for a read past the last line.
pub fn offset_past_end(offset: usize, total: usize) -> String {
    format!(
        "Error: Line offset {} exceeds file length ({} lines)",
        offset, total
    )
}

/// Error string for a missing file.
pub fn file_not_found(path: &str) -> String {
    format!("Error: File '{}' not found", path)
}

/// Error string for a create-only write to an existing path.
pub fn already_exists(path: &str) -> String {
    format!(
        "Cannot write to {} because it already exists. Read and then make an edit, or write to a new path.",
        path
    )
}

/// Error string for an edit whose target string is absent.
pub fn string_not_found(old: &str) -> String {
    format!("Error: String not found in file: '{}'", old)
}

/// Error string for an edit that would be ambiguous without `replace_all`.
pub fn ambiguous_match(old: &str, occurrences: usize) -> String {
    format!(
        "Error: String '{}' appears {} times in file. Use replace_all=True to replace all instances, or provide a more specific string with surrounding context.",
        old, occurrences
    )
}

/// Replace `old` with `new`, refusing absent or ambiguous matches.
///
/// Returns the new content and the number of occurrences found, or the
/// error string to hand back to the agent.
pub fn perform_string_replacement(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<(String, usize), String> {
    let occurrences = if old.is_empty() {
        0
    } else {
        content.matches(old).count()
    };

    if occurrences == 0 {
        return Err(string_not_found(old));
    }
    if occurrences > 1 && !replace_all {
        return Err(ambiguous_match(old, occurrences));
    }

    Ok((content.replace(old, new), occurrences))
}

/// Cut a string result that would blow the token budget.
pub fn truncate_if_too_long(result: &str) -> String {
    let budget = TOOL_RESULT_TOKEN_LIMIT * 4;
    match result.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}\n{}", &result[..cut], TRUNCATION_GUIDANCE),
        None => result.to_string(),
    }
}

/// Cut a list result so the kept items fit the token budget.
pub fn truncate_list_if_too_long(items: Vec<String>) -> Vec<String> {
    let budget = TOOL_RESULT_TOKEN_LIMIT * 4;
    let total: usize = items.iter().map(|s| s.chars().count()).sum();
    if total <= budget {
        return items;
    }
    let keep = items.len() * budget / total;
    let mut kept: Vec<String> = items.into_iter().take(keep).collect();
    kept.push(TRUNCATION_GUIDANCE.to_string());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_right_aligned_with_tab() {
        let out = format_with_line_numbers(&["alpha", "beta"], 1);
        assert_eq!(out, "     1\talpha\n     2\tbeta");
    }

    #[test]
    fn start_line_offsets_numbers() {
        let out = format_with_line_numbers(&["x"], 42);
        assert_eq!(out, "    42\tx");
    }

    #[test]
    fn long_lines_get_continuation_rows() {
        let long = "a".repeat(MAX_LINE_LENGTH * 2 + 5);
        let out = format_with_line_numbers(&["short", long.as_str()], 4);
        let rows: Vec<&str> = out.split('\n').collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[1].starts_with("     5\t"));
        assert!(rows[2].starts_with("   5.1\t"));
        assert!(rows[3].starts_with("   5.2\t"));
        assert_eq!(rows[3].len(), "   5.2\t".len() + 5);
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let line = "é".repeat(MAX_LINE_LENGTH + 1);
        let chunks = chunk_chars(&line, MAX_LINE_LENGTH);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_LINE_LENGTH);
        assert_eq!(chunks[1], "é");
    }

    #[test]
    fn trailing_newline_is_not_a_row() {
        assert_eq!(format_content_with_line_numbers("a\nb\n", 1), "     1\ta\n     2\tb");
    }

    #[test]
    fn read_window_handles_empty_and_offsets() {
        assert_eq!(format_read_window("", 0, 10), EMPTY_CONTENT_WARNING);
        assert_eq!(format_read_window("  \n", 0, 10), EMPTY_CONTENT_WARNING);
        assert_eq!(
            format_read_window("a\nb", 5, 10),
            "Error: Line offset 5 exceeds file length (2 lines)"
        );
        assert_eq!(format_read_window("a\nb\nc", 1, 1), "     2\tb");
    }

    #[test]
    fn replacement_rejects_missing_and_ambiguous() {
        assert_eq!(
            perform_string_replacement("hello", "bye", "x", false).unwrap_err(),
            "Error: String not found in file: 'bye'"
        );
        let err = perform_string_replacement("aa aa", "aa", "b", false).unwrap_err();
        assert!(err.starts_with("Error: String 'aa' appears 2 times in file."));
        assert_eq!(
            perform_string_replacement("aa aa", "aa", "b", true).unwrap(),
            ("b b".to_string(), 2)
        );
        assert_eq!(
            perform_string_replacement("one two", "two", "2", false).unwrap(),
            ("one 2".to_string(), 1)
        );
    }

    #[test]
    fn truncation_appends_guidance() {
        let small = "ok".to_string();
        assert_eq!(truncate_if_too_long(&small), "ok");

        let big = "x".repeat(TOOL_RESULT_TOKEN_LIMIT * 4 + 10);
        let cut = truncate_if_too_long(&big);
        assert!(cut.ends_with(TRUNCATION_GUIDANCE));
        assert_eq!(cut.len(), TOOL_RESULT_TOKEN_LIMIT * 4 + 1 + TRUNCATION_GUIDANCE.len());
    }

    #[test]
    fn list_truncation_keeps_proportional_prefix() {
        let items: Vec<String> = (0..10).map(|_| "y".repeat(TOOL_RESULT_TOKEN_LIMIT)).collect();
        let kept = truncate_list_if_too_long(items);
        assert_eq!(kept.len(), 5);
        assert_eq!(kept.last().unwrap(), TRUNCATION_GUIDANCE);
    }
}
