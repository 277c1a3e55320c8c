//! `<#name#>` placeholder navigation.
//!
//! Offsets are character offsets. A placeholder never spans a newline, so
//! every scan is limited to the line holding the caret.

use std::ops::Range;

/// Character range of the line containing `caret`, without the newline.
fn line_bounds(chars: &[char], caret: usize) -> Option<Range<usize>> {
    if caret > chars.len() {
        return None;
    }
    let start = chars[..caret]
        .iter()
        .rposition(|&c| c == '\n')
        .map_or(0, |i| i + 1);
    let end = chars[caret..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |i| caret + i);
    Some(start..end)
}

/// All placeholders on the line containing `caret`, in order.
fn placeholders_on_line(chars: &[char], caret: usize) -> Vec<Range<usize>> {
    let Some(line) = line_bounds(chars, caret) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut i = line.start;
    while i + 1 < line.end {
        if chars[i] == '<' && chars[i + 1] == '#' {
            let close = (i + 2..line.end.saturating_sub(1))
                .find(|&j| chars[j] == '#' && chars[j + 1] == '>');
            match close {
                Some(j) => {
                    found.push(i..j + 2);
                    i = j + 2;
                }
                None => break,
            }
        } else {
            i += 1;
        }
    }
    found
}

/// The placeholder the caret is on, if any.
pub fn placeholder_at(text: &str, caret: usize) -> Option<Range<usize>> {
    let chars: Vec<char> = text.chars().collect();
    placeholders_on_line(&chars, caret)
        .into_iter()
        .find(|r| r.start <= caret && caret < r.end)
}

/// First placeholder starting at or after `caret` on the same line.
pub fn next_placeholder(text: &str, caret: usize) -> Option<Range<usize>> {
    let chars: Vec<char> = text.chars().collect();
    placeholders_on_line(&chars, caret)
        .into_iter()
        .find(|r| r.start >= caret)
}

/// Last placeholder ending at or before `caret` on the same line.
pub fn previous_placeholder(text: &str, caret: usize) -> Option<Range<usize>> {
    let chars: Vec<char> = text.chars().collect();
    placeholders_on_line(&chars, caret)
        .into_iter()
        .rev()
        .find(|r| r.end <= caret)
}

/// Replaces the placeholder at `range` with its content.
///
/// Returns the new text and the caret position right after the inserted
/// content, or `None` when `range` is not exactly a placeholder.
pub fn fill_placeholder(text: &str, range: Range<usize>) -> Option<(String, usize)> {
    let chars: Vec<char> = text.chars().collect();
    if range.end > chars.len() || range.end < range.start + 4 {
        return None;
    }
    let span = &chars[range.clone()];
    let is_placeholder = span.starts_with(&['<', '#'])
        && span.ends_with(&['#', '>'])
        && !span.contains(&'\n');
    if !is_placeholder {
        return None;
    }
    let content = &span[2..span.len() - 2];
    let mut out: String = chars[..range.start].iter().collect();
    out.extend(content);
    out.extend(&chars[range.end..]);
    Some((out, range.start + content.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "say(<#speaker#>, <#text#>)\nwait(<#milliseconds#>)";

    #[test]
    fn test_navigation_stays_on_line() {
        assert_eq!(next_placeholder(LINE, 0), Some(4..15));
        assert_eq!(next_placeholder(LINE, 15), Some(17..25));
        assert_eq!(next_placeholder(LINE, 25), None);
        assert_eq!(previous_placeholder(LINE, 25), Some(17..25));
        assert_eq!(previous_placeholder(LINE, 16), Some(4..15));
        assert_eq!(previous_placeholder(LINE, 3), None);
        // Second line.
        assert_eq!(next_placeholder(LINE, 27), Some(32..48));
        assert_eq!(previous_placeholder(LINE, 30), None);
    }

    #[test]
    fn test_placeholder_at_caret() {
        assert_eq!(placeholder_at(LINE, 6), Some(4..15));
        assert_eq!(placeholder_at(LINE, 15), None);
        assert_eq!(placeholder_at(LINE, 500), None);
    }

    #[test]
    fn test_unclosed_markers_terminate() {
        let test_cases = vec!["<#", "<#open\n#>", "a <# b # > c", "#><#", "<##>"];
        for text in test_cases {
            let len = text.chars().count();
            for caret in 0..=len + 1 {
                let _ = next_placeholder(text, caret);
                let _ = previous_placeholder(text, caret);
            }
        }
        assert_eq!(next_placeholder("<##>", 0), Some(0..4));
        assert_eq!(next_placeholder("<#open\n#>", 0), None);
    }

    #[test]
    fn test_fill() {
        let (text, caret) = fill_placeholder(LINE, 4..15).unwrap();
        assert!(text.starts_with("say(speaker, <#text#>)"));
        assert_eq!(caret, 11);
        assert_eq!(fill_placeholder(LINE, 0..4), None);
        assert_eq!(fill_placeholder(LINE, 40..400), None);
    }
}
