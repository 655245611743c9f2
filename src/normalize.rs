use std::borrow::Cow;

use serde::Serialize;

/// Invisible-character counts in a pasted diff document.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct DiffTextReport {
    pub zero_width: usize,
    pub control_chars: usize,
    pub crlf_lines: usize,
}

/// The form of a diff line used for marker recognition: surrounding
/// whitespace trimmed and zero-width characters removed. Content lines are
/// never passed through this.
pub fn marker_view(line: &str) -> Cow<'_, str> {
    let trimmed = line.trim();
    if trimmed.chars().any(is_zero_width_char) {
        let cleaned: String = trimmed.chars().filter(|ch| !is_zero_width_char(*ch)).collect();
        Cow::Owned(cleaned.trim().to_string())
    } else {
        Cow::Borrowed(trimmed)
    }
}

pub fn scan_diff_text(text: &str) -> DiffTextReport {
    let mut report = DiffTextReport::default();
    for line in text.split_inclusive('\n') {
        if line.ends_with("\r\n") {
            report.crlf_lines += 1;
        }
        for ch in line.chars() {
            if is_zero_width_char(ch) {
                report.zero_width += 1;
            } else if is_control_char(ch) {
                report.control_chars += 1;
            }
        }
    }
    report
}

fn is_zero_width_char(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{FFFE}'
    )
}

fn is_control_char(ch: char) -> bool {
    ch.is_control() && ch != '\n' && ch != '\t' && ch != '\r'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_view_strips_bom_and_spaces() {
        assert_eq!(marker_view("\u{FEFF}  === END FILE ===  "), "=== END FILE ===");
        assert!(matches!(marker_view("@@ END"), Cow::Borrowed(_)));
    }

    #[test]
    fn scan_counts_invisible_characters() {
        let report = scan_diff_text("a\u{200B}b\r\nc\u{0007}\n");
        assert_eq!(report.zero_width, 1);
        assert_eq!(report.control_chars, 1);
        assert_eq!(report.crlf_lines, 1);
    }
}
