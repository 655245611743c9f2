use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};

const RED: &str = "\u{1b}[31m";
const GREEN: &str = "\u{1b}[32m";
const CYAN: &str = "\u{1b}[36m";
const RESET: &str = "\u{1b}[0m";

#[derive(Debug, Clone, Copy)]
pub struct DiffStyle {
    pub context: usize,
    pub color: bool,
}

impl Default for DiffStyle {
    fn default() -> Self {
        Self {
            context: 3,
            color: false,
        }
    }
}

/// Line diff of `old` against `new`, one `- `/`+ `/`  ` prefixed line per
/// change, hunks separated by `...`.
pub fn render_diff(old: &str, new: &str, style: DiffStyle) -> String {
    let diff = TextDiff::configure()
        .algorithm(similar::Algorithm::Myers)
        .diff_lines(old, new);

    let mut out = String::new();
    for (idx, group) in diff.grouped_ops(style.context).iter().enumerate() {
        if idx > 0 {
            let _ = writeln!(out, "{}", paint("...", CYAN, style.color));
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("- ", RED),
                    ChangeTag::Insert => ("+ ", GREEN),
                    ChangeTag::Equal => ("  ", ""),
                };
                let mut line = format!("{sign}{}", change.value());
                if change.missing_newline() {
                    line.push('\n');
                }
                let body = line.trim_end_matches(['\n', '\r']);
                let _ = writeln!(out, "{}", paint(body, color, style.color && !color.is_empty()));
            }
        }
    }
    out
}

pub fn print_diff(old: &str, new: &str, style: DiffStyle) {
    print!("{}", render_diff(old, new, style));
}

fn paint(text: &str, color: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_diff_marks_changes() {
        let rendered = render_diff("a\nb\nc\n", "a\nB\nc\n", DiffStyle::default());
        assert_eq!(rendered, "  a\n- b\n+ B\n  c\n");
    }

    #[test]
    fn colored_diff_wraps_changed_lines() {
        let style = DiffStyle {
            context: 0,
            color: true,
        };
        let rendered = render_diff("x\n", "y\n", style);
        assert_eq!(rendered, "\u{1b}[31m- x\u{1b}[0m\n\u{1b}[32m+ y\u{1b}[0m\n");
    }

    #[test]
    fn distant_hunks_are_separated() {
        let old: String = (1..=20).map(|n| format!("line{n}\n")).collect();
        let new = old
            .replace("line2\n", "two\n")
            .replace("line19\n", "nineteen\n");
        let rendered = render_diff(&old, &new, DiffStyle { context: 1, color: false });
        assert!(rendered.contains("...\n"));
        assert!(rendered.contains("+ nineteen"));
    }
}
