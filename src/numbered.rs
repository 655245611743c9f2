use std::fmt::Write as _;

use anyhow::{Result, anyhow, bail};

/// Which part of a file to number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slice {
    #[default]
    All,
    Range {
        start: usize,
        end: usize,
    },
    Around {
        line: usize,
        context: usize,
    },
}

impl Slice {
    fn bounds(self, total: usize) -> (usize, usize) {
        match self {
            Slice::All => (0, total),
            Slice::Range { start, end } => to_indices(start, end, total),
            Slice::Around { line, context } => to_indices(
                line.saturating_sub(context).max(1),
                line.saturating_add(context),
                total,
            ),
        }
    }
}

/// One `{n:>4}| line` row per line, numbered from 1 against the file as it
/// is on disk.
pub fn render(lines: &[String], slice: Slice) -> String {
    let (start, end) = slice.bounds(lines.len());
    let mut out = String::new();
    for (offset, line) in lines[start..end].iter().enumerate() {
        let number = start + offset + 1;
        let _ = writeln!(out, "{number:>4}| {line}");
    }
    out
}

fn to_indices(start_line: usize, end_line: usize, total_lines: usize) -> (usize, usize) {
    let start = start_line.saturating_sub(1).min(total_lines);
    let end = end_line.min(total_lines).max(start);
    (start, end)
}

/// `START:END` or `START-END`, both 1-based and inclusive.
pub fn parse_range_spec(spec: &str) -> Result<Slice> {
    let mut parts = spec.split([':', '-']);
    let start = parts
        .next()
        .ok_or_else(|| anyhow!("range spec requires start:end"))?;
    let end = parts
        .next()
        .ok_or_else(|| anyhow!("range spec requires start:end"))?;

    if parts.next().is_some() {
        bail!("range spec should be in the form start:end");
    }

    let start = start.trim().parse::<usize>()?;
    let end = end.trim().parse::<usize>()?;
    if start == 0 || end == 0 {
        bail!("line numbers start at 1");
    }
    if start > end {
        bail!("range start must be <= end");
    }
    Ok(Slice::Range { start, end })
}

/// `LINE:CONTEXT`, e.g. `42:5` for lines 37 through 47.
pub fn parse_line_context(spec: &str) -> Result<Slice> {
    let mut parts = spec.split([':', ',']);
    let line = parts
        .next()
        .ok_or_else(|| anyhow!("around spec requires line:context"))?;
    let context = parts
        .next()
        .ok_or_else(|| anyhow!("around spec requires line:context"))?;

    let line = line.trim().parse::<usize>()?;
    let context = context.trim().parse::<usize>()?;
    if line == 0 {
        bail!("line numbers start at 1");
    }

    Ok(Slice::Around { line, context })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numbers_every_line() {
        let text = render(&lines(&["fn main() {", "}"]), Slice::All);
        assert_eq!(text, "   1| fn main() {\n   2| }\n");
        assert_eq!(render(&[], Slice::All), "");
    }

    #[test]
    fn slices_clamp_to_file() {
        let file = lines(&["a", "b", "c", "d", "e"]);
        assert_eq!(
            render(&file, Slice::Range { start: 4, end: 9 }),
            "   4| d\n   5| e\n"
        );
        assert_eq!(
            render(&file, Slice::Around { line: 1, context: 1 }),
            "   1| a\n   2| b\n"
        );
        assert_eq!(render(&file, Slice::Range { start: 7, end: 9 }), "");
        assert_eq!(
            render(&file, Slice::Around { line: 5, context: usize::MAX }),
            render(&file, Slice::All)
        );
    }

    #[test]
    fn parse_specs() {
        assert_eq!(
            parse_range_spec("10:20").unwrap(),
            Slice::Range { start: 10, end: 20 }
        );
        assert_eq!(
            parse_range_spec("3-4").unwrap(),
            Slice::Range { start: 3, end: 4 }
        );
        assert!(parse_range_spec("0:2").is_err());
        assert!(parse_range_spec("5:2").is_err());
        assert_eq!(
            parse_line_context("42:5").unwrap(),
            Slice::Around { line: 42, context: 5 }
        );
    }
}
