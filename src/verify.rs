use std::path::Path;

/// New content for one file, offered to verifiers before it is written.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub path: &'a Path,
    /// `None` when the file does not exist yet.
    pub original: Option<&'a str>,
    pub content: &'a str,
}

/// A check run on every modified or created file before it touches disk.
pub trait Verifier {
    fn name(&self) -> &str;
    fn verify(&self, candidate: &Candidate<'_>) -> Result<(), String>;
}

const BRACE_EXTENSIONS: [&str; 14] = [
    "cs", "java", "js", "ts", "jsx", "tsx", "go", "rs", "swift", "kt", "cpp", "c", "h", "hpp",
];

/// Bracket balance for brace languages. A file that was already unbalanced
/// before the edit is not held to the check.
#[derive(Debug, Clone, Copy, Default)]
pub struct BraceBalance;

impl BraceBalance {
    pub fn applies_to(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| BRACE_EXTENSIONS.contains(&ext.as_str()))
    }
}

impl Verifier for BraceBalance {
    fn name(&self) -> &str {
        "brace_balance"
    }

    fn verify(&self, candidate: &Candidate<'_>) -> Result<(), String> {
        if !Self::applies_to(candidate.path) {
            return Ok(());
        }
        if candidate
            .original
            .is_some_and(|original| check_balance(original).is_err())
        {
            return Ok(());
        }
        check_balance(candidate.content)
    }
}

/// Rejects a result that lost almost all of a non-trivial original.
#[derive(Debug, Clone, Copy)]
pub struct ShrinkGuard {
    pub min_original_chars: usize,
    pub min_result_ratio: f64,
}

impl Default for ShrinkGuard {
    fn default() -> Self {
        Self {
            min_original_chars: 200,
            min_result_ratio: 0.1,
        }
    }
}

impl Verifier for ShrinkGuard {
    fn name(&self) -> &str {
        "shrink_guard"
    }

    fn verify(&self, candidate: &Candidate<'_>) -> Result<(), String> {
        let Some(original) = candidate.original else {
            return Ok(());
        };
        let before = original.trim().chars().count();
        let after = candidate.content.trim().chars().count();
        if before <= self.min_original_chars {
            return Ok(());
        }
        if (after as f64) < before as f64 * self.min_result_ratio {
            let pct = after * 100 / before;
            return Err(format!(
                "result is only {pct}% of the original ({after} of {before} characters)"
            ));
        }
        Ok(())
    }
}

pub fn check_balance(text: &str) -> Result<(), String> {
    let cleaned = strip_strings_and_comments(text);
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    for ch in cleaned.chars() {
        match ch {
            '\n' => line += 1,
            '{' | '(' | '[' => stack.push((ch, line)),
            '}' | ')' | ']' => {
                let expected = match ch {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                match stack.last() {
                    None => {
                        return Err(format!(
                            "unexpected '{ch}' at line ~{line} with no matching '{expected}'"
                        ));
                    }
                    Some(&(open, opened_at)) if open != expected => {
                        return Err(format!(
                            "mismatched '{ch}' at line ~{line}, expected a close for '{open}' opened at line ~{opened_at}"
                        ));
                    }
                    Some(_) => {
                        stack.pop();
                    }
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        return Ok(());
    }
    let unclosed: Vec<String> = stack
        .iter()
        .rev()
        .take(5)
        .rev()
        .map(|(ch, at)| format!("'{ch}' at line ~{at}"))
        .collect();
    Err(format!(
        "{} unclosed bracket(s): {}",
        stack.len(),
        unclosed.join(", ")
    ))
}

/// Removes comments and string literals so only structural brackets remain.
/// Newlines are kept so line numbers in messages stay meaningful. Brackets
/// inside interpolation holes (`${...}`, C# `$"{...}"`) are kept.
pub fn strip_strings_and_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let at = |idx: usize| chars.get(idx).copied();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if c == '/' && at(i + 1) == Some('*') {
            i += 2;
            while i < len && !(chars[i] == '*' && at(i + 1) == Some('/')) {
                if chars[i] == '\n' {
                    out.push('\n');
                }
                i += 1;
            }
            i += 2;
            continue;
        }
        if c == '/' && at(i + 1) == Some('/') {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '@' || c == '$' {
            let prefix = match (c, at(i + 1), at(i + 2)) {
                ('@', Some('"'), _) => Some((true, false, 2)),
                ('$', Some('"'), _) => Some((false, true, 2)),
                ('$', Some('@'), Some('"')) | ('@', Some('$'), Some('"')) => Some((true, true, 3)),
                _ => None,
            };
            if let Some((verbatim, interpolated, skip)) = prefix {
                i = skip_csharp_string(&chars, i + skip, verbatim, interpolated, &mut out);
                continue;
            }
        }

        match c {
            '"' => {
                i += 1;
                while i < len {
                    match chars[i] {
                        '\\' => i += 2,
                        '"' => {
                            i += 1;
                            break;
                        }
                        ch => {
                            if ch == '\n' {
                                out.push('\n');
                            }
                            i += 1;
                        }
                    }
                }
            }
            '\'' => match char_literal_end(&chars, i) {
                Some(next) => i = next,
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            '`' => i = skip_template_literal(&chars, i + 1, &mut out),
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// A quote closing within a few characters is a char literal; otherwise the
/// quote is kept as code (Rust lifetimes, apostrophes).
fn char_literal_end(chars: &[char], open: usize) -> Option<usize> {
    let limit = (open + 6).min(chars.len());
    let mut scan = open + 1;
    while scan < limit {
        match chars[scan] {
            '\\' => scan += 2,
            '\'' => return Some(scan + 1),
            '\n' => return None,
            _ => scan += 1,
        }
    }
    None
}

fn skip_template_literal(chars: &[char], mut i: usize, out: &mut String) -> usize {
    let len = chars.len();
    while i < len {
        match chars[i] {
            '\\' => i += 2,
            '`' => return i + 1,
            '$' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
                let mut depth = 1;
                while i < len && depth > 0 {
                    let ch = chars[i];
                    match ch {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if matches!(ch, '{' | '}' | '\n') {
                        out.push(ch);
                    }
                    i += 1;
                }
            }
            ch => {
                if ch == '\n' {
                    out.push('\n');
                }
                i += 1;
            }
        }
    }
    i
}

fn skip_csharp_string(
    chars: &[char],
    mut i: usize,
    verbatim: bool,
    interpolated: bool,
    out: &mut String,
) -> usize {
    let len = chars.len();
    let mut depth: usize = 0;
    while i < len {
        let ch = chars[i];
        if verbatim {
            if ch == '"' {
                if chars.get(i + 1) == Some(&'"') {
                    i += 2;
                    continue;
                }
                return i + 1;
            }
        } else {
            if ch == '\\' {
                i += 2;
                continue;
            }
            if ch == '"' && depth == 0 {
                return i + 1;
            }
        }

        if interpolated {
            if ch == '{' || ch == '}' {
                if chars.get(i + 1) == Some(&ch) {
                    i += 2;
                    continue;
                }
                if ch == '{' {
                    depth += 1;
                } else {
                    depth = depth.saturating_sub(1);
                }
                out.push(ch);
                i += 1;
                continue;
            }
            if depth > 0 {
                if ch == '"' {
                    i += 1;
                    while i < len {
                        match chars[i] {
                            '\\' => i += 2,
                            '"' => {
                                i += 1;
                                break;
                            }
                            _ => i += 1,
                        }
                    }
                    continue;
                }
                out.push(ch);
                i += 1;
                continue;
            }
        }

        if ch == '\n' {
            out.push('\n');
        }
        i += 1;
    }
    i
}

/// Verifiers enabled by configuration, in the order they run.
pub fn standard_verifiers(brace_balance: bool, shrink_ratio: Option<f64>) -> Vec<Box<dyn Verifier>> {
    let mut verifiers: Vec<Box<dyn Verifier>> = Vec::new();
    if brace_balance {
        verifiers.push(Box::new(BraceBalance));
    }
    if let Some(ratio) = shrink_ratio {
        verifiers.push(Box::new(ShrinkGuard {
            min_result_ratio: ratio,
            ..ShrinkGuard::default()
        }));
    }
    verifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(path: &'a str, original: Option<&'a str>, content: &'a str) -> Candidate<'a> {
        Candidate {
            path: Path::new(path),
            original,
            content,
        }
    }

    #[test]
    fn strips_comments_and_strings() {
        let code = "fn f() { // }\n let s = \"}{\"; /* { */ let c = '{'; }\n";
        assert_eq!(check_balance(code), Ok(()));
        let stripped = strip_strings_and_comments(code);
        assert_eq!(stripped.matches('{').count(), 1);
        assert_eq!(stripped.lines().count(), 2);
    }

    #[test]
    fn keeps_interpolation_holes() {
        let js = "const s = `a ${obj[key]} b {`;\n";
        assert_eq!(strip_strings_and_comments(js), "const s = {};\n");
        let cs = "var s = $\"{{literal}} {items[0]}\"; var v = @\"C:\\\"\"x\";";
        assert_eq!(check_balance(cs), Ok(()));
        assert!(strip_strings_and_comments(cs).contains("{items[0]}"));
    }

    #[test]
    fn lifetimes_are_not_char_literals() {
        let rust = "fn get<'a>(items: &'a [u8]) -> &'a u8 { &items[0] }";
        assert_eq!(check_balance(rust), Ok(()));
    }

    #[test]
    fn reports_mismatch_and_unclosed() {
        let err = check_balance("fn main() {\n  (]\n}").unwrap_err();
        assert!(err.contains("mismatched ']' at line ~2"), "{err}");
        let err = check_balance("{\n{\n").unwrap_err();
        assert!(err.starts_with("2 unclosed"), "{err}");
    }

    #[test]
    fn brace_check_only_for_brace_languages_and_balanced_originals() {
        let verifier = BraceBalance;
        assert!(verifier.verify(&candidate("a.py", Some("x"), "def f(:")).is_ok());
        assert!(verifier.verify(&candidate("a.rs", Some("{}"), "{")).is_err());
        assert!(verifier.verify(&candidate("a.rs", Some("{"), "{{")).is_ok());
        assert!(verifier.verify(&candidate("A.TS", None, "}")).is_err());
    }

    #[test]
    fn shrink_guard_blocks_truncation() {
        let guard = ShrinkGuard::default();
        let original = "x".repeat(1000);
        assert!(guard.verify(&candidate("a.txt", Some(&original), "tiny")).is_err());
        assert!(guard.verify(&candidate("a.txt", Some(&original), &"y".repeat(150))).is_ok());
        assert!(guard.verify(&candidate("a.txt", Some("short"), "")).is_ok());
        assert!(guard.verify(&candidate("a.txt", None, "")).is_ok());
    }

    #[test]
    fn standard_set_follows_flags() {
        let names: Vec<String> = standard_verifiers(true, Some(0.2))
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(names, vec!["brace_balance", "shrink_guard"]);
        assert!(standard_verifiers(false, None).is_empty());
    }
}
