//! Glob patterns over keys.
//!
//! `*` and `?` never cross a separator, `**` does, `[...]` is a character
//! class (`[!...]` negated).

use regex::Regex;

use crate::error::{FsError, Result};
use crate::path::SEP;

pub(crate) fn has_magic(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Split a key pattern into its literal leading directories and the rest.
pub(crate) fn split_literal(pattern: &str) -> (String, String) {
    let segments: Vec<&str> = pattern.split(SEP).collect();
    let first_magic = segments
        .iter()
        .position(|s| has_magic(s))
        .unwrap_or(segments.len());
    (
        segments[..first_magic].join("/"),
        segments[first_magic..].join("/"),
    )
}

/// Whether matching `pattern` needs more than one directory level.
pub(crate) fn is_deep(pattern: &str) -> bool {
    pattern.contains("**") || pattern.contains(SEP)
}

/// Compile a key pattern into an anchored regex.
pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&SEP) {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(len) => {
                    let body: String = chars[i + 1..i + 1 + len].iter().collect();
                    re.push('[');
                    match body.strip_prefix('!') {
                        Some(neg) => {
                            re.push('^');
                            re.push_str(&neg.replace('\\', "\\\\"));
                        }
                        None => re.push_str(&body.replace('\\', "\\\\")),
                    }
                    re.push(']');
                    i += len + 2;
                    continue;
                }
                None => re.push_str(r"\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    Regex::new(&re).map_err(|e| FsError::invalid_path(pattern, format!("bad glob: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_star_stays_in_segment() {
        let re = compile("*.txt").unwrap();
        assert!(re.is_match("a.txt"));
        assert!(!re.is_match("sub/c.txt"));
        assert!(!re.is_match("b.csv"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let re = compile("**/*.txt").unwrap();
        assert!(re.is_match("a.txt"));
        assert!(re.is_match("sub/c.txt"));
        assert!(re.is_match("x/y/z.txt"));
        assert!(!re.is_match("b.csv"));

        let re = compile("data/**").unwrap();
        assert!(re.is_match("data/a/b"));
    }

    #[test]
    fn test_classes_and_literals() {
        let re = compile("part-[0-9].c?v").unwrap();
        assert!(re.is_match("part-3.csv"));
        assert!(!re.is_match("part-x.csv"));
        let re = compile("[!a]*.txt").unwrap();
        assert!(re.is_match("b.txt"));
        assert!(!re.is_match("a.txt"));
        assert!(compile("a+b(1).txt").unwrap().is_match("a+b(1).txt"));
    }

    #[test]
    fn test_split_literal() {
        assert_eq!(
            split_literal("logs/2024/*/x.gz"),
            ("logs/2024".to_string(), "*/x.gz".to_string())
        );
        assert_eq!(split_literal("*.txt"), (String::new(), "*.txt".to_string()));
        assert!(is_deep("*/x.gz"));
        assert!(!is_deep("*.txt"));
    }
}
