use crate::path::VfsPath;

// ── Brace expansion ─────────────────────────────────────────────────────────

/// Expand `{a,b}` alternatives in a pattern, including nested groups.
/// An unmatched `{` is kept literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0i32;
    let mut close: Option<usize> = None;
    for (i, ch) in pattern[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let head = &pattern[..open];
    let tail = &pattern[close + 1..];

    split_alternatives(&pattern[open + 1..close])
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{}{}{}", head, alt.trim(), tail)))
        .collect()
}

/// Split the inside of a brace group on top-level commas.
fn split_alternatives(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

// ── Segment matching ────────────────────────────────────────────────────────

/// Match one name against a pattern with `*` and `?` wildcards.
pub fn match_segment(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    let (mut ni, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < name.len() {
        match pat.get(pi) {
            Some('?') => {
                ni += 1;
                pi += 1;
            }
            Some('*') => {
                backtrack = Some((pi, ni));
                pi += 1;
            }
            Some(c) if *c == name[ni] => {
                ni += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star_pi, star_ni)) => {
                    pi = star_pi + 1;
                    ni = star_ni + 1;
                    backtrack = Some((star_pi, star_ni + 1));
                }
                None => return false,
            },
        }
    }

    pat[pi..].iter().all(|c| *c == '*')
}

// ── Multi-segment matching ──────────────────────────────────────────────────

/// Match path components against pattern components; `**` spans zero or more components.
pub fn match_parts(path: &[String], pattern: &[String]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((head, rest)) if head == "**" => {
            (0..=path.len()).any(|skip| match_parts(&path[skip..], rest))
        }
        Some((head, rest)) => match path.split_first() {
            Some((first, path_rest)) => {
                match_segment(first, head) && match_parts(path_rest, rest)
            }
            None => false,
        },
    }
}

// ── Top-level glob matching ─────────────────────────────────────────────────

/// Match a file path against a glob pattern. Relative patterns are anchored at `/`.
pub fn match_glob(file_path: &str, pattern: &str) -> bool {
    let path = VfsPath::parse(file_path);
    expand_braces(pattern)
        .iter()
        .any(|exp| match_parts(path.components(), VfsPath::parse(exp).components()))
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── expand_braces ───────────────────────────────────────────────────

    #[test]
    fn brace_expansion_simple() {
        let mut result = expand_braces("/{a,b}.txt");
        result.sort();
        assert_eq!(result, vec!["/a.txt", "/b.txt"]);
    }

    #[test]
    fn brace_expansion_no_braces() {
        assert_eq!(expand_braces("islands/log"), vec!["islands/log"]);
    }

    #[test]
    fn brace_expansion_unmatched() {
        assert_eq!(expand_braces("bait{worm"), vec!["bait{worm"]);
    }

    #[test]
    fn brace_expansion_nested() {
        let mut result = expand_braces("{a,{b,c}}");
        result.sort();
        assert_eq!(result, vec!["a", "b", "c"]);
    }

    // ── match_segment ───────────────────────────────────────────────────

    #[test]
    fn segment_star_wildcard() {
        assert!(match_segment("catch.log", "*.log"));
        assert!(match_segment("catch.log", "catch.*"));
        assert!(match_segment("anything", "*"));
        assert!(!match_segment("catch.txt", "*.log"));
    }

    #[test]
    fn segment_question_wildcard() {
        assert!(match_segment("a", "?"));
        assert!(match_segment("ab", "?b"));
        assert!(!match_segment("ab", "?"));
    }

    #[test]
    fn segment_backtracks_over_star() {
        assert!(match_segment("salmon.river.log", "*.river.*"));
        assert!(match_segment("aab", "*ab"));
    }

    #[test]
    fn segment_empty_pattern() {
        assert!(match_segment("", ""));
        assert!(!match_segment("a", ""));
        assert!(match_segment("", "*"));
    }

    #[test]
    fn segment_non_ascii() {
        assert!(match_segment("île.txt", "?le.txt"));
    }

    // ── match_glob ──────────────────────────────────────────────────────

    #[test]
    fn glob_exact_path() {
        assert!(match_glob("/docs/notes.txt", "/docs/notes.txt"));
    }

    #[test]
    fn glob_relative_pattern_is_anchored() {
        assert!(match_glob("/docs/notes.txt", "docs/*.txt"));
        assert!(!match_glob("/a/docs/notes.txt", "docs/*.txt"));
    }

    #[test]
    fn glob_globstar() {
        assert!(match_glob("/a/b/c/d.txt", "/**/*.txt"));
        assert!(match_glob("/d.txt", "/**/*.txt"));
        assert!(match_glob("/a/b/c", "/a/**"));
        assert!(match_glob("/src/test.ts", "/src/**/test.ts"));
    }

    #[test]
    fn glob_with_braces() {
        assert!(match_glob("/boat/sail.cfg", "/boat/*.{cfg,ini}"));
        assert!(match_glob("/boat/sail.ini", "/boat/*.{cfg,ini}"));
        assert!(!match_glob("/boat/sail.txt", "/boat/*.{cfg,ini}"));
    }

    #[test]
    fn glob_no_match() {
        assert!(!match_glob("/foo/bar.txt", "/baz/*.txt"));
    }
}
