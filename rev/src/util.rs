//! Shared helpers: typo suggestions and input balancing

/// Levenshtein edit distance, two-row variant
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate to a misspelled `name`. Short names tolerate one edit,
/// longer ones two. Ties go to the earlier candidate.
pub fn suggest_name<'a>(name: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let threshold = if name.chars().count() <= 3 { 1 } else { 2 };
    candidates
        .iter()
        .filter(|&&c| c != name)
        .map(|&c| (levenshtein_distance(name, c), c))
        .filter(|&(d, _)| d <= threshold)
        .min_by_key(|&(d, _)| d)
        .map(|(_, c)| c)
}

/// "did you mean" suffix for a diagnostic message
pub fn format_suggestion_hint(suggestion: Option<&str>) -> String {
    match suggestion {
        Some(name) => format!("; did you mean `{name}`?"),
        None => String::new(),
    }
}

/// Net count of open `{` and `(` in `text`, skipping string literals and
/// `//` comments. The REPL keeps reading lines while this is positive.
pub fn open_delimiters(text: &str) -> i64 {
    let mut depth = 0i64;
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '(' => depth += 1,
            '}' | ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein_distance("count", "count"), 0);
    }

    #[test]
    fn test_levenshtein_edits() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
    }

    #[test]
    fn test_suggest_name_close() {
        assert_eq!(suggest_name("conut", &["count", "total"]), Some("count"));
    }

    #[test]
    fn test_suggest_name_short_names_are_strict() {
        assert_eq!(suggest_name("ab", &["xy"]), None);
        assert_eq!(suggest_name("ab", &["ac"]), Some("ac"));
    }

    #[test]
    fn test_suggest_name_ignores_itself() {
        assert_eq!(suggest_name("x", &["x"]), None);
    }

    #[test]
    fn test_format_suggestion_hint() {
        assert_eq!(format_suggestion_hint(Some("print")), "; did you mean `print`?");
        assert_eq!(format_suggestion_hint(None), "");
    }

    #[test]
    fn test_open_delimiters() {
        assert_eq!(open_delimiters("fn f(): int {"), 1);
        assert_eq!(open_delimiters("fn f(): int { return 1 }"), 0);
        assert_eq!(open_delimiters(r#"print("{")"#), 0);
        assert_eq!(open_delimiters("var x = 1 // {"), 0);
        assert_eq!(open_delimiters("add(1,"), 1);
    }
}
