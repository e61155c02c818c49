//! FTS5 query sanitization (spec §4.1 "FTS sanitization").
//!
//! Memory content is LLM-generated free text and may contain anything —
//! quotes, parentheses, `AND`/`OR`/`NOT`, dangling `"`. None of that should
//! be interpreted as FTS5 query syntax. Every surviving token is wrapped in
//! double quotes (forcing literal-string matching) and the tokens are
//! OR-joined, which widens recall for merge-detection queries that share
//! only a few key terms.

/// Builds a sanitized FTS5 MATCH expression from free text, or `None` if the
/// input contains no word characters (callers must not pass an empty query
/// to the FTS engine).
pub fn sanitize_fts_query(input: &str) -> Option<String> {
    let tokens: Vec<String> = input
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_yields_none() {
        assert_eq!(sanitize_fts_query(""), None);
        assert_eq!(sanitize_fts_query("   "), None);
        assert_eq!(sanitize_fts_query("!!!---"), None);
    }

    #[test]
    fn tokens_are_quoted_and_or_joined() {
        assert_eq!(
            sanitize_fts_query("rust memory"),
            Some("\"rust\" OR \"memory\"".to_string())
        );
    }

    #[test]
    fn fts_operators_are_neutralized() {
        // "content" OR NOT "x" would otherwise be interpreted as FTS syntax.
        let sanitized = sanitize_fts_query("content\" OR NOT \"x").unwrap();
        assert!(sanitized.contains("\"content\""));
        assert!(sanitized.contains("\"OR\""));
        assert!(sanitized.contains("\"NOT\""));
    }

    #[test]
    fn total_for_arbitrary_strings() {
        // Any input either yields None or a string composed solely of
        // `"token"` segments joined by ` OR ` — never raw unescaped syntax.
        for input in ["a(b)c", "\"\"\"", "a/b\\c", "emoji 🎉 test", "-- drop table"] {
            if let Some(q) = sanitize_fts_query(input) {
                for part in q.split(" OR ") {
                    assert!(part.starts_with('"') && part.ends_with('"'));
                }
            }
        }
    }
}
