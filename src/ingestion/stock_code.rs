//! Stock code canonicalization.
//!
//! Upstream emits five-character codes (a legacy four-character code with a
//! trailing `0`). The canonical internal form is four characters; expansion
//! back to five happens only when calling upstream. When querying storage,
//! both variants are tried, with the four-character form preferred on ties.

/// A five-character code ends in `0` and its first four characters are
/// alphanumeric — the shape upstream emits for a legacy four-character code.
fn looks_expanded(code: &str) -> bool {
    code.len() == 5 && code.ends_with('0')
}

/// Normalize an upstream code to its four-character canonical form. Codes
/// that aren't a recognizable five-character expansion are returned
/// unchanged (trimmed).
pub fn normalize_stock_code(code: &str) -> String {
    let trimmed = code.trim();
    if looks_expanded(trimmed) {
        trimmed[..4].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Expand a canonical four-character code to the five-character form used
/// when calling upstream.
pub fn expand_stock_code(code: &str) -> String {
    if code.len() == 4 {
        format!("{code}0")
    } else {
        code.to_string()
    }
}

/// Both canonical and expanded forms, four-character form first so SQL
/// `ORDER BY ... CASE WHEN length(code)=4 THEN 0 ELSE 1 END` keeps it as the
/// preferred candidate on ties.
pub fn stock_code_candidates(code: &str) -> Vec<String> {
    let canonical = normalize_stock_code(code);
    let expanded = expand_stock_code(&canonical);
    if canonical == expanded {
        vec![canonical]
    } else {
        vec![canonical, expanded]
    }
}

pub fn is_valid_stock_code(code: &str) -> bool {
    let trimmed = code.trim();
    (trimmed.len() == 4 || trimmed.len() == 5) && trimmed.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trips_through_expansion() {
        for code in ["7203", "131A", "99Z9"] {
            assert_eq!(normalize_stock_code(&expand_stock_code(code)), code);
        }
    }

    #[test]
    fn strips_trailing_zero_from_expanded_code() {
        assert_eq!(normalize_stock_code("131A0"), "131A");
        assert_eq!(normalize_stock_code("72030"), "7203");
    }

    #[test]
    fn leaves_non_expanded_codes_unchanged() {
        assert_eq!(normalize_stock_code("7203"), "7203");
        // Doesn't end in 0 -> not a recognizable expansion.
        assert_eq!(normalize_stock_code("7203X"), "7203X");
    }

    #[test]
    fn candidates_prefer_four_character_form_first() {
        assert_eq!(
            stock_code_candidates("131A0"),
            vec!["131A".to_string(), "131A0".to_string()]
        );
    }
}
