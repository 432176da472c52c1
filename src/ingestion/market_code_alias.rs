//! Market code alias resolution.
//!
//! Absorbs the legacy (`prime`/`standard`/`growth`) vs. current (`0111`/
//! `0112`/`0113`) market segment code representations so callers can filter
//! by either form.

fn aliases_for(code: &str) -> &'static [&'static str] {
    match code {
        "prime" | "0111" => &["prime", "0111"],
        "standard" | "0112" => &["standard", "0112"],
        "growth" | "0113" => &["growth", "0113"],
        _ => &[],
    }
}

/// Parse a comma-separated market filter string into market codes, falling
/// back to `["prime"]` (or the caller-supplied fallback) when empty.
pub fn parse_requested_market_codes(markets: &str, fallback: Option<&[String]>) -> Vec<String> {
    let parsed: Vec<String> = markets
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if !parsed.is_empty() {
        return parsed;
    }
    match fallback {
        Some(fallback) => fallback.to_vec(),
        None => vec!["prime".to_string()],
    }
}

/// Alias-expand market codes and de-duplicate, preserving first-seen order.
pub fn expand_market_codes(market_codes: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for market_code in market_codes {
        let alias_key = market_code.to_lowercase();
        let candidates = aliases_for(&alias_key);
        if candidates.is_empty() {
            if seen.insert(market_code.clone()) {
                expanded.push(market_code.clone());
            }
            continue;
        }
        for candidate in candidates {
            if seen.insert(candidate.to_string()) {
                expanded.push(candidate.to_string());
            }
        }
    }
    expanded
}

/// Resolve a market filter string into (requested, alias-expanded) codes.
pub fn resolve_market_codes(markets: &str, fallback: Option<&[String]>) -> (Vec<String>, Vec<String>) {
    let requested = parse_requested_market_codes(markets, fallback);
    let expanded = expand_market_codes(&requested);
    (requested, expanded)
}
