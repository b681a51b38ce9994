//! Counterparty name matching.
//!
//! Pure string functions used to link free-text counterparty names to
//! customer records. Exact (post-normalization) equality is always tried
//! before fuzzy scoring; a fuzzy candidate is accepted only above
//! [`MATCH_THRESHOLD`].

/// Legal-entity suffixes stripped before comparison.
const LEGAL_SUFFIXES: &[&str] = &["gmbh", "ag", "kg", "ug", "ohg", "mbh", "eg", "co"];

/// Minimum fuzzy score for a candidate to be accepted as a match.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Tokens this short are treated as noise and discarded.
const MIN_TOKEN_LEN: usize = 3;

/// Normalize a name into comparison tokens: lower-case, punctuation turned
/// into whitespace, legal-entity suffixes and short noise tokens removed.
pub fn name_tokens(name: &str) -> Vec<String> {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if matches!(c, ',' | '-' | '.' | '&' | '/' | '+' | '(' | ')') {
                ' '
            } else {
                c
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .filter(|t| !LEGAL_SUFFIXES.contains(t))
        .map(str::to_string)
        .collect()
}

/// Whether two names are equal after normalization.
pub fn names_match_exactly(a: &str, b: &str) -> bool {
    let ta = name_tokens(a);
    !ta.is_empty() && ta == name_tokens(b)
}

/// Similarity score between two names in `[0, 1]`.
///
/// Each token of `a` counts as matched when some token of `b` equals it or
/// contains it as a substring. The count is divided by the larger token
/// count of the two names, so extra tokens on either side dilute the score.
/// Empty token sets score 0. Scoring is directional from `a`; callers that
/// need symmetry pass the counterparty name as `a`.
pub fn match_score(a: &str, b: &str) -> f64 {
    let ta = name_tokens(a);
    let tb = name_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let matched = ta
        .iter()
        .filter(|t| tb.iter().any(|c| c == *t || c.contains(t.as_str())))
        .count();

    matched as f64 / ta.len().max(tb.len()) as f64
}

/// Pick the best candidate for `target` from `names`, returning its index.
///
/// Exact normalized equality short-circuits the scan. Otherwise the highest
/// fuzzy score above [`MATCH_THRESHOLD`] wins; on a tie the earlier
/// candidate retains priority, so the result is deterministic for a stable
/// input ordering.
pub fn best_match_index<'a, I>(target: &str, names: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;

    for (idx, name) in names.into_iter().enumerate() {
        if names_match_exactly(target, name) {
            return Some(idx);
        }
        let score = match_score(target, name);
        if score > MATCH_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((idx, score));
        }
    }

    best.map(|(idx, _)| idx)
}
