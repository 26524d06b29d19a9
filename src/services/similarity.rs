//! Text similarity scoring for entity resolution
//!
//! All scores are confidences in [0.0, 1.0]. Substring containment
//! outranks pure edit distance for names; keys and phones only ever
//! score on equality or containment.

use strsim::levenshtein;

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Name similarity: exact 1.0; candidate containing the target 0.9;
/// target containing the candidate 0.8; otherwise Levenshtein scaled
/// by the longer length, floored at `fuzzy_floor`.
pub fn name_confidence(target: &str, candidate: &str, fuzzy_floor: f64) -> f64 {
    let target = normalize(target);
    let candidate = normalize(candidate);
    if target.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if target == candidate {
        return 1.0;
    }
    if candidate.contains(&target) {
        return 0.9;
    }
    if target.contains(&candidate) {
        return 0.8;
    }

    let target_chars: Vec<char> = target.chars().collect();
    let candidate_chars: Vec<char> = candidate.chars().collect();
    let max_len = target_chars.len().max(candidate_chars.len());
    let dist = levenshtein(&target, &candidate);
    (1.0 - dist as f64 / max_len as f64).max(fuzzy_floor)
}

/// Key (code/SKU) similarity: equality 1.0, containment 0.8, else 0.0
pub fn code_confidence(target: &str, candidate: &str) -> f64 {
    let target = normalize(target);
    let candidate = normalize(candidate);
    if target.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if target == candidate {
        1.0
    } else if candidate.contains(&target) || target.contains(&candidate) {
        0.8
    } else {
        0.0
    }
}

/// Phone similarity over normalized digits: equality 1.0, containment 0.7
pub fn phone_confidence(target: &str, candidate: &str) -> f64 {
    let target = normalize_phone(target);
    let candidate = normalize_phone(candidate);
    if target.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if target == candidate {
        1.0
    } else if candidate.contains(&target) || target.contains(&candidate) {
        0.7
    } else {
        0.0
    }
}

/// Strip whitespace and separator punctuation from a phone number
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '+' | '(' | ')'))
        .collect()
}

/// Header-to-keyword score used by the rule recognizer:
/// exact 1.0; keyword contained in header scaled by coverage, capped at 0.9.
pub fn keyword_confidence(header: &str, keyword: &str) -> f64 {
    let header = normalize(header);
    let keyword = normalize(keyword);
    if header.is_empty() || keyword.is_empty() {
        return 0.0;
    }
    if header == keyword {
        return 1.0;
    }
    if header.contains(&keyword) {
        let coverage = keyword.chars().count() as f64 / header.chars().count() as f64;
        return (0.5 + 0.4 * coverage).min(0.9);
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_exact_beats_containment() {
        assert_eq!(name_confidence("Acme", "acme", 0.1), 1.0);
        assert_eq!(name_confidence("Acme", "Acme Industrial", 0.1), 0.9);
        assert_eq!(name_confidence("Acme Industrial", "Acme", 0.1), 0.8);
    }

    #[test]
    fn name_fuzzy_floor_is_configurable() {
        // Entirely dissimilar strings score the floor, not zero
        assert_eq!(name_confidence("abcdefgh", "zyxwvuts", 0.1), 0.1);
        assert_eq!(name_confidence("abcdefgh", "zyxwvuts", 0.25), 0.25);
    }

    #[test]
    fn name_fuzzy_scales_with_distance() {
        // one edit over five chars = 0.8
        let score = name_confidence("acmes", "acmez", 0.1);
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn code_only_equality_or_containment() {
        assert_eq!(code_confidence("SKU-100", "sku-100"), 1.0);
        assert_eq!(code_confidence("100", "SKU-100"), 0.8);
        assert_eq!(code_confidence("SKU-100", "SKU-200"), 0.0);
    }

    #[test]
    fn phone_normalizes_separators() {
        assert_eq!(phone_confidence("138-0013-8000", "13800138000"), 1.0);
        assert_eq!(phone_confidence("+86 138 0013 8000", "13800138000"), 0.7);
        assert_eq!(phone_confidence("13800138000", "13900139000"), 0.0);
    }

    #[test]
    fn keyword_scoring() {
        assert_eq!(keyword_confidence("数量", "数量"), 1.0);
        // keyword covering half the header: 0.5 + 0.4 * 0.5 = 0.7
        let score = keyword_confidence("客户数量", "数量");
        assert!((score - 0.7).abs() < 1e-9);
        // long keyword in barely-longer header caps at 0.9
        let score = keyword_confidence("unit price x", "unit price");
        assert!(score <= 0.9);
        assert_eq!(keyword_confidence("备注", "数量"), 0.0);
    }
}
