//! Entity resolution results and catalog entities

use serde::{Deserialize, Serialize};

/// How a resolution succeeded (or that it did not)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Normalized key equality (SKU / customer code / phone)
    Exact,
    /// Edit-distance or substring similarity on names
    Fuzzy,
    /// Ranked by the AI text service against catalog candidates
    AiSemantic,
    /// Weighted combination of several fields
    Combined,
    /// No acceptable match
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "EXACT",
            MatchType::Fuzzy => "FUZZY",
            MatchType::AiSemantic => "AI_SEMANTIC",
            MatchType::Combined => "COMBINED",
            MatchType::None => "NONE",
        }
    }
}

/// One resolution attempt against the catalog or customer store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub entity_id: Option<i64>,
    pub entity_name: Option<String>,
    pub entity_key: Option<String>,
    pub confidence: f64,
    pub match_type: MatchType,
    pub reason: String,
    /// Remediation hint, populated on failure
    pub suggestion: Option<String>,
}

impl MatchResult {
    pub fn matched(
        entity_id: i64,
        entity_name: impl Into<String>,
        entity_key: Option<String>,
        confidence: f64,
        match_type: MatchType,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            matched: true,
            entity_id: Some(entity_id),
            entity_name: Some(entity_name.into()),
            entity_key,
            confidence,
            match_type,
            reason: reason.into(),
            suggestion: None,
        }
    }

    pub fn unmatched(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            matched: false,
            entity_id: None,
            entity_name: None,
            entity_key: None,
            confidence: 0.0,
            match_type: MatchType::None,
            reason: reason.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Unmatched, but carrying the best confidence seen so the classifier
    /// can route the row to manual review instead of outright rejection.
    pub fn unmatched_with_confidence(
        confidence: f64,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            confidence,
            ..Self::unmatched(reason, suggestion)
        }
    }
}

/// Catalog product row as the resolver sees it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogProduct {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub specification: Option<String>,
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
}

/// Customer store row as the resolver sees it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
}
