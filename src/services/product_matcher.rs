//! Product resolution
//!
//! SKU is the authoritative key: an exact SKU hit short-circuits
//! everything else at confidence 1.0. Non-exact name resolution is
//! AI-or-nothing: when the text service is unavailable or answers
//! nothing, the product is reported unmatched. Customers get a fuzzy
//! fallback; products deliberately do not.

use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::MatchThresholds;
use crate::db::catalog;
use crate::error::Result;
use crate::models::{CatalogProduct, MatchResult, MatchType, RecognizedFields};
use crate::services::ai_client::{extract_json, ChatClient};
use crate::services::similarity::code_confidence;

pub struct ProductMatcher<'a> {
    pool: &'a SqlitePool,
    client: &'a ChatClient,
    thresholds: &'a MatchThresholds,
}

impl<'a> ProductMatcher<'a> {
    pub fn new(pool: &'a SqlitePool, client: &'a ChatClient, thresholds: &'a MatchThresholds) -> Self {
        Self { pool, client, thresholds }
    }

    /// Resolve by SKU: exact hit 1.0, else best containment candidate
    /// accepted at or above the exact-key threshold.
    pub async fn match_by_sku(&self, sku: &str) -> Result<MatchResult> {
        if let Some(product) = catalog::product_by_sku(self.pool, sku).await? {
            return Ok(MatchResult::matched(
                product.id,
                product.name,
                Some(product.sku),
                1.0,
                MatchType::Exact,
                "SKU exact match",
            ));
        }

        let candidates = catalog::list_products(self.pool, self.client.max_candidates()).await?;
        let best = candidates
            .iter()
            .map(|p| (p, code_confidence(sku, &p.sku)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((product, score)) if score >= self.thresholds.exact_key_accept => {
                Ok(MatchResult::matched(
                    product.id,
                    product.name.clone(),
                    Some(product.sku.clone()),
                    score,
                    MatchType::Fuzzy,
                    "SKU containment match",
                ))
            }
            _ => Ok(MatchResult::unmatched(
                format!("No product with SKU '{}'", sku),
                "Check the SKU against the product catalog",
            )),
        }
    }

    /// Resolve by name: exact hit 1.0; otherwise AI semantic ranking
    /// only. No fuzzy degradation here.
    pub async fn match_by_name(&self, name: &str, specification: Option<&str>) -> Result<MatchResult> {
        if let Some(product) = catalog::product_by_exact_name(self.pool, name).await? {
            return Ok(MatchResult::matched(
                product.id,
                product.name,
                Some(product.sku),
                1.0,
                MatchType::Exact,
                "Product name exact match",
            ));
        }

        if !self.client.enabled() {
            return Ok(MatchResult::unmatched(
                format!("No product named '{}'", name),
                "Provide the exact catalog name or a SKU",
            ));
        }

        let candidates = catalog::list_products(self.pool, self.client.max_candidates()).await?;
        if candidates.is_empty() {
            return Ok(MatchResult::unmatched(
                format!("No product named '{}'", name),
                "Product catalog is empty",
            ));
        }

        match self.ai_rank(name, specification, &candidates).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Ok(MatchResult::unmatched(
                format!("No product named '{}'", name),
                "Provide the exact catalog name or a SKU",
            )),
            Err(e) => {
                warn!("AI product matching failed: {}", e);
                Ok(MatchResult::unmatched(
                    format!("No product named '{}'", name),
                    "Product matching service unavailable, try again or use a SKU",
                ))
            }
        }
    }

    /// SKU first, name second. The caller has already ensured at least
    /// one product reference exists.
    pub async fn smart_match(&self, fields: &RecognizedFields) -> Result<MatchResult> {
        if let Some(sku) = fields.product_sku.as_deref() {
            let by_sku = self.match_by_sku(sku).await?;
            if by_sku.matched {
                return Ok(by_sku);
            }
            // Fall through to name when a SKU typo still carries a usable name
            if fields.product_name.is_none() {
                return Ok(by_sku);
            }
            debug!(sku, "SKU unmatched, trying product name");
        }

        match fields.product_name.as_deref() {
            Some(name) => {
                self.match_by_name(name, fields.product_specification.as_deref())
                    .await
            }
            None => Ok(MatchResult::unmatched(
                "No product reference in row",
                "Provide a product SKU or name",
            )),
        }
    }

    /// One prompt ranking all candidates; the top answer either clears
    /// the acceptance threshold or is reported unmatched with its
    /// confidence preserved for manual-review routing.
    async fn ai_rank(
        &self,
        name: &str,
        specification: Option<&str>,
        candidates: &[CatalogProduct],
    ) -> Result<Option<MatchResult>> {
        let listing: Vec<String> = candidates
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "{} | {} | {} | {}",
                    i,
                    p.sku,
                    p.name,
                    p.specification.as_deref().unwrap_or("-")
                )
            })
            .collect();

        let target = match specification {
            Some(spec) => format!("{} ({})", name, spec),
            None => name.to_string(),
        };

        let prompt = format!(
            "Rank catalog products against the order line '{}'.\n\
             Catalog (index | sku | name | specification):\n{}\n\n\
             Confidence scale: 0.9-1.0 near-identical, 0.7-0.89 highly \
             related, 0.5-0.69 moderately related, 0.3-0.49 weak, below \
             0.3 unrelated.\n\
             Reply with JSON only:\n\
             {{\"matches\": [{{\"candidateIndex\": <index>, \"confidence\": <0.0-1.0>, \"reason\": \"<short>\"}}]}}\n\
             Best match first; an empty list means nothing is related.",
            target,
            listing.join("\n"),
        );

        let completion = self.client.complete(&prompt, 512, 0.1).await?;
        let json = extract_json(&completion).ok_or_else(|| {
            crate::error::Error::AiService("No JSON object in completion".into())
        })?;

        #[derive(Deserialize)]
        struct RankedMatch {
            #[serde(rename = "candidateIndex")]
            candidate_index: usize,
            #[serde(default)]
            confidence: f64,
            #[serde(default)]
            reason: String,
        }

        #[derive(Deserialize)]
        struct RankedResponse {
            matches: Vec<RankedMatch>,
        }

        let parsed: RankedResponse = serde_json::from_str(json)
            .map_err(|e| crate::error::Error::AiService(format!("Bad ranking JSON: {}", e)))?;

        let top = match parsed.matches.into_iter().next() {
            Some(m) => m,
            None => return Ok(None),
        };
        let product = match candidates.get(top.candidate_index) {
            Some(p) => p,
            None => return Ok(None),
        };
        let confidence = top.confidence.clamp(0.0, 1.0);
        let reason = if top.reason.is_empty() {
            "AI semantic product match".to_string()
        } else {
            top.reason
        };

        if confidence >= self.thresholds.product_name_accept {
            Ok(Some(MatchResult::matched(
                product.id,
                product.name.clone(),
                Some(product.sku.clone()),
                confidence,
                MatchType::AiSemantic,
                reason,
            )))
        } else {
            // Best AI answer below the auto-accept bar; carry its
            // confidence so the classifier can route to manual review.
            Ok(Some(MatchResult {
                matched: false,
                entity_id: None,
                entity_name: None,
                entity_key: None,
                confidence,
                match_type: MatchType::AiSemantic,
                reason,
                suggestion: Some(format!("Closest catalog product: '{}'", product.name)),
            }))
        }
    }
}
