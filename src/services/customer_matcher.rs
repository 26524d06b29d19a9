//! Customer resolution
//!
//! Code, name and phone each resolve independently; when no single
//! signal is decisive a weighted combination over all three picks the
//! best customer. Name matching is intentionally looser than product
//! matching since uploads abbreviate company names freely.

use sqlx::SqlitePool;
use tracing::debug;

use crate::config::MatchThresholds;
use crate::db::catalog;
use crate::error::Result;
use crate::models::{Customer, MatchResult, MatchType, RecognizedFields};
use crate::services::ai_client::ChatClient;
use crate::services::similarity::{code_confidence, name_confidence, phone_confidence};

pub struct CustomerMatcher<'a> {
    pool: &'a SqlitePool,
    client: &'a ChatClient,
    thresholds: &'a MatchThresholds,
}

impl<'a> CustomerMatcher<'a> {
    pub fn new(pool: &'a SqlitePool, client: &'a ChatClient, thresholds: &'a MatchThresholds) -> Self {
        Self { pool, client, thresholds }
    }

    pub async fn match_by_code(&self, code: &str) -> Result<MatchResult> {
        if let Some(customer) = catalog::customer_by_code(self.pool, code).await? {
            return Ok(MatchResult::matched(
                customer.id,
                customer.name,
                Some(customer.code),
                1.0,
                MatchType::Exact,
                "Customer code exact match",
            ));
        }

        let candidates = self.candidates().await?;
        let best = candidates
            .iter()
            .map(|c| (c, code_confidence(code, &c.code)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((customer, score)) if score >= self.thresholds.exact_key_accept => {
                Ok(MatchResult::matched(
                    customer.id,
                    customer.name.clone(),
                    Some(customer.code.clone()),
                    score,
                    MatchType::Fuzzy,
                    "Customer code containment match",
                ))
            }
            Some((_, score)) => Ok(MatchResult::unmatched_with_confidence(
                score,
                format!("No customer with code '{}'", code),
                "Check the customer code",
            )),
            None => Ok(MatchResult::unmatched(
                format!("No customer with code '{}'", code),
                "Customer store is empty",
            )),
        }
    }

    pub async fn match_by_name(&self, name: &str) -> Result<MatchResult> {
        if let Some(customer) = catalog::customer_by_exact_name(self.pool, name).await? {
            return Ok(MatchResult::matched(
                customer.id,
                customer.name,
                Some(customer.code),
                1.0,
                MatchType::Exact,
                "Customer name exact match",
            ));
        }

        let candidates = self.candidates().await?;
        if candidates.is_empty() {
            return Ok(MatchResult::unmatched(
                format!("No customer named '{}'", name),
                "Customer store is empty",
            ));
        }

        let (customer, score) = candidates
            .iter()
            .map(|c| (c, name_confidence(name, &c.name, self.thresholds.fuzzy_floor)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((&candidates[0], 0.0));

        if score >= self.thresholds.customer_name_accept {
            Ok(MatchResult::matched(
                customer.id,
                customer.name.clone(),
                Some(customer.code.clone()),
                score,
                MatchType::Fuzzy,
                "Customer name similarity match",
            ))
        } else {
            Ok(MatchResult::unmatched_with_confidence(
                score,
                format!("No customer named '{}'", name),
                format!("Closest customer: '{}'", customer.name),
            ))
        }
    }

    pub async fn match_by_phone(&self, phone: &str) -> Result<MatchResult> {
        let candidates = self.candidates().await?;
        let best = candidates
            .iter()
            .filter_map(|c| {
                c.contact_phone
                    .as_deref()
                    .map(|p| (c, phone_confidence(phone, p)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((customer, score)) if score >= self.thresholds.customer_phone_accept => {
                Ok(MatchResult::matched(
                    customer.id,
                    customer.name.clone(),
                    Some(customer.code.clone()),
                    score,
                    if score >= 1.0 { MatchType::Exact } else { MatchType::Fuzzy },
                    "Customer phone match",
                ))
            }
            Some((_, score)) => Ok(MatchResult::unmatched_with_confidence(
                score,
                format!("No customer with phone '{}'", phone),
                "Check the contact phone",
            )),
            None => Ok(MatchResult::unmatched(
                format!("No customer with phone '{}'", phone),
                "No customer has a contact phone on file",
            )),
        }
    }

    /// Code → name → phone → weighted combination. Each stage returns
    /// as soon as it clears its own threshold.
    pub async fn smart_match(&self, fields: &RecognizedFields) -> Result<MatchResult> {
        if let Some(code) = fields.customer_code.as_deref() {
            let result = self.match_by_code(code).await?;
            if result.matched {
                return Ok(result);
            }
            debug!(code, "Customer code unmatched, trying weaker signals");
        }

        if let Some(name) = fields.customer_name.as_deref() {
            let result = self.match_by_name(name).await?;
            if result.matched {
                return Ok(result);
            }
        }

        if let Some(phone) = fields.contact_phone.as_deref() {
            let result = self.match_by_phone(phone).await?;
            if result.matched {
                return Ok(result);
            }
        }

        self.combined_match(fields).await
    }

    /// Weighted combination over code, name and phone similarity
    async fn combined_match(&self, fields: &RecognizedFields) -> Result<MatchResult> {
        let candidates = self.candidates().await?;
        if candidates.is_empty() {
            return Ok(MatchResult::unmatched(
                "No customer signals matched",
                "Customer store is empty",
            ));
        }

        let t = self.thresholds;
        let scored = candidates.iter().map(|c| {
            let code_score = fields
                .customer_code
                .as_deref()
                .map(|code| code_confidence(code, &c.code))
                .unwrap_or(0.0);
            let name_score = fields
                .customer_name
                .as_deref()
                .map(|name| name_confidence(name, &c.name, t.fuzzy_floor))
                .unwrap_or(0.0);
            let phone_score = fields
                .contact_phone
                .as_deref()
                .and_then(|phone| c.contact_phone.as_deref().map(|p| phone_confidence(phone, p)))
                .unwrap_or(0.0);
            let combined = t.combo_code_weight * code_score
                + t.combo_name_weight * name_score
                + t.combo_phone_weight * phone_score;
            (c, combined)
        });

        let (customer, score) = scored
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((&candidates[0], 0.0));

        if score >= t.customer_name_accept {
            Ok(MatchResult::matched(
                customer.id,
                customer.name.clone(),
                Some(customer.code.clone()),
                score,
                MatchType::Combined,
                "Weighted customer match",
            ))
        } else {
            Ok(MatchResult::unmatched_with_confidence(
                score,
                "No customer matched on code, name or phone",
                format!("Closest customer: '{}'", customer.name),
            ))
        }
    }

    async fn candidates(&self) -> Result<Vec<Customer>> {
        catalog::list_customers(self.pool, self.client.max_candidates()).await
    }
}
