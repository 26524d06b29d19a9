//! Row classification
//!
//! Pure decision logic: recognized fields plus match results in, one
//! terminal outcome out. Kept free of I/O so the rules are trivially
//! testable.

use crate::models::{ProcessedRow, RawRow, RecognizedFields, MatchResult, RowOutcome};

/// Mandatory fields a row must carry before matching even matters
fn missing_mandatory(fields: &RecognizedFields) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !fields.has_product_reference() {
        missing.push("product name or SKU");
    }
    if fields.quantity.is_none() {
        missing.push("quantity");
    }
    if fields.district_name.is_none() {
        missing.push("district");
    }
    if fields.delivery_address.is_none() {
        missing.push("delivery address");
    }
    if fields.contact_phone.is_none() {
        missing.push("contact phone");
    }
    missing
}

/// Classify one row.
///
/// Order of precedence:
/// 1. missing mandatory fields reject the row outright;
/// 2. an accepted product match auto-accepts it;
/// 3. otherwise the best product-match confidence decides between
///    manual review and rejection against the task's floor.
pub fn classify(
    row: &RawRow,
    fields: RecognizedFields,
    product_match: Option<MatchResult>,
    customer_match: Option<MatchResult>,
    min_confidence: f64,
) -> ProcessedRow {
    let missing = missing_mandatory(&fields);
    if !missing.is_empty() {
        return ProcessedRow {
            row_number: row.row_number,
            fields,
            product_match,
            customer_match,
            outcome: RowOutcome::Failed,
            error_message: Some(format!("Missing mandatory fields: {}", missing.join(", "))),
            confidence: 0.0,
        };
    }

    let product_confidence = product_match.as_ref().map(|m| m.confidence).unwrap_or(0.0);
    let product_matched = product_match.as_ref().map(|m| m.matched).unwrap_or(false);

    if product_matched {
        return ProcessedRow {
            row_number: row.row_number,
            fields,
            product_match,
            customer_match,
            outcome: RowOutcome::Success,
            error_message: None,
            confidence: product_confidence,
        };
    }

    let reason = product_match
        .as_ref()
        .map(|m| m.reason.clone())
        .unwrap_or_else(|| "Product not resolved".to_string());

    if product_confidence >= min_confidence {
        ProcessedRow {
            row_number: row.row_number,
            fields,
            product_match,
            customer_match,
            outcome: RowOutcome::ManualProcess,
            error_message: Some(reason),
            confidence: product_confidence,
        }
    } else {
        ProcessedRow {
            row_number: row.row_number,
            fields,
            product_match,
            customer_match,
            outcome: RowOutcome::Failed,
            error_message: Some(reason),
            confidence: product_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchResult, MatchType};
    use std::collections::BTreeMap;

    fn raw_row() -> RawRow {
        RawRow {
            row_number: 2,
            values: vec![],
            headers: BTreeMap::new(),
        }
    }

    fn complete_fields() -> RecognizedFields {
        RecognizedFields {
            product_sku: Some("SKU-1".into()),
            quantity: Some(5),
            district_name: Some("朝阳区".into()),
            delivery_address: Some("望京街1号".into()),
            contact_phone: Some("13800138000".into()),
            ..Default::default()
        }
    }

    #[test]
    fn missing_mandatory_fails_before_matching() {
        let mut fields = complete_fields();
        fields.quantity = None;
        let matched = MatchResult::matched(1, "Widget", None, 1.0, MatchType::Exact, "test");
        let row = classify(&raw_row(), fields, Some(matched), None, 0.5);
        assert_eq!(row.outcome, RowOutcome::Failed);
        assert!(row.error_message.as_deref().unwrap().contains("quantity"));
    }

    #[test]
    fn matched_product_is_success() {
        let matched = MatchResult::matched(1, "Widget", None, 1.0, MatchType::Exact, "test");
        let row = classify(&raw_row(), complete_fields(), Some(matched), None, 0.5);
        assert_eq!(row.outcome, RowOutcome::Success);
        assert_eq!(row.confidence, 1.0);
        assert!(row.error_message.is_none());
    }

    #[test]
    fn near_miss_routes_to_manual() {
        let near = MatchResult::unmatched_with_confidence(0.7, "no exact product", "check name");
        let row = classify(&raw_row(), complete_fields(), Some(near), None, 0.5);
        assert_eq!(row.outcome, RowOutcome::ManualProcess);
        assert_eq!(row.confidence, 0.7);
    }

    #[test]
    fn low_confidence_fails() {
        let far = MatchResult::unmatched_with_confidence(0.2, "no product", "check name");
        let row = classify(&raw_row(), complete_fields(), Some(far), None, 0.5);
        assert_eq!(row.outcome, RowOutcome::Failed);
    }

    #[test]
    fn floor_is_inclusive() {
        let edge = MatchResult::unmatched_with_confidence(0.5, "no product", "check name");
        let row = classify(&raw_row(), complete_fields(), Some(edge), None, 0.5);
        assert_eq!(row.outcome, RowOutcome::ManualProcess);
    }
}
