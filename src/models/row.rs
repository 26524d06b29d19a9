//! Row-level pipeline types
//!
//! A `RawRow` is immutable once parsed; recognition produces a fresh
//! `RecognizedFields`; classification produces exactly one `ProcessedRow`
//! per raw row per pipeline run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::matching::MatchResult;

/// One parsed spreadsheet row: ordered raw cell values plus the
/// header-index-to-label map captured from the first row of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based, stable across the file (header row excluded)
    pub row_number: u32,
    pub values: Vec<String>,
    /// column index → header label
    pub headers: BTreeMap<usize, String>,
}

impl RawRow {
    /// Cell value under the given header label, trimmed; None for blanks
    pub fn value_for_header(&self, header: &str) -> Option<&str> {
        let idx = self
            .headers
            .iter()
            .find(|(_, label)| label.as_str() == header)
            .map(|(idx, _)| *idx)?;
        self.values
            .get(idx)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// (header, trimmed value) pairs for non-empty cells
    pub fn labeled_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().filter_map(|(idx, label)| {
            self.values
                .get(*idx)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (label.as_str(), v))
        })
    }
}

/// Semantic field set recognized from one row. All attributes optional;
/// re-recognition produces a new instance rather than mutating this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizedFields {
    pub customer_name: Option<String>,
    pub customer_code: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub delivery_address: Option<String>,
    pub province_name: Option<String>,
    pub city_name: Option<String>,
    pub district_name: Option<String>,
    pub expected_delivery_date: Option<String>,
    pub product_sku: Option<String>,
    pub product_name: Option<String>,
    pub product_specification: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub unit: Option<String>,
    pub order_type: Option<String>,
    pub special_requirements: Option<String>,
    pub remarks: Option<String>,
    pub source_order_id: Option<String>,
    /// Self-reported by the AI when present; otherwise computed from
    /// key-field completeness
    pub confidence: Option<f64>,
}

impl RecognizedFields {
    /// True if at least one product reference (name or SKU) was recognized
    pub fn has_product_reference(&self) -> bool {
        self.product_name.is_some() || self.product_sku.is_some()
    }

    /// Fraction of the four key fields present:
    /// customer (name or contact), product (name or SKU), quantity, unit price.
    /// Quarter steps 0.0, 0.25, 0.5, 0.75, 1.0.
    pub fn key_field_confidence(&self) -> f64 {
        let mut present = 0u32;
        if self.customer_name.is_some() || self.contact_person.is_some() {
            present += 1;
        }
        if self.has_product_reference() {
            present += 1;
        }
        if self.quantity.is_some() {
            present += 1;
        }
        if self.unit_price.is_some() {
            present += 1;
        }
        present as f64 / 4.0
    }
}

/// Terminal classification for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowOutcome {
    /// Auto-accepted; an order was (or will be) materialized
    Success,
    /// Confidence above the rejection floor but no accepted match
    ManualProcess,
    /// Missing mandatory fields, match below floor, or processing error
    Failed,
}

impl RowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowOutcome::Success => "SUCCESS",
            RowOutcome::ManualProcess => "MANUAL_PROCESS",
            RowOutcome::Failed => "FAILED",
        }
    }
}

/// Fully processed row: recognition + resolution + classification.
/// Consumed by the materializer (SUCCESS) or the error sink (otherwise).
#[derive(Debug, Clone)]
pub struct ProcessedRow {
    pub row_number: u32,
    pub fields: RecognizedFields,
    pub product_match: Option<MatchResult>,
    pub customer_match: Option<MatchResult>,
    pub outcome: RowOutcome,
    pub error_message: Option<String>,
    /// Final confidence gating the outcome
    pub confidence: f64,
}

/// Why a row (or task) failed or needs review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// Cell or row unreadable
    ParseError,
    /// Recognized fields incomplete
    ValidationError,
    /// Product resolution below acceptance threshold
    ProductNotFound,
    /// Customer resolution below acceptance threshold
    CustomerNotFound,
    /// Downstream order persistence failure
    MaterializationError,
    /// Whole-file failure
    TaskError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ParseError => "PARSE_ERROR",
            ErrorType::ValidationError => "VALIDATION_ERROR",
            ErrorType::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorType::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            ErrorType::MaterializationError => "MATERIALIZATION_ERROR",
            ErrorType::TaskError => "TASK_ERROR",
        }
    }
}

/// Severity of a persisted error record. Manual-review rows are
/// warnings; everything else is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    Error,
    Warning,
}

impl ErrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorLevel::Error => "ERROR",
            ErrorLevel::Warning => "WARNING",
        }
    }
}

/// Review state of a persisted error record; mutated only by operator action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorStatus {
    Pending,
    Processed,
    Ignored,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Pending => "PENDING",
            ErrorStatus::Processed => "PROCESSED",
            ErrorStatus::Ignored => "IGNORED",
        }
    }
}

/// Durable record of a failed or review-queued row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: i64,
    pub task_id: Uuid,
    pub row_number: u32,
    /// Serialized raw row payload for remediation
    pub raw_data: serde_json::Value,
    pub error_type: ErrorType,
    pub level: ErrorLevel,
    pub message: String,
    pub suggested_action: String,
    pub status: ErrorStatus,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_field_confidence_quarter_steps() {
        let mut fields = RecognizedFields::default();
        assert_eq!(fields.key_field_confidence(), 0.0);

        fields.customer_name = Some("Acme".into());
        assert_eq!(fields.key_field_confidence(), 0.25);

        fields.product_sku = Some("SKU-1".into());
        assert_eq!(fields.key_field_confidence(), 0.5);

        fields.quantity = Some(3);
        assert_eq!(fields.key_field_confidence(), 0.75);

        fields.unit_price = Some(9.5);
        assert_eq!(fields.key_field_confidence(), 1.0);
    }

    #[test]
    fn key_field_confidence_is_monotone_in_fields() {
        // Adding a field never lowers the score
        let empty = RecognizedFields::default();
        let mut with_contact = empty.clone();
        with_contact.contact_person = Some("Wang".into());
        assert!(with_contact.key_field_confidence() >= empty.key_field_confidence());

        // name-or-contact counts once, not twice
        let mut both = with_contact.clone();
        both.customer_name = Some("Acme".into());
        assert_eq!(
            both.key_field_confidence(),
            with_contact.key_field_confidence()
        );
    }

    #[test]
    fn value_for_header_trims_and_skips_blanks() {
        let mut headers = BTreeMap::new();
        headers.insert(0, "数量".to_string());
        headers.insert(1, "单价".to_string());
        let row = RawRow {
            row_number: 1,
            values: vec![" 5 ".into(), "   ".into()],
            headers,
        };
        assert_eq!(row.value_for_header("数量"), Some("5"));
        assert_eq!(row.value_for_header("单价"), None);
        assert_eq!(row.value_for_header("missing"), None);
    }
}
