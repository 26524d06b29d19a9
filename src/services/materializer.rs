//! Order materialization
//!
//! Turns an auto-accepted row into a DRAFT order with one line item.
//! Any failure here demotes the row rather than aborting the task; the
//! coordinator records it as a materialization error.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::db::catalog;
use crate::db::orders::{self, NewOrder};
use crate::error::{Error, Result};
use crate::models::{MatchResult, ProcessedRow, RowOutcome};
use crate::services::order_numbers::OrderNumberGenerator;

pub struct Materializer<'a> {
    pool: &'a SqlitePool,
    numbers: &'a OrderNumberGenerator,
    default_unit: &'a str,
}

impl<'a> Materializer<'a> {
    pub fn new(pool: &'a SqlitePool, numbers: &'a OrderNumberGenerator, default_unit: &'a str) -> Self {
        Self { pool, numbers, default_unit }
    }

    /// Materialize one SUCCESS row. Returns the generated order number.
    pub async fn materialize(
        &self,
        task_id: Uuid,
        operator: &str,
        channel: &str,
        row: &ProcessedRow,
    ) -> Result<String> {
        if row.outcome != RowOutcome::Success {
            return Err(Error::Internal(format!(
                "Row {} is {} and cannot be materialized",
                row.row_number,
                row.outcome.as_str()
            )));
        }
        let product = row
            .product_match
            .as_ref()
            .filter(|m| m.matched)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "Row {} has no accepted product match",
                    row.row_number
                ))
            })?;
        let quantity = row
            .fields
            .quantity
            .ok_or_else(|| Error::Internal(format!("Row {} has no quantity", row.row_number)))?;

        let order_number = self.numbers.next(self.pool, operator, channel).await?;

        let customer = row.customer_match.as_ref().filter(|m| m.matched);
        let fields = &row.fields;

        let order = NewOrder {
            order_number: order_number.clone(),
            task_id,
            customer_id: customer.and_then(|c| c.entity_id),
            customer_name: customer
                .and_then(|c| c.entity_name.clone())
                .or_else(|| fields.customer_name.clone()),
            contact_person: fields.contact_person.clone(),
            contact_phone: fields.contact_phone.clone(),
            delivery_address: fields.delivery_address.clone(),
            province_name: fields.province_name.clone(),
            city_name: fields.city_name.clone(),
            district_name: fields.district_name.clone(),
            expected_delivery_date: delivery_date(fields.expected_delivery_date.as_deref()),
            order_type: fields
                .order_type
                .clone()
                .unwrap_or_else(|| "NORMAL".to_string()),
            special_requirements: fields.special_requirements.clone(),
            remarks: fields.remarks.clone(),
            created_by: operator.to_string(),
        };

        let order_id = orders::insert_order(self.pool, &order).await?;

        // Price preference: spreadsheet value, then catalog price, then 0
        let unit_price = match fields.unit_price {
            Some(p) => p,
            None => self.catalog_price(product).await?.unwrap_or(0.0),
        };
        let unit = fields.unit.as_deref().unwrap_or(self.default_unit);
        let product_name = product
            .entity_name
            .as_deref()
            .or(fields.product_name.as_deref())
            .unwrap_or("(unnamed)");

        orders::insert_order_item(
            self.pool,
            order_id,
            product.entity_id,
            product.entity_key.as_deref(),
            product_name,
            fields.product_specification.as_deref(),
            quantity,
            unit,
            unit_price,
        )
        .await?;

        orders::recompute_order_total(self.pool, order_id).await?;

        Ok(order_number)
    }

    async fn catalog_price(&self, product: &MatchResult) -> Result<Option<f64>> {
        let sku = match product.entity_key.as_deref() {
            Some(sku) => sku,
            None => return Ok(None),
        };
        Ok(catalog::product_by_sku(self.pool, sku)
            .await?
            .and_then(|p| p.unit_price))
    }
}

/// Expected delivery date policy: absent defaults to two days out,
/// present but unparseable to seven days out.
fn delivery_date(raw: Option<&str>) -> DateTime<Utc> {
    match raw {
        None => Utc::now() + Duration::days(2),
        Some(s) => match parse_date(s) {
            Some(dt) => dt,
            None => {
                warn!(value = s, "Unparseable delivery date, defaulting to 7 days");
                Utc::now() + Duration::days(7)
            }
        },
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_date_formats() {
        for s in ["2026-09-01", "2026/09/01", "2026.09.01", "2026年09月01日"] {
            let dt = parse_date(s).unwrap();
            assert_eq!(dt.date_naive().to_string(), "2026-09-01");
        }
        assert!(parse_date("next tuesday").is_none());
    }

    #[test]
    fn absent_date_defaults_two_days_out() {
        let dt = delivery_date(None);
        let delta = dt - Utc::now();
        assert!(delta.num_hours() >= 47 && delta.num_hours() <= 48);
    }

    #[test]
    fn unparseable_date_defaults_seven_days_out() {
        let dt = delivery_date(Some("soonish"));
        let delta = dt - Utc::now();
        assert!(delta.num_hours() >= 167 && delta.num_hours() <= 168);
    }
}
