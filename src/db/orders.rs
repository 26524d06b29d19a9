//! Order and line item persistence

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::Result;

/// Draft order header ready for insertion
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub task_id: Uuid,
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub delivery_address: Option<String>,
    pub province_name: Option<String>,
    pub city_name: Option<String>,
    pub district_name: Option<String>,
    pub expected_delivery_date: DateTime<Utc>,
    pub order_type: String,
    pub special_requirements: Option<String>,
    pub remarks: Option<String>,
    pub created_by: String,
}

pub async fn insert_order(pool: &SqlitePool, order: &NewOrder) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO orders (
            order_number, task_id, customer_id, customer_name,
            contact_person, contact_phone, delivery_address,
            province_name, city_name, district_name,
            expected_delivery_date, order_type,
            special_requirements, remarks, created_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&order.order_number)
    .bind(order.task_id.to_string())
    .bind(order.customer_id)
    .bind(&order.customer_name)
    .bind(&order.contact_person)
    .bind(&order.contact_phone)
    .bind(&order.delivery_address)
    .bind(&order.province_name)
    .bind(&order.city_name)
    .bind(&order.district_name)
    .bind(order.expected_delivery_date.to_rfc3339())
    .bind(&order.order_type)
    .bind(&order.special_requirements)
    .bind(&order.remarks)
    .bind(&order.created_by)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_order_item(
    pool: &SqlitePool,
    order_id: i64,
    product_id: Option<i64>,
    sku: Option<&str>,
    product_name: &str,
    specification: Option<&str>,
    quantity: i64,
    unit: &str,
    unit_price: f64,
) -> Result<i64> {
    let amount = quantity as f64 * unit_price;
    let result = sqlx::query(
        r#"
        INSERT INTO order_items (
            order_id, product_id, sku, product_name, specification,
            quantity, unit, unit_price, amount
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(order_id)
    .bind(product_id)
    .bind(sku)
    .bind(product_name)
    .bind(specification)
    .bind(quantity)
    .bind(unit)
    .bind(unit_price)
    .bind(amount)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Recompute the order total from its line items
pub async fn recompute_order_total(pool: &SqlitePool, order_id: i64) -> Result<f64> {
    let total: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM order_items WHERE order_id = ?",
    )
    .bind(order_id)
    .fetch_one(pool)
    .await?;

    sqlx::query("UPDATE orders SET total_amount = ? WHERE id = ?")
        .bind(total)
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(total)
}

/// Next sequence value for an order-number key, atomically incremented.
/// Caller holds the per-key lock; this just persists the counter.
pub async fn next_sequence(pool: &SqlitePool, seq_key: &str) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT next_seq FROM order_sequences WHERE seq_key = ?")
        .bind(seq_key)
        .fetch_optional(&mut *tx)
        .await?;

    let next = current.unwrap_or(1);
    sqlx::query(
        r#"
        INSERT INTO order_sequences (seq_key, next_seq) VALUES (?, ?)
        ON CONFLICT(seq_key) DO UPDATE SET next_seq = excluded.next_seq
        "#,
    )
    .bind(seq_key)
    .bind(next + 1)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(next)
}

/// Order numbers materialized by one task, for result reporting
pub async fn order_numbers_for_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT order_number FROM orders WHERE task_id = ? ORDER BY id")
        .bind(task_id.to_string())
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get("order_number")).collect())
}
