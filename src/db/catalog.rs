//! Product catalog and customer store lookups
//!
//! Exact lookups hit indexed columns; candidate listings feed the fuzzy
//! and AI matchers. Only active records are visible to the pipeline.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{CatalogProduct, Customer};

pub async fn product_by_sku(pool: &SqlitePool, sku: &str) -> Result<Option<CatalogProduct>> {
    let product = sqlx::query_as::<_, CatalogProduct>(
        "SELECT id, sku, name, specification, unit, unit_price FROM products WHERE sku = ? AND active = 1",
    )
    .bind(sku)
    .fetch_optional(pool)
    .await?;
    Ok(product)
}

pub async fn product_by_exact_name(pool: &SqlitePool, name: &str) -> Result<Option<CatalogProduct>> {
    let product = sqlx::query_as::<_, CatalogProduct>(
        "SELECT id, sku, name, specification, unit, unit_price FROM products WHERE name = ? AND active = 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(product)
}

/// Candidate set for fuzzy/AI product matching, capped by the caller
pub async fn list_products(pool: &SqlitePool, limit: usize) -> Result<Vec<CatalogProduct>> {
    let products = sqlx::query_as::<_, CatalogProduct>(
        "SELECT id, sku, name, specification, unit, unit_price FROM products WHERE active = 1 ORDER BY id LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(products)
}

pub async fn customer_by_code(pool: &SqlitePool, code: &str) -> Result<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, code, name, contact_person, contact_phone, address FROM customers WHERE code = ? AND active = 1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(customer)
}

pub async fn customer_by_exact_name(pool: &SqlitePool, name: &str) -> Result<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, code, name, contact_person, contact_phone, address FROM customers WHERE name = ? AND active = 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(customer)
}

/// Candidate set for fuzzy customer matching
pub async fn list_customers(pool: &SqlitePool, limit: usize) -> Result<Vec<Customer>> {
    let customers = sqlx::query_as::<_, Customer>(
        "SELECT id, code, name, contact_person, contact_phone, address FROM customers WHERE active = 1 ORDER BY id LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(customers)
}

/// Seed helpers used by integration tests and local bootstrap

pub async fn insert_product(
    pool: &SqlitePool,
    sku: &str,
    name: &str,
    specification: Option<&str>,
    unit: Option<&str>,
    unit_price: Option<f64>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO products (sku, name, specification, unit, unit_price) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(sku)
    .bind(name)
    .bind(specification)
    .bind(unit)
    .bind(unit_price)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_customer(
    pool: &SqlitePool,
    code: &str,
    name: &str,
    contact_person: Option<&str>,
    contact_phone: Option<&str>,
    address: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO customers (code, name, contact_person, contact_phone, address) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(code)
    .bind(name)
    .bind(contact_person)
    .bind(contact_phone)
    .bind(address)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}
