//! Database access
//!
//! SQLite via sqlx. Schema is created on startup; every table uses
//! CREATE TABLE IF NOT EXISTS so restarts are idempotent.

pub mod catalog;
pub mod errors;
pub mod orders;
pub mod rows;
pub mod tasks;

use std::path::Path;

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize database connection pool and create tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_tasks (
            task_id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_hash TEXT NOT NULL,
            operator TEXT NOT NULL,
            channel TEXT NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            min_confidence REAL NOT NULL,
            total_rows INTEGER NOT NULL DEFAULT 0,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            success_rows INTEGER NOT NULL DEFAULT 0,
            failed_rows INTEGER NOT NULL DEFAULT 0,
            manual_rows INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            confidence REAL NOT NULL,
            fields TEXT NOT NULL,
            product_match TEXT,
            customer_match TEXT,
            error_message TEXT,
            order_number TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS error_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            raw_data TEXT NOT NULL,
            error_type TEXT NOT NULL,
            level TEXT NOT NULL DEFAULT 'ERROR',
            message TEXT NOT NULL,
            suggested_action TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            resolved_by TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sku TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            specification TEXT,
            unit TEXT,
            unit_price REAL,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            contact_person TEXT,
            contact_phone TEXT,
            address TEXT,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_number TEXT NOT NULL UNIQUE,
            task_id TEXT,
            customer_id INTEGER,
            customer_name TEXT,
            contact_person TEXT,
            contact_phone TEXT,
            delivery_address TEXT,
            province_name TEXT,
            city_name TEXT,
            district_name TEXT,
            expected_delivery_date TEXT,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            order_type TEXT NOT NULL DEFAULT 'NORMAL',
            source TEXT NOT NULL DEFAULT 'SPREADSHEET_IMPORT',
            special_requirements TEXT,
            remarks TEXT,
            total_amount REAL NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL,
            product_id INTEGER,
            sku TEXT,
            product_name TEXT NOT NULL,
            specification TEXT,
            quantity INTEGER NOT NULL,
            unit TEXT NOT NULL,
            unit_price REAL NOT NULL,
            amount REAL NOT NULL,
            FOREIGN KEY (order_id) REFERENCES orders(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS order_sequences (
            seq_key TEXT PRIMARY KEY,
            next_seq INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}
