//! Order number generation
//!
//! Format: {operator}{channel}{YYYYMMDD}{seq:04}. The sequence is
//! persisted per (operator, channel, date) key and guarded by a per-key
//! async mutex, so concurrent rows of one task never collide and
//! numbering survives restarts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::orders;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct OrderNumberGenerator {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn next(&self, pool: &SqlitePool, operator: &str, channel: &str) -> Result<String> {
        let date = Utc::now().format("%Y%m%d").to_string();
        let key = format!("{}{}{}", operator, channel, date);

        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let _guard = lock.lock().await;

        let seq = orders::next_sequence(pool, &key).await?;
        Ok(format!("{}{:04}", key, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("test.db"))
            .await
            .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn numbers_are_sequential_per_key() {
        let (pool, _dir) = pool().await;
        let gen = OrderNumberGenerator::new();
        let a = gen.next(&pool, "OP1", "EXCEL").await.unwrap();
        let b = gen.next(&pool, "OP1", "EXCEL").await.unwrap();
        assert!(a.starts_with("OP1EXCEL"));
        assert!(a.ends_with("0001"));
        assert!(b.ends_with("0002"));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (pool, _dir) = pool().await;
        let gen = OrderNumberGenerator::new();
        let a = gen.next(&pool, "OP1", "EXCEL").await.unwrap();
        let b = gen.next(&pool, "OP2", "EXCEL").await.unwrap();
        assert!(a.ends_with("0001"));
        assert!(b.ends_with("0001"));
    }

    #[tokio::test]
    async fn concurrent_requests_never_collide() {
        let (pool, _dir) = pool().await;
        let gen = OrderNumberGenerator::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let gen = gen.clone();
            handles.push(tokio::spawn(async move {
                gen.next(&pool, "OP1", "EXCEL").await.unwrap()
            }));
        }
        let mut numbers = Vec::new();
        for h in handles {
            numbers.push(h.await.unwrap());
        }
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 8);
    }
}
