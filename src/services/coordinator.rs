//! Task coordination
//!
//! Owns the lifecycle of ingestion tasks: spawns the pipeline, tracks
//! live progress in atomic counters, and honors cancellation between
//! rows. Rows already being processed when cancellation arrives still
//! finish; queued rows never start.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::db::{rows as row_db, tasks as task_db};
use crate::error::{Error, Result};
use crate::models::{IngestionTask, RawRow, RowOutcome, TaskProgress, TaskStatus};
use crate::services::ai_client::ChatClient;
use crate::services::classifier::classify;
use crate::services::customer_matcher::CustomerMatcher;
use crate::services::error_sink;
use crate::services::materializer::Materializer;
use crate::services::order_numbers::OrderNumberGenerator;
use crate::services::product_matcher::ProductMatcher;
use crate::services::recognizer::{FallbackRecognizer, HeaderMapping};
use crate::services::row_parser;

/// Rows recognized and matched concurrently per task
const ROW_CONCURRENCY: usize = 4;
/// Persist counters to the database every N processed rows
const PERSIST_EVERY: u64 = 10;

/// Live per-task counters, updated lock-free by concurrent row workers
#[derive(Debug, Default)]
pub struct ProgressCounters {
    pub total: AtomicU64,
    pub processed: AtomicU64,
    pub success: AtomicU64,
    pub failed: AtomicU64,
    pub manual: AtomicU64,
}

impl ProgressCounters {
    pub fn snapshot(&self) -> TaskProgress {
        let total = self.total.load(Ordering::Relaxed);
        let processed = self.processed.load(Ordering::Relaxed);
        TaskProgress {
            total,
            processed,
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            manual: self.manual.load(Ordering::Relaxed),
            percentage: TaskProgress::percentage_of(processed, total),
        }
    }
}

/// In-memory progress, keyed by task id. Entries outlive task
/// completion so polls right after the final row still see counters;
/// restarts fall back to the persisted task row.
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<ProgressCounters>>>>,
}

impl ProgressRegistry {
    pub async fn register(&self, task_id: Uuid) -> Arc<ProgressCounters> {
        let counters = Arc::new(ProgressCounters::default());
        self.inner.write().await.insert(task_id, counters.clone());
        counters
    }

    pub async fn snapshot(&self, task_id: Uuid) -> Option<TaskProgress> {
        self.inner.read().await.get(&task_id).map(|c| c.snapshot())
    }
}

/// Spawns and supervises ingestion pipelines. Cheap to clone; all
/// state is shared.
#[derive(Clone)]
pub struct TaskCoordinator {
    pool: SqlitePool,
    client: ChatClient,
    config: ServiceConfig,
    numbers: OrderNumberGenerator,
    progress: ProgressRegistry,
    cancellations: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl TaskCoordinator {
    pub fn new(pool: SqlitePool, config: ServiceConfig) -> Self {
        let client = ChatClient::new(config.ai.clone());
        Self {
            pool,
            client,
            config,
            numbers: OrderNumberGenerator::new(),
            progress: ProgressRegistry::default(),
            cancellations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a task for an uploaded file and spawn its pipeline.
    /// Returns immediately with the PENDING task.
    pub async fn submit(
        &self,
        bytes: Vec<u8>,
        file_name: String,
        operator: String,
        channel: String,
        min_confidence: Option<f64>,
    ) -> Result<IngestionTask> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput("Uploaded file is empty".into()));
        }
        let min_confidence = min_confidence.unwrap_or(self.config.thresholds.manual_review_min);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(Error::InvalidInput(
                "minConfidence must be between 0.0 and 1.0".into(),
            ));
        }

        let file_hash = hex_digest(&bytes);
        let task = IngestionTask::new(
            file_name,
            bytes.len() as i64,
            file_hash,
            operator,
            channel,
            min_confidence,
        );
        task_db::save_task(&self.pool, &task).await?;

        let token = CancellationToken::new();
        self.cancellations
            .write()
            .await
            .insert(task.task_id, token.clone());
        let counters = self.progress.register(task.task_id).await;

        let coordinator = self.clone();
        let spawned = task.clone();
        tokio::spawn(async move {
            coordinator.run_pipeline(spawned, bytes, token, counters).await;
        });

        info!(task_id = %task.task_id, file = %task.file_name, "Ingestion task submitted");
        Ok(task)
    }

    /// Request cancellation. Returns the task so the caller can report
    /// its current status; cancelling a terminal task is a conflict
    /// handled at the API layer.
    pub async fn cancel(&self, task_id: Uuid) -> Result<IngestionTask> {
        let task = task_db::load_task(&self.pool, task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Task {}", task_id)))?;

        if task.status.is_terminal() {
            return Ok(task);
        }

        if let Some(token) = self.cancellations.read().await.get(&task_id) {
            token.cancel();
            info!(task_id = %task_id, "Cancellation requested");
        }
        Ok(task)
    }

    /// Current progress: live counters when the pipeline is resident,
    /// otherwise the persisted task row.
    pub async fn progress(&self, task_id: Uuid) -> Result<(IngestionTask, TaskProgress)> {
        let task = task_db::load_task(&self.pool, task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Task {}", task_id)))?;

        let progress = match self.progress.snapshot(task_id).await {
            Some(p) => p,
            None => TaskProgress {
                total: task.total_rows as u64,
                processed: task.processed_rows as u64,
                success: task.success_rows as u64,
                failed: task.failed_rows as u64,
                manual: task.manual_rows as u64,
                percentage: TaskProgress::percentage_of(
                    task.processed_rows as u64,
                    task.total_rows as u64,
                ),
            },
        };
        Ok((task, progress))
    }

    async fn run_pipeline(
        &self,
        mut task: IngestionTask,
        bytes: Vec<u8>,
        token: CancellationToken,
        counters: Arc<ProgressCounters>,
    ) {
        task.status = TaskStatus::Processing;
        task.started_at = Some(chrono::Utc::now());
        if let Err(e) = task_db::update_task_counters(&self.pool, &task).await {
            error!(task_id = %task.task_id, "Failed to mark task processing: {}", e);
        }

        match self.process_file(&mut task, &bytes, &token, &counters).await {
            Ok(()) => {
                task.status = if token.is_cancelled() {
                    TaskStatus::Cancelled
                } else {
                    TaskStatus::Completed
                };
            }
            Err(e) => {
                warn!(task_id = %task.task_id, "Task failed: {}", e);
                task.status = TaskStatus::Failed;
                task.error_message = Some(e.to_string());
                if let Err(sink_err) =
                    error_sink::record_task_error(&self.pool, task.task_id, &e.to_string()).await
                {
                    error!(task_id = %task.task_id, "Failed to record task error: {}", sink_err);
                }
            }
        }

        let progress = counters.snapshot();
        task.total_rows = progress.total as i64;
        task.processed_rows = progress.processed as i64;
        task.success_rows = progress.success as i64;
        task.failed_rows = progress.failed as i64;
        task.manual_rows = progress.manual as i64;
        task.completed_at = Some(chrono::Utc::now());

        if let Err(e) = task_db::update_task_counters(&self.pool, &task).await {
            error!(task_id = %task.task_id, "Failed to persist final task state: {}", e);
        }
        self.cancellations.write().await.remove(&task.task_id);

        info!(
            task_id = %task.task_id,
            status = task.status.as_str(),
            success = task.success_rows,
            failed = task.failed_rows,
            manual = task.manual_rows,
            "Ingestion task finished"
        );
    }

    async fn process_file(
        &self,
        task: &mut IngestionTask,
        bytes: &[u8],
        token: &CancellationToken,
        counters: &Arc<ProgressCounters>,
    ) -> Result<()> {
        let sheet = row_parser::parse_file(bytes, &task.file_name)?;

        let total = (sheet.rows.len() + sheet.parse_errors.len()) as u64;
        counters.total.store(total, Ordering::Relaxed);
        task.total_rows = total as i64;
        task_db::update_task_counters(&self.pool, task).await?;

        for (row_number, message) in &sheet.parse_errors {
            error_sink::record_parse_error(&self.pool, task.task_id, *row_number, message).await?;
            counters.failed.fetch_add(1, Ordering::Relaxed);
            counters.processed.fetch_add(1, Ordering::Relaxed);
        }

        if sheet.rows.is_empty() {
            return Ok(());
        }

        let recognizer =
            FallbackRecognizer::new(self.client.clone(), self.config.thresholds.clone());
        let mapping = recognizer.map_headers(&sheet.headers).await;
        info!(
            task_id = %task.task_id,
            columns = mapping.columns.len(),
            confidence = mapping.confidence,
            "Header mapping resolved"
        );

        let task_snapshot = task.clone();
        stream::iter(sheet.rows)
            .for_each_concurrent(ROW_CONCURRENCY, |raw| {
                let recognizer = &recognizer;
                let mapping = &mapping;
                let task = &task_snapshot;
                let counters = counters.clone();
                let token = token.clone();
                async move {
                    if token.is_cancelled() {
                        return;
                    }
                    self.process_row(task, raw, recognizer, mapping, &counters).await;
                    let processed = counters.processed.load(Ordering::Relaxed);
                    if processed % PERSIST_EVERY == 0 {
                        self.persist_counters(task, &counters).await;
                    }
                }
            })
            .await;

        Ok(())
    }

    async fn persist_counters(&self, task: &IngestionTask, counters: &ProgressCounters) {
        let progress = counters.snapshot();
        let mut snapshot = task.clone();
        snapshot.total_rows = progress.total as i64;
        snapshot.processed_rows = progress.processed as i64;
        snapshot.success_rows = progress.success as i64;
        snapshot.failed_rows = progress.failed as i64;
        snapshot.manual_rows = progress.manual as i64;
        snapshot.status = TaskStatus::Processing;
        if let Err(e) = task_db::update_task_counters(&self.pool, &snapshot).await {
            warn!(task_id = %task.task_id, "Failed to persist progress: {}", e);
        }
    }

    /// Recognize, match, classify and persist one row. Row-level
    /// failures are recorded, never propagated; a row that cannot even
    /// be recorded only logs.
    async fn process_row(
        &self,
        task: &IngestionTask,
        raw: RawRow,
        recognizer: &FallbackRecognizer,
        mapping: &HeaderMapping,
        counters: &ProgressCounters,
    ) {
        let fields = recognizer.recognize_row(&raw, mapping).await;

        let product_match = if fields.has_product_reference() {
            let matcher = ProductMatcher::new(&self.pool, &self.client, &self.config.thresholds);
            match matcher.smart_match(&fields).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(row = raw.row_number, "Product matching failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let has_customer_signal = fields.customer_code.is_some()
            || fields.customer_name.is_some()
            || fields.contact_phone.is_some();
        let customer_match = if has_customer_signal {
            let matcher = CustomerMatcher::new(&self.pool, &self.client, &self.config.thresholds);
            match matcher.smart_match(&fields).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(row = raw.row_number, "Customer matching failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut processed = classify(
            &raw,
            fields,
            product_match,
            customer_match,
            task.min_confidence,
        );

        let mut order_number = None;
        if processed.outcome == RowOutcome::Success {
            let materializer =
                Materializer::new(&self.pool, &self.numbers, &self.config.default_unit);
            match materializer
                .materialize(task.task_id, &task.operator, &task.channel, &processed)
                .await
            {
                Ok(number) => order_number = Some(number),
                Err(e) => {
                    warn!(row = raw.row_number, "Materialization failed: {}", e);
                    if let Err(sink_err) = error_sink::record_materialization_error(
                        &self.pool,
                        task.task_id,
                        &raw,
                        &processed,
                        &e.to_string(),
                    )
                    .await
                    {
                        error!(row = raw.row_number, "Failed to record error: {}", sink_err);
                    }
                    processed.outcome = RowOutcome::Failed;
                    processed.error_message = Some(format!("Order creation failed: {}", e));
                }
            }
        } else if let Err(e) =
            error_sink::record_row(&self.pool, task.task_id, &raw, &processed).await
        {
            error!(row = raw.row_number, "Failed to record error: {}", e);
        }

        if let Err(e) = row_db::insert_row_result(
            &self.pool,
            task.task_id,
            &processed,
            order_number.as_deref(),
        )
        .await
        {
            error!(row = raw.row_number, "Failed to persist row result: {}", e);
        }

        match processed.outcome {
            RowOutcome::Success => counters.success.fetch_add(1, Ordering::Relaxed),
            RowOutcome::ManualProcess => counters.manual.fetch_add(1, Ordering::Relaxed),
            RowOutcome::Failed => counters.failed.fetch_add(1, Ordering::Relaxed),
        };
        counters.processed.fetch_add(1, Ordering::Relaxed);
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_digest_is_hex() {
        let digest = hex_digest(b"abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn progress_registry_snapshot() {
        let registry = ProgressRegistry::default();
        let id = Uuid::new_v4();
        assert!(registry.snapshot(id).await.is_none());

        let counters = registry.register(id).await;
        counters.total.store(10, Ordering::Relaxed);
        counters.processed.store(5, Ordering::Relaxed);
        counters.success.store(3, Ordering::Relaxed);

        let snapshot = registry.snapshot(id).await.unwrap();
        assert_eq!(snapshot.total, 10);
        assert_eq!(snapshot.processed, 5);
        assert_eq!(snapshot.percentage, 50.0);
    }
}
