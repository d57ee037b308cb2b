use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::info;

use crate::records::CanonicalRecord;
use crate::storage::{BatchInsertResult, StorageError, StorageProvider};

/// Logs every record instead of storing it. For local debugging.
pub struct PrintStorage {}

#[async_trait]
impl StorageProvider for PrintStorage {
    fn name(&self) -> &str {
        "print"
    }

    async fn insert(&self, table: &str, record: &CanonicalRecord) -> Result<(), StorageError> {
        let row = serde_json::to_string(record).unwrap_or_default();
        info!("{table}: {row}");
        counter!("basket_rows_printed_total").increment(1);

        Ok(())
    }

    async fn insert_batch(&self, table: &str, records: &[CanonicalRecord]) -> BatchInsertResult {
        let span = tracing::span!(tracing::Level::INFO, "batch of rows");
        let _enter = span.enter();

        histogram!("basket_print_batch_size").record(records.len() as f64);
        counter!("basket_rows_printed_total").increment(records.len() as u64);
        for record in records {
            let row = serde_json::to_string(record).unwrap_or_default();
            info!("{table}: {row}");
        }

        BatchInsertResult {
            processed: records.len(),
            errors: vec![],
        }
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
