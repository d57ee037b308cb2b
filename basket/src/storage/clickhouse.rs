use ::clickhouse::{Client, Row};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::ClickHouseConfig;
use crate::records::{CanonicalRecord, ErrorRecord, TrackRecord, WebVitalsRecord};
use crate::storage::{BatchInsertResult, StorageError, StorageProvider};

impl From<::clickhouse::error::Error> for StorageError {
    fn from(err: ::clickhouse::error::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Analytics store backed by ClickHouse. Rows are sent as RowBinary, one
/// INSERT per call.
#[derive(Clone)]
pub struct ClickHouseStorage {
    client: Client,
}

impl ClickHouseStorage {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(config.clickhouse_url.clone())
            .with_database(config.clickhouse_database.clone())
            .with_user(config.clickhouse_user.clone())
            .with_password(config.clickhouse_password.clone());

        if config.clickhouse_async_insert {
            client = client
                .with_option("async_insert", "1")
                .with_option("wait_for_async_insert", "0");
        }

        info!("using clickhouse at {}", config.clickhouse_url);
        Self { client }
    }

    async fn write_rows<T>(&self, table: &str, rows: &[&T]) -> Result<(), StorageError>
    where
        T: Row + Serialize,
    {
        if rows.is_empty() {
            return Ok(());
        }
        let fail = |err: ::clickhouse::error::Error| StorageError::Insert {
            table: table.to_owned(),
            message: err.to_string(),
        };

        let mut insert = self.client.insert::<T>(table).map_err(fail)?;
        for row in rows {
            insert.write(*row).await.map_err(fail)?;
        }
        insert.end().await.map_err(fail)
    }
}

#[async_trait]
impl StorageProvider for ClickHouseStorage {
    fn name(&self) -> &str {
        "clickhouse"
    }

    #[instrument(skip_all, fields(table = table))]
    async fn insert(&self, table: &str, record: &CanonicalRecord) -> Result<(), StorageError> {
        match record {
            CanonicalRecord::Track(row) => self.write_rows::<TrackRecord>(table, &[row.as_ref()]).await,
            CanonicalRecord::Error(row) => self.write_rows::<ErrorRecord>(table, &[row]).await,
            CanonicalRecord::WebVitals(row) => {
                self.write_rows::<WebVitalsRecord>(table, &[row]).await
            }
        }
    }

    #[instrument(skip_all, fields(table = table, rows = records.len()))]
    async fn insert_batch(&self, table: &str, records: &[CanonicalRecord]) -> BatchInsertResult {
        let mut tracks = Vec::new();
        let mut errors = Vec::new();
        let mut vitals = Vec::new();
        for record in records {
            match record {
                CanonicalRecord::Track(row) => tracks.push(row.as_ref()),
                CanonicalRecord::Error(row) => errors.push(row),
                CanonicalRecord::WebVitals(row) => vitals.push(row),
            }
        }

        let mut result = BatchInsertResult::default();
        let outcomes = [
            (tracks.len(), self.write_rows::<TrackRecord>(table, &tracks).await),
            (errors.len(), self.write_rows::<ErrorRecord>(table, &errors).await),
            (vitals.len(), self.write_rows::<WebVitalsRecord>(table, &vitals).await),
        ];
        for (count, outcome) in outcomes {
            match outcome {
                Ok(()) => result.processed += count,
                Err(err) => {
                    error!("batch insert into {} failed: {}", table, err);
                    result.errors.push(err.to_string());
                }
            }
        }
        result
    }

    async fn is_healthy(&self) -> bool {
        match self.client.query("SELECT 1").execute().await {
            Ok(()) => true,
            Err(err) => {
                error!("clickhouse health check failed: {}", err);
                false
            }
        }
    }
}
