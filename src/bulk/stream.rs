//! Streaming bulk processing over async I/O
//!
//! Mirrors the synchronous processor but reads the instruction file in
//! batches with `csv-async` and processes each batch with user-based
//! partitioning: rows for different users run concurrently on blocking
//! tasks while each user's rows keep their file order, so a later row
//! observes the balance left by an earlier one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{info, warn};

use crate::core::engine::BankingEngine;
use crate::store::Store;
use crate::types::{EngineError, UserId};

use super::format::{self, BulkSummary, RowResult, MAX_INPUT_BYTES};
use super::processor::BulkProcessor;

/// A data row paired with its 1-based row number
pub type NumberedRow = (usize, Vec<String>);

/// Batched async reader over a bulk instruction file
///
/// The first record is consumed as the header and validated; every
/// subsequent record is handed out with its data-row number. Reading
/// stays incremental: memory usage is bounded by the batch size, not the
/// file size.
pub struct BulkStreamReader<R: AsyncRead + Unpin + Send> {
    reader: csv_async::AsyncReader<R>,
    header_validated: bool,
    next_row: usize,
}

impl<R: AsyncRead + Unpin + Send> BulkStreamReader<R> {
    /// Create a reader over an async byte stream
    pub fn new(reader: R) -> Self {
        let reader = AsyncReaderBuilder::new()
            .has_headers(false)
            .trim(csv_async::Trim::All)
            .flexible(true)
            .create_reader(reader);
        Self {
            reader,
            header_validated: false,
            next_row: 0,
        }
    }

    /// Whether a valid header has been consumed
    pub fn header_seen(&self) -> bool {
        self.header_validated
    }

    /// Read up to `batch_size` data rows
    ///
    /// Returns an empty batch at end of input. An unreadable record
    /// becomes a numbered row with no fields, which downstream parsing
    /// reports as a row failure.
    ///
    /// # Errors
    ///
    /// `INVALID_FILE` if the header row is missing or malformed.
    pub async fn read_batch(&mut self, batch_size: usize) -> Result<Vec<NumberedRow>, EngineError> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.reader.records();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => {
                    let fields: Vec<String> = record.iter().map(str::to_string).collect();
                    if !self.header_validated {
                        format::validate_header(&fields)
                            .map_err(|reason| EngineError::invalid_bulk_file(&reason))?;
                        self.header_validated = true;
                        continue;
                    }
                    self.next_row += 1;
                    batch.push((self.next_row, fields));
                }
                Some(Err(error)) => {
                    if !self.header_validated {
                        return Err(EngineError::invalid_bulk_file(&format!(
                            "unreadable header: {error}"
                        )));
                    }
                    self.next_row += 1;
                    batch.push((self.next_row, Vec::new()));
                }
                None => break,
            }
        }

        Ok(batch)
    }
}

/// Streaming bulk processor with user-based partitioning
#[derive(Debug)]
pub struct StreamingBulkProcessor<S: Store + 'static> {
    processor: BulkProcessor<S>,
}

impl<S: Store + 'static> StreamingBulkProcessor<S> {
    /// Create a streaming processor over a shared engine
    pub fn new(engine: Arc<BankingEngine<S>>) -> Self {
        Self {
            processor: BulkProcessor::new(engine),
        }
    }

    /// Process an instruction file from disk
    ///
    /// `operator_id` identifies the pre-authenticated employee submitting
    /// the batch, recorded in the audit log event. Batches are processed
    /// sequentially so a user's rows spanning two batches keep their
    /// order; within a batch, different users' rows run concurrently.
    ///
    /// # Errors
    ///
    /// `INVALID_FILE` for unreadable input, a missing or malformed
    /// header, the 5 MiB size cap, or zero data rows.
    pub async fn process_file(
        &self,
        operator_id: UserId,
        path: &Path,
        batch_size: usize,
    ) -> Result<BulkSummary, EngineError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|error| {
            EngineError::invalid_bulk_file(&format!("cannot stat input file: {error}"))
        })?;
        if metadata.len() > MAX_INPUT_BYTES {
            return Err(EngineError::invalid_bulk_file("input exceeds the 5 MiB limit"));
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "input.csv".to_string());

        let file = tokio::fs::File::open(path).await.map_err(|error| {
            EngineError::invalid_bulk_file(&format!("cannot open input file: {error}"))
        })?;
        let mut reader = BulkStreamReader::new(file.compat());

        let mut rows = Vec::new();
        loop {
            let batch = reader.read_batch(batch_size).await?;
            if batch.is_empty() {
                break;
            }
            rows.extend(self.process_batch(batch, &filename).await);
        }

        if !reader.header_seen() {
            return Err(EngineError::invalid_bulk_file("input is empty"));
        }
        if rows.is_empty() {
            return Err(EngineError::invalid_bulk_file(
                "input must contain at least one data row",
            ));
        }

        let summary = BulkSummary::from_rows(rows);
        info!(
            operator = %operator_id,
            filename = %filename,
            total = summary.total,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "bulk run completed"
        );
        Ok(summary)
    }

    /// Process one batch with user-based partitioning
    async fn process_batch(&self, batch: Vec<NumberedRow>, filename: &str) -> Vec<RowResult> {
        let mut partitions: HashMap<String, Vec<NumberedRow>> = HashMap::new();
        for (row, fields) in batch {
            let key = fields
                .first()
                .map(|field| field.trim().to_string())
                .unwrap_or_default();
            partitions.entry(key).or_default().push((row, fields));
        }

        let mut tasks = Vec::new();
        for (_national_id, user_rows) in partitions {
            let processor = self.processor.clone();
            let filename = filename.to_string();
            tasks.push(tokio::task::spawn_blocking(move || {
                user_rows
                    .into_iter()
                    .map(|(row, fields)| processor.process_row(row, &fields, &filename))
                    .collect::<Vec<_>>()
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(task_results) => results.extend(task_results),
                Err(error) => {
                    warn!(%error, "bulk worker task failed");
                }
            }
        }
        results
    }
}
