//! Bulk instruction processing
//!
//! Parses CSV instruction files (`NationalId,Amount,Operation`) and
//! drives the banking engine once per row, isolating per-row failures.
//!
//! # Components
//!
//! - `format` - pure format concerns: header matching, row parsing,
//!   the summary shapes, summary output serialization
//! - `processor` - synchronous row-by-row driver over any reader
//! - `stream` - async batched reader and user-partitioned concurrent
//!   driver over files

pub mod format;
pub mod processor;
pub mod stream;

pub use format::{
    write_summary_csv, BulkOperation, BulkSummary, ParsedRow, RowResult, MAX_INPUT_BYTES,
};
pub use processor::BulkProcessor;
pub use stream::{BulkStreamReader, StreamingBulkProcessor};
