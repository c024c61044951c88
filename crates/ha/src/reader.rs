//! Row readers.
//!
//! A [`RowReader`] carries a row key plus column filters, a mutable error
//! slot, a result buffer and an optional completion callback. Like
//! mutations, readers are re-dispatched across replicas with a
//! [`reset`](RowReader::reset) between attempts; the reset clears the
//! error slot and the result buffer but keeps the filters and callback.

use mirrortab_common::{RowResult, Status};

/// Completion hook of an asynchronous reader. Receives the reader back by
/// value once the fan-out chain has finished; invoked exactly once.
pub type ReaderCallback = Box<dyn FnOnce(RowReader) + Send + 'static>;

/// A read of one row, resolved against whichever replica answers.
pub struct RowReader {
    row_key: String,
    /// Column filter as `family` or `family:qualifier` selectors.
    /// Empty selects the whole row.
    columns: Vec<String>,
    max_versions: u32,
    snapshot: u64,
    /// Half-open `[min, max)` timestamp window, microseconds.
    timestamp_range: Option<(i64, i64)>,
    error: Status,
    result: RowResult,
    callback: Option<ReaderCallback>,
}

impl std::fmt::Debug for RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader")
            .field("row_key", &self.row_key)
            .field("columns", &self.columns)
            .field("max_versions", &self.max_versions)
            .field("error", &self.error)
            .field("is_async", &self.is_async())
            .finish()
    }
}

impl RowReader {
    pub fn new(row_key: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            columns: Vec::new(),
            max_versions: 1,
            snapshot: 0,
            timestamp_range: None,
            error: Status::ok(),
            result: RowResult::new(),
            callback: None,
        }
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    pub fn add_column(&mut self, selector: impl Into<String>) -> &mut Self {
        self.columns.push(selector.into());
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn set_max_versions(&mut self, n: u32) -> &mut Self {
        self.max_versions = n;
        self
    }

    pub fn max_versions(&self) -> u32 {
        self.max_versions
    }

    pub fn set_snapshot(&mut self, snapshot: u64) -> &mut Self {
        self.snapshot = snapshot;
        self
    }

    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    pub fn set_timestamp_range(&mut self, min: i64, max: i64) -> &mut Self {
        self.timestamp_range = Some((min, max));
        self
    }

    pub fn timestamp_range(&self) -> Option<(i64, i64)> {
        self.timestamp_range
    }

    pub fn error(&self) -> &Status {
        &self.error
    }

    /// Record the outcome of a replica attempt. Called by the replica
    /// layer.
    pub fn set_error(&mut self, error: Status) {
        self.error = error;
    }

    pub fn result(&self) -> &RowResult {
        &self.result
    }

    /// Install a result buffer, replacing whatever is there. Called by
    /// the replica layer on success and by the latest-get merge.
    pub fn set_result(&mut self, result: RowResult) {
        self.result = result;
    }

    /// Move the result buffer out, leaving an empty one.
    pub fn take_result(&mut self) -> RowResult {
        std::mem::take(&mut self.result)
    }

    /// Attach a completion callback, turning this reader into an
    /// asynchronous one.
    pub fn set_callback(&mut self, callback: ReaderCallback) {
        self.callback = Some(callback);
    }

    /// A reader is asynchronous iff it carries a completion callback.
    pub fn is_async(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn take_callback(&mut self) -> Option<ReaderCallback> {
        self.callback.take()
    }

    /// Clear dispatch state (error slot and result buffer) so the object
    /// can be re-submitted to another replica. Filters, snapshot and
    /// callback survive.
    pub fn reset(&mut self) {
        self.error = Status::ok();
        self.result = RowResult::new();
    }
}
