//! Row mutations.
//!
//! A [`RowMutation`] carries a row key, an ordered list of cell edits, a
//! mutable error slot and an optional completion callback. The facade
//! re-dispatches the same object across replicas, calling [`reset`]
//! between attempts; `reset` clears the dispatch state (the error slot)
//! while leaving the user payload and the callback in place.
//!
//! [`reset`]: RowMutation::reset

use mirrortab_common::Status;

/// Completion hook of an asynchronous mutation. Receives the mutation
/// back by value once the fan-out chain has finished; invoked exactly
/// once.
pub type MutationCallback = Box<dyn FnOnce(RowMutation) + Send + 'static>;

/// One cell edit inside a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOp {
    Put {
        family: String,
        qualifier: String,
        /// Explicit cell timestamp, microseconds; `None` lets the server
        /// assign one.
        timestamp: Option<i64>,
        /// Cell time-to-live in seconds; `None` means never expire.
        ttl_secs: Option<i32>,
        value: Vec<u8>,
    },
    /// Atomic counter increment.
    Add {
        family: String,
        qualifier: String,
        delta: i64,
    },
    PutIfAbsent {
        family: String,
        qualifier: String,
        value: Vec<u8>,
    },
    Append {
        family: String,
        qualifier: String,
        value: Vec<u8>,
    },
    DeleteRow {
        timestamp: Option<i64>,
    },
    DeleteFamily {
        family: String,
        timestamp: Option<i64>,
    },
    DeleteColumns {
        family: String,
        qualifier: String,
        timestamp: Option<i64>,
    },
}

/// A mutation of one row, applied across every replica by the facade.
pub struct RowMutation {
    row_key: String,
    ops: Vec<MutationOp>,
    error: Status,
    callback: Option<MutationCallback>,
}

impl std::fmt::Debug for RowMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowMutation")
            .field("row_key", &self.row_key)
            .field("ops", &self.ops.len())
            .field("error", &self.error)
            .field("is_async", &self.is_async())
            .finish()
    }
}

impl RowMutation {
    pub fn new(row_key: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            ops: Vec::new(),
            error: Status::ok(),
            callback: None,
        }
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    pub fn ops(&self) -> &[MutationOp] {
        &self.ops
    }

    pub fn put(&mut self, family: &str, qualifier: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(MutationOp::Put {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            timestamp: None,
            ttl_secs: None,
            value: value.into(),
        });
        self
    }

    pub fn put_with_timestamp(
        &mut self,
        family: &str,
        qualifier: &str,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.ops.push(MutationOp::Put {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            timestamp: Some(timestamp),
            ttl_secs: None,
            value: value.into(),
        });
        self
    }

    pub fn add(&mut self, family: &str, qualifier: &str, delta: i64) -> &mut Self {
        self.ops.push(MutationOp::Add {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            delta,
        });
        self
    }

    pub fn put_if_absent(
        &mut self,
        family: &str,
        qualifier: &str,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.ops.push(MutationOp::PutIfAbsent {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn append(&mut self, family: &str, qualifier: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(MutationOp::Append {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn delete_row(&mut self) -> &mut Self {
        self.ops.push(MutationOp::DeleteRow { timestamp: None });
        self
    }

    pub fn delete_family(&mut self, family: &str) -> &mut Self {
        self.ops.push(MutationOp::DeleteFamily {
            family: family.to_string(),
            timestamp: None,
        });
        self
    }

    pub fn delete_columns(&mut self, family: &str, qualifier: &str) -> &mut Self {
        self.ops.push(MutationOp::DeleteColumns {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            timestamp: None,
        });
        self
    }

    pub fn error(&self) -> &Status {
        &self.error
    }

    /// Record the outcome of a replica attempt. Called by the replica
    /// layer.
    pub fn set_error(&mut self, error: Status) {
        self.error = error;
    }

    /// Attach a completion callback, turning this mutation into an
    /// asynchronous one.
    pub fn set_callback(&mut self, callback: MutationCallback) {
        self.callback = Some(callback);
    }

    /// A mutation is asynchronous iff it carries a completion callback.
    pub fn is_async(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn take_callback(&mut self) -> Option<MutationCallback> {
        self.callback.take()
    }

    /// Clear dispatch state so the object can be re-submitted to another
    /// replica. User payload and callback survive.
    pub fn reset(&mut self) {
        self.error = Status::ok();
    }
}
