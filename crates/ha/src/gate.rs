//! Completion gates for asynchronous fan-out chains.
//!
//! An asynchronous row operation travels through the replicas one at a
//! time. After each per-replica completion the dispatch chain consults a
//! gate, which advances its cursor and answers with a [`Decision`]:
//! re-dispatch to the next replica, or finish and let the user callback
//! fire. A gate is single-use and is only ever touched by the one task
//! running the chain, so it needs no locking; once it has ordered a fire
//! it suppresses everything that follows.

use crate::merge::merge_results;
use crate::reader::RowReader;
use mirrortab_common::{ErrCode, RowResult};

/// What the dispatch chain must do after a per-replica completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reset the row object and dispatch it to replica `next`.
    Retry { next: usize },
    /// Chain finished; invoke the user callback with the current state.
    Fire,
    /// Chain finished and at least one replica succeeded; clear the error
    /// slot before invoking the user callback.
    FireCleared,
    /// The gate already fired; do nothing.
    Suppress,
}

// ---------------------------------------------------------------------------
// PutGate
// ---------------------------------------------------------------------------

/// Gate for an asynchronous mutation: visit every replica in order, fire
/// once after the last, and report success when fewer than all replicas
/// failed.
#[derive(Debug)]
pub struct PutGate {
    cursor: usize,
    replicas: usize,
    failures: usize,
    fired: bool,
}

impl PutGate {
    pub fn new(replicas: usize) -> Self {
        Self {
            cursor: 0,
            replicas,
            failures: 0,
            fired: false,
        }
    }

    /// Consume one per-replica completion.
    pub fn on_completion(&mut self, code: ErrCode) -> Decision {
        if self.fired {
            return Decision::Suppress;
        }
        let failed = !code.is_ok();
        if failed {
            self.failures += 1;
        }
        self.cursor += 1;
        if self.cursor >= self.replicas {
            self.fired = true;
            if failed && self.failures < self.replicas {
                // The last attempt failed but an earlier one stuck.
                Decision::FireCleared
            } else {
                Decision::Fire
            }
        } else {
            Decision::Retry { next: self.cursor }
        }
    }

    /// Index of the replica the chain should currently be talking to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

// ---------------------------------------------------------------------------
// GetGate
// ---------------------------------------------------------------------------

/// Gate for an asynchronous first-success read: fire on the first OK,
/// otherwise fall through the replicas and fire with the last error.
#[derive(Debug)]
pub struct GetGate {
    cursor: usize,
    replicas: usize,
    fired: bool,
}

impl GetGate {
    pub fn new(replicas: usize) -> Self {
        Self {
            cursor: 0,
            replicas,
            fired: false,
        }
    }

    /// Consume one per-replica completion.
    pub fn on_completion(&mut self, code: ErrCode) -> Decision {
        if self.fired {
            return Decision::Suppress;
        }
        if code.is_ok() {
            self.fired = true;
            return Decision::Fire;
        }
        self.cursor += 1;
        if self.cursor >= self.replicas {
            self.fired = true;
            Decision::Fire
        } else {
            Decision::Retry { next: self.cursor }
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

// ---------------------------------------------------------------------------
// LGetGate
// ---------------------------------------------------------------------------

/// Gate for an asynchronous latest-get: visit every replica, harvest each
/// successful result, and on the last completion install the
/// timestamp-merged result before firing.
pub struct LGetGate {
    cursor: usize,
    replicas: usize,
    timestamp_diff: i64,
    results: Vec<RowResult>,
    fired: bool,
}

impl std::fmt::Debug for LGetGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LGetGate")
            .field("cursor", &self.cursor)
            .field("replicas", &self.replicas)
            .field("harvested", &self.results.len())
            .field("fired", &self.fired)
            .finish()
    }
}

impl LGetGate {
    pub fn new(replicas: usize, timestamp_diff: i64) -> Self {
        Self {
            cursor: 0,
            replicas,
            timestamp_diff,
            results: Vec::new(),
            fired: false,
        }
    }

    /// Consume one per-replica completion, harvesting the reader's result
    /// when the attempt succeeded. On the final completion the merged
    /// result is installed into the reader and, if anything was
    /// harvested, the error slot is cleared.
    pub fn on_completion(&mut self, reader: &mut RowReader) -> Decision {
        if self.fired {
            return Decision::Suppress;
        }
        if reader.error().is_ok() {
            self.results.push(reader.take_result());
        }
        self.cursor += 1;
        if self.cursor >= self.replicas {
            self.fired = true;
            if !self.results.is_empty() {
                let merged =
                    merge_results(&self.results, reader.max_versions(), self.timestamp_diff);
                reader.reset();
                reader.set_result(merged);
            }
            Decision::Fire
        } else {
            Decision::Retry { next: self.cursor }
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
