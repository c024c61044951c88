//! mirrortab-common: shared types for the mirrortab project.
//!
//! Provides the [`Status`] value carried by every row operation, the
//! [`Cell`]/[`RowResult`] read carriers, and the table/tablet descriptors
//! exchanged with the control plane.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod cell;
pub mod schema;

pub use cell::{Cell, RowResult};
pub use schema::{
    ColumnFamilySchema, ScanDescriptor, TableDescriptor, TableInfo, TableStatus, TabletInfo,
};

// ---------------------------------------------------------------------------
// ErrCode
// ---------------------------------------------------------------------------

/// Outcome category of a table-store operation.
///
/// `Ok` is a member on purpose: row objects carry their outcome in a
/// mutable status slot, and "no error" is one of its states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrCode {
    Ok,
    NotFound,
    /// Operation deliberately unsupported by the layer that received it.
    NotImpl,
    BadParam,
    Timeout,
    Busy,
    IoError,
    PermissionDenied,
    System,
}

impl ErrCode {
    pub fn is_ok(self) -> bool {
        self == ErrCode::Ok
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrCode::Ok => "ok",
            ErrCode::NotFound => "not found",
            ErrCode::NotImpl => "not implemented",
            ErrCode::BadParam => "bad parameter",
            ErrCode::Timeout => "timeout",
            ErrCode::Busy => "busy",
            ErrCode::IoError => "io error",
            ErrCode::PermissionDenied => "permission denied",
            ErrCode::System => "system error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Operation outcome: an [`ErrCode`] plus a human-readable reason.
///
/// This is both the error-slot value mutated in place on row objects and
/// the `Err` payload of control-plane results. The reason string is
/// whatever the replica layer reported and is propagated verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {reason}")]
pub struct Status {
    code: ErrCode,
    reason: String,
}

impl Status {
    /// A clean `Ok` status with no reason.
    pub fn ok() -> Self {
        Self {
            code: ErrCode::Ok,
            reason: String::new(),
        }
    }

    /// The `Ok/"success"` status written into a slot when a fan-out
    /// succeeded on at least one replica.
    pub fn success() -> Self {
        Self {
            code: ErrCode::Ok,
            reason: "success".to_string(),
        }
    }

    pub fn failed(code: ErrCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Status for an operation the facade refuses to support.
    pub fn not_implemented(op: &str) -> Self {
        Self {
            code: ErrCode::NotImpl,
            reason: format!("{op} is not supported"),
        }
    }

    pub fn code(&self) -> ErrCode {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// Overwrite the slot in place.
    pub fn set(&mut self, code: ErrCode, reason: impl Into<String>) {
        self.code = code;
        self.reason = reason.into();
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
