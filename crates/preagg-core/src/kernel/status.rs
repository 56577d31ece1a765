//! Module: kernel::status
//! Responsibility: device-side error taxonomy, per-thread error slots, and
//! the first-failure-wins status channel.
//! Does not own: host-side error classification (see `error`).
//! Boundary: kernels only ever raise through `ErrorSlot` and
//! `writeback_status`; the host reads `StatusChannel` after completion.

use crate::{aggregate::MergeError, buffer::ReserveError, team::TeamContext};
use derive_more::Display;
use std::sync::{
    OnceLock,
    atomic::{AtomicI32, Ordering},
};
use thiserror::Error as ThisError;

///
/// StatusCode
///
/// Wire status of one job. Zero is success.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum StatusCode {
    #[display("success")]
    Success = 0,
    #[display("cpu_recheck")]
    CpuRecheck = 1,
    #[display("data_store_corruption")]
    DataStoreCorruption = 2,
    #[display("data_store_no_space")]
    DataStoreNoSpace = 3,
}

impl StatusCode {
    /// Decode a wire status; unknown codes read as corruption.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::CpuRecheck,
            3 => Self::DataStoreNoSpace,
            _ => Self::DataStoreCorruption,
        }
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether the batch can be re-run on the CPU fallback path as is.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::CpuRecheck)
    }
}

///
/// KernelError
///
/// Failure raised by one kernel thread.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KernelError {
    #[error("data store corruption: {reason}")]
    DataStoreCorruption {
        reason: String,
        column: Option<usize>,
        row: Option<u32>,
    },

    #[error("no space in {resource}: requested {requested}, used {used} of {capacity}")]
    DataStoreNoSpace {
        resource: &'static str,
        requested: u32,
        used: u32,
        capacity: u32,
    },

    #[error("column {column} needs cpu recheck: {source}")]
    CpuRecheck { column: usize, source: MergeError },
}

impl KernelError {
    pub(crate) fn corruption(reason: impl Into<String>) -> Self {
        Self::DataStoreCorruption {
            reason: reason.into(),
            column: None,
            row: None,
        }
    }

    pub(crate) fn corruption_at(reason: impl Into<String>, column: usize, row: u32) -> Self {
        Self::DataStoreCorruption {
            reason: reason.into(),
            column: Some(column),
            row: Some(row),
        }
    }

    pub(crate) const fn no_space(resource: &'static str, err: ReserveError) -> Self {
        Self::DataStoreNoSpace {
            resource,
            requested: err.requested,
            used: err.used,
            capacity: err.capacity,
        }
    }

    /// Lift a merge failure on `column`.
    pub(crate) fn from_merge(column: usize, row: u32, err: MergeError) -> Self {
        match err {
            MergeError::Overflow { .. } => Self::CpuRecheck {
                column,
                source: err,
            },
            MergeError::TypeMismatch { .. } | MergeError::Corrupt { .. } => {
                Self::corruption_at(err.to_string(), column, row)
            }
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::DataStoreCorruption { .. } => StatusCode::DataStoreCorruption,
            Self::DataStoreNoSpace { .. } => StatusCode::DataStoreNoSpace,
            Self::CpuRecheck { .. } => StatusCode::CpuRecheck,
        }
    }
}

///
/// ErrorSlot
///
/// Per-thread error register. Keeps the first error only.
///

#[derive(Debug, Default)]
pub struct ErrorSlot(Option<KernelError>);

impl ErrorSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self(None)
    }

    /// Keep `err` unless an earlier error is already held.
    pub fn set(&mut self, err: KernelError) {
        if self.0.is_none() {
            self.0 = Some(err);
        }
    }

    /// Unwrap one fallible step, recording its error.
    pub fn record<T>(&mut self, result: Result<T, KernelError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.set(err);
                None
            }
        }
    }

    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.0.is_some()
    }

    #[must_use]
    pub fn into_inner(self) -> Option<KernelError> {
        self.0
    }
}

///
/// StatusChannel
///
/// One status word with first-failure-wins semantics. The detail of the
/// winning error is published after the code.
///

#[derive(Debug, Default)]
pub struct StatusChannel {
    code: AtomicI32,
    detail: OnceLock<KernelError>,
}

impl StatusChannel {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            code: AtomicI32::new(0),
            detail: OnceLock::new(),
        }
    }

    /// Raise `err`; returns true when this call won the channel.
    pub fn raise(&self, err: KernelError) -> bool {
        let won = self
            .code
            .compare_exchange(
                StatusCode::Success.code(),
                err.status().code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            let _ = self.detail.set(err);
        }

        won
    }

    #[must_use]
    pub fn code(&self) -> StatusCode {
        StatusCode::from_code(self.code.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn detail(&self) -> Option<&KernelError> {
        self.detail.get()
    }

    /// Forward this channel's outcome into `other`.
    pub fn forward_to(&self, other: &Self) -> bool {
        match self.detail.get() {
            Some(err) => other.raise(err.clone()),
            None => false,
        }
    }
}

/// Team writeback of one thread's error slot.
///
/// Every teammate must call this; it contains a barrier. Failing threads
/// race on the team channel, then the leader forwards the winner to `job`.
pub fn writeback_status(ctx: &TeamContext<'_>, slot: ErrorSlot, job: &StatusChannel) {
    let team = &ctx.shared().status;
    if let Some(err) = slot.into_inner() {
        team.raise(err);
    }
    ctx.barrier();
    if ctx.is_leader() {
        team.forward_to(job);
    }
}
