use crate::kernel::{KernelError, StatusCode};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured host-side error with a stable internal classification.
/// Kernel threads never construct this directly; they raise `KernelError`
/// and the host converts the job status once the batch has completed.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Kernel-side failure this error was lifted from, if any.
    pub detail: Option<KernelError>,
}

impl InternalError {
    /// Construct an InternalError without kernel detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a config-origin unsupported error.
    pub(crate) fn config_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Config, message)
    }

    /// Construct a layout-origin corruption error.
    pub(crate) fn layout_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Layout, message)
    }

    /// Construct a buffer-origin invariant violation.
    pub(crate) fn buffer_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Buffer, message)
    }

    /// Construct a buffer-origin unsupported error.
    pub(crate) fn buffer_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Buffer, message)
    }

    /// Construct a buffer-origin corruption error.
    pub(crate) fn buffer_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Buffer, message)
    }

    /// Construct a runtime-origin internal error (thread launch, pool setup).
    pub(crate) fn runtime_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Runtime, message)
    }

    /// Lift one settled job status into a host error.
    ///
    /// Returns `None` for `StatusCode::Success`.
    #[must_use]
    pub fn from_status(
        status: StatusCode,
        origin: ErrorOrigin,
        detail: Option<KernelError>,
    ) -> Option<Self> {
        let class = match status {
            StatusCode::Success => return None,
            StatusCode::CpuRecheck => ErrorClass::Recheck,
            StatusCode::DataStoreNoSpace => ErrorClass::CapacityExhausted,
            StatusCode::DataStoreCorruption => ErrorClass::Corruption,
        };
        let message = detail.as_ref().map_or_else(
            || format!("job finished with status {status}"),
            |err| format!("job finished with status {status}: {err}"),
        );

        Some(Self {
            class,
            origin,
            message,
            detail,
        })
    }

    /// Whether the caller may retry the batch on the CPU fallback path.
    #[must_use]
    pub const fn is_recheck(&self) -> bool {
        matches!(self.class, ErrorClass::Recheck)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Corruption,
    CapacityExhausted,
    Recheck,
    InvariantViolation,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Corruption => "corruption",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::Recheck => "recheck",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Layout,
    Buffer,
    Projection,
    LocalReduction,
    GlobalReduction,
    Runtime,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Layout => "layout",
            Self::Buffer => "buffer",
            Self::Projection => "projection",
            Self::LocalReduction => "local_reduction",
            Self::GlobalReduction => "global_reduction",
            Self::Runtime => "runtime",
        };
        write!(f, "{label}")
    }
}
