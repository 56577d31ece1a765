use crate::{
    buffer::{Datum, TableBuffer},
    error::{ErrorOrigin, InternalError},
    kernel::{KernelError, StatusCode},
};

///
/// JobFailure
///

#[derive(Clone, Debug)]
pub(super) struct JobFailure {
    pub(super) status: StatusCode,
    pub(super) origin: ErrorOrigin,
    pub(super) detail: Option<KernelError>,
}

///
/// PreAggOutput
///
/// Final status plus the last stage's buffer. On success the row map
/// names the buffer row holding each group's partial aggregates.
///

#[derive(Debug)]
pub struct PreAggOutput {
    status: StatusCode,
    origin: Option<ErrorOrigin>,
    detail: Option<KernelError>,
    buffer: TableBuffer,
    group_rows: Vec<u32>,
}

impl PreAggOutput {
    pub(super) const fn success(buffer: TableBuffer, group_rows: Vec<u32>) -> Self {
        Self {
            status: StatusCode::Success,
            origin: None,
            detail: None,
            buffer,
            group_rows,
        }
    }

    pub(super) fn failed(buffer: TableBuffer, failure: JobFailure) -> Self {
        Self {
            status: failure.status,
            origin: Some(failure.origin),
            detail: failure.detail,
            buffer,
            group_rows: Vec::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub const fn detail(&self) -> Option<&KernelError> {
        self.detail.as_ref()
    }

    /// Stage that left the non-success status.
    #[must_use]
    pub const fn failed_stage(&self) -> Option<ErrorOrigin> {
        self.origin
    }

    #[must_use]
    pub const fn buffer(&self) -> &TableBuffer {
        &self.buffer
    }

    /// Buffer rows holding one group each; empty unless the job succeeded.
    #[must_use]
    pub fn group_rows(&self) -> &[u32] {
        &self.group_rows
    }

    #[must_use]
    pub fn ngroups(&self) -> usize {
        self.group_rows.len()
    }

    /// One host row per group, in row-map order.
    ///
    /// A non-success status voids every row the job wrote, so it is
    /// returned as an error instead.
    pub fn groups(&self) -> Result<Vec<Vec<Datum>>, InternalError> {
        if let Some(origin) = self.origin
            && let Some(err) = InternalError::from_status(self.status, origin, self.detail.clone())
        {
            return Err(err);
        }

        self.group_rows
            .iter()
            .map(|row| self.buffer.row(*row))
            .collect()
    }
}
