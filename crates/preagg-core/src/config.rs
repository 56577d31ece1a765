//! Module: config
//! Responsibility: executor tuning knobs and their validation.
//! Does not own: per-job state (the descriptor carries the live hash size).
//! Boundary: validated once when the executor is built.

use crate::{error::InternalError, team::MAX_TEAM_SIZE};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, thread};

pub const DEFAULT_TEAM_SIZE: u32 = 64;
pub const DEFAULT_LOCAL_PASSES: u32 = 1;

/// Upper bound on chained local reduction passes.
pub const MAX_LOCAL_PASSES: u32 = 8;

///
/// PreAggConfig
///
/// Unknown fields are rejected; a misspelled knob is a configuration
/// error, not a silent default.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PreAggConfig {
    pub team_size: u32,
    pub max_concurrent_teams: usize,
    pub hash_size: Option<u32>,
    pub num_groups_estimate: Option<u32>,
    pub local_passes: u32,
}

impl PreAggConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            team_size: DEFAULT_TEAM_SIZE,
            max_concurrent_teams: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            hash_size: None,
            num_groups_estimate: None,
            local_passes: DEFAULT_LOCAL_PASSES,
        }
    }

    #[must_use]
    pub const fn with_team_size(mut self, team_size: u32) -> Self {
        self.team_size = team_size;
        self
    }

    #[must_use]
    pub const fn with_max_concurrent_teams(mut self, teams: usize) -> Self {
        self.max_concurrent_teams = teams;
        self
    }

    #[must_use]
    pub const fn with_hash_size(mut self, hash_size: u32) -> Self {
        self.hash_size = Some(hash_size);
        self
    }

    #[must_use]
    pub const fn with_num_groups_estimate(mut self, estimate: u32) -> Self {
        self.num_groups_estimate = Some(estimate);
        self
    }

    #[must_use]
    pub const fn with_local_passes(mut self, passes: u32) -> Self {
        self.local_passes = passes;
        self
    }

    pub fn validate(&self) -> Result<(), InternalError> {
        if self.team_size == 0 || self.team_size > MAX_TEAM_SIZE {
            return Err(InternalError::config_unsupported(format!(
                "team_size {} is outside 1..={MAX_TEAM_SIZE}",
                self.team_size
            )));
        }
        if self.max_concurrent_teams == 0 {
            return Err(InternalError::config_unsupported(
                "max_concurrent_teams must be at least 1",
            ));
        }
        if self.hash_size == Some(0) {
            return Err(InternalError::config_unsupported(
                "hash_size must be at least 1 when set",
            ));
        }
        if self.local_passes > MAX_LOCAL_PASSES {
            return Err(InternalError::config_unsupported(format!(
                "local_passes {} exceeds {MAX_LOCAL_PASSES}",
                self.local_passes
            )));
        }

        Ok(())
    }

    /// Global slot count for a job whose own hash size is `job_hash_size`
    /// (zero when unset) over `rows` rows in scope.
    ///
    /// Returns (requested, effective); they differ when the requested size
    /// did not exceed the row count and had to grow.
    #[must_use]
    pub fn global_hash_size(&self, job_hash_size: u32, rows: u32) -> (u32, u32) {
        let requested = match (job_hash_size, self.hash_size) {
            (0, Some(configured)) => configured,
            (0, None) => self
                .num_groups_estimate
                .unwrap_or(0)
                .max(rows)
                .saturating_mul(2),
            (job, _) => job,
        }
        .max(1);

        if requested > rows {
            (requested, requested)
        } else {
            (requested, rows.saturating_mul(2).max(1))
        }
    }
}

impl Default for PreAggConfig {
    fn default() -> Self {
        Self::new()
    }
}

///
/// TESTS
///
