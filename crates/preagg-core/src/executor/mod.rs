//! Module: executor
//! Responsibility: host-side orchestration of the reduction pipeline:
//! buffer allocation, stage launches, status inspection, and telemetry.
//! Does not own: per-thread kernel logic or merge arithmetic.
//! Boundary: every stage is launched through `TeamLauncher`; kernels report
//! only through the job status channel.


mod output;

pub use output::PreAggOutput;

use output::JobFailure;

use crate::{
    buffer::TableBuffer,
    config::PreAggConfig,
    error::{ErrorOrigin, InternalError},
    job::{FieldRoleMap, JobDescriptor},
    kernel::{
        GlobalPreparationArgs, GlobalReductionArgs, LocalReductionArgs, PreAggFunctions,
        ProjectionArgs, SlotTable, global_preparation, global_reduction, local_reduction,
        projection,
    },
    obs::sink::{MetricsEvent, Stage, StageSpan, record},
    team::{NdRange, TeamContext, TeamLauncher},
};

///
/// PreAggExecutor
///
/// Runs Projection, then the configured Local Reduction passes, then
/// Global Preparation and Global Reduction. Stops after the first stage
/// that leaves a non-success job status.
///

#[derive(Debug)]
pub struct PreAggExecutor {
    config: PreAggConfig,
    launcher: TeamLauncher,
}

impl PreAggExecutor {
    pub fn new(config: PreAggConfig) -> Result<Self, InternalError> {
        config.validate()?;
        let launcher = TeamLauncher::new(config.max_concurrent_teams)?;

        Ok(Self { config, launcher })
    }

    #[must_use]
    pub const fn config(&self) -> &PreAggConfig {
        &self.config
    }

    /// Run the full pipeline over `input`.
    pub fn execute(
        &self,
        job: &JobDescriptor,
        input: &TableBuffer,
        functions: &dyn PreAggFunctions,
    ) -> Result<PreAggOutput, InternalError> {
        record(MetricsEvent::JobStart);
        job.layout()?;

        let mut current = self.run_projection(job, input, functions)?;
        if let Some(failure) = failure(job, ErrorOrigin::Projection) {
            return Ok(PreAggOutput::failed(current, failure));
        }

        for _ in 0..self.config.local_passes {
            current = self.run_local_reduction(job, &current, functions)?;
            if let Some(failure) = failure(job, ErrorOrigin::LocalReduction) {
                return Ok(PreAggOutput::failed(current, failure));
            }
        }

        let slots = self.run_global_preparation(job, current.nitems())?;
        self.run_global_reduction(job, &current, &slots, functions)?;
        if let Some(failure) = failure(job, ErrorOrigin::GlobalReduction) {
            return Ok(PreAggOutput::failed(current, failure));
        }

        let rows = job.row_map().snapshot().unwrap_or_default();

        Ok(PreAggOutput::success(current, rows))
    }

    /// Filter and project `input` into a new working buffer sharing its
    /// out-of-line arena.
    pub fn run_projection(
        &self,
        job: &JobDescriptor,
        input: &TableBuffer,
        functions: &dyn PreAggFunctions,
    ) -> Result<TableBuffer, InternalError> {
        let columns = functions.output_columns(input.columns())?;
        let roles = job_roles(job, functions)?;
        roles.ensure_columns(columns.len())?;

        let scope = job.row_map().scope(input.nitems());
        let dst = input.empty_with_columns(columns, scope)?;
        let mut span = StageSpan::new(Stage::Projection, scope);

        let args = ProjectionArgs {
            input,
            row_map: job.row_map(),
            dst: &dst,
            functions,
            status: job.status_channel(),
        };
        let range = NdRange::for_items(scope, self.config.team_size)?;
        let kernel = |ctx: &TeamContext<'_>| projection(ctx, &args);
        self.launcher.launch(range, &kernel)?;
        span.set_rows_out(dst.nitems());

        Ok(dst)
    }

    /// One team-local reduction pass from `src` into a new buffer.
    pub fn run_local_reduction(
        &self,
        job: &JobDescriptor,
        src: &TableBuffer,
        functions: &dyn PreAggFunctions,
    ) -> Result<TableBuffer, InternalError> {
        let roles = job_roles(job, functions)?;
        roles.ensure_columns(src.ncols())?;

        let dst = src.empty_like(src.nitems())?;
        let mut span = StageSpan::new(Stage::LocalReduction, src.nitems());

        let args = LocalReductionArgs {
            src,
            dst: &dst,
            functions,
            roles: &roles,
            lookup_table: job.lookup_table(),
            status: job.status_channel(),
        };
        let range = NdRange::for_items(src.nitems(), self.config.team_size)?;
        let kernel = |ctx: &TeamContext<'_>| local_reduction(ctx, &args);
        self.launcher.launch(range, &kernel)?;
        span.set_rows_out(dst.nitems());

        Ok(dst)
    }

    /// Size and clear the global slot table, and empty the row map.
    pub fn run_global_preparation(
        &self,
        job: &JobDescriptor,
        rows: u32,
    ) -> Result<SlotTable, InternalError> {
        let (requested, size) = self.config.global_hash_size(job.hash_size(), rows);
        if size != requested {
            record(MetricsEvent::HashResize {
                from: requested,
                to: size,
            });
        }
        job.set_hash_size(size);

        let slots = SlotTable::new(size);
        let mut span = StageSpan::new(Stage::GlobalPreparation, size);

        let args = GlobalPreparationArgs {
            slots: &slots,
            row_map: job.row_map(),
        };
        let range = NdRange::for_items(size, self.config.team_size)?;
        let kernel = |ctx: &TeamContext<'_>| global_preparation(ctx, &args);
        self.launcher.launch(range, &kernel)?;
        span.set_rows_out(0);

        Ok(slots)
    }

    /// Merge every row of `buf` into its group's owner row, recording the
    /// owner rows in the job's row map.
    pub fn run_global_reduction(
        &self,
        job: &JobDescriptor,
        buf: &TableBuffer,
        slots: &SlotTable,
        functions: &dyn PreAggFunctions,
    ) -> Result<(), InternalError> {
        let roles = job_roles(job, functions)?;
        roles.ensure_columns(buf.ncols())?;

        let mut span = StageSpan::new(Stage::GlobalReduction, buf.nitems());

        let args = GlobalReductionArgs {
            buf,
            slots,
            row_map: job.row_map(),
            functions,
            roles: &roles,
            lookup_table: job.lookup_table(),
            status: job.status_channel(),
        };
        let range = NdRange::for_items(buf.nitems(), self.config.team_size)?;
        let kernel = |ctx: &TeamContext<'_>| global_reduction(ctx, &args);
        self.launcher.launch(range, &kernel)?;
        span.set_rows_out(u32::try_from(job.row_map().nvalids()).unwrap_or(0));

        Ok(())
    }
}

// Non-success status after a stage, reported once.
fn failure(job: &JobDescriptor, origin: ErrorOrigin) -> Option<JobFailure> {
    let status = job.status();
    if status.is_success() {
        return None;
    }
    record(MetricsEvent::StatusRaised { status });

    Some(JobFailure {
        status,
        origin,
        detail: job.status_detail().cloned(),
    })
}

// Role map from parameter 0, cross-checked against the functions.
fn job_roles(
    job: &JobDescriptor,
    functions: &dyn PreAggFunctions,
) -> Result<FieldRoleMap, InternalError> {
    let roles = job.params().field_roles()?;
    if roles != functions.field_roles() {
        return Err(InternalError::layout_corruption(
            "job role map disagrees with the functions it is executed with",
        ));
    }

    Ok(roles)
}
