//! Partial group-by aggregation over columnar batches: a lock-free hash
//! claim protocol, team-local then global reduction, and typed partial
//! aggregate merges, run on barrier-synchronized CPU thread teams.

// public exports are one module level down
pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod kernel;
pub mod obs;
pub mod plan;
pub mod team;

///
/// Prelude
///
/// Vocabulary for building inputs, plans, and jobs and reading results.
/// Kernel internals and team runtime types stay one level down.
///

pub mod prelude {
    pub use crate::{
        aggregate::AggregateOp,
        buffer::{ColumnMeta, ColumnType, Datum, TableBuffer, TableBufferBuilder},
        config::PreAggConfig,
        executor::{PreAggExecutor, PreAggOutput},
        job::{JobDescriptor, RowMap},
        kernel::{PreAggFunctions, StatusCode},
        plan::GroupAggregatePlan,
    };
}
