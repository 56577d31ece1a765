//! Module: plan
//! Responsibility: the table-driven `PreAggFunctions` implementation for
//! GROUP BY with partial SUM/MIN/MAX/COUNT aggregates.
//! Does not own: stage scheduling or thread management.
//! Boundary: resolved against an input schema once, then shared read-only
//! by every kernel thread.


mod key;

use crate::{
    aggregate::{AggDatum, AggType, AggValue, AggregateOp, merge_into_cell},
    buffer::{AtomicDatum, ColumnMeta, ColumnType, TableBuffer},
    error::InternalError,
    job::{FieldRole, FieldRoleMap, ParamBuf},
    kernel::{KernelError, LookupTable, PreAggFunctions, data_load, data_move, data_store},
};
use std::{cmp::Ordering, fmt};

/// Row qualifier evaluated during projection.
pub type Qualifier = Box<dyn Fn(&TableBuffer, u32) -> bool + Send + Sync>;

///
/// ProjectionSource
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionSource {
    Column(usize),
    Constant(AggValue),
}

///
/// OutputColumn
///

#[derive(Clone, Debug, PartialEq)]
pub struct OutputColumn {
    pub meta: ColumnMeta,
    pub role: FieldRole,
    pub source: ProjectionSource,
    pub aggregate: Option<(AggregateOp, AggType)>,
}

///
/// GroupAggregatePlan
///
/// Compiled per-query dispatch table. A plan without grouping keys folds
/// every row into a single group.
///

pub struct GroupAggregatePlan {
    input: Vec<ColumnMeta>,
    columns: Vec<OutputColumn>,
    keys: Vec<(usize, ColumnType)>,
    qualifier: Option<Qualifier>,
}

impl GroupAggregatePlan {
    #[must_use]
    pub fn builder(input: Vec<ColumnMeta>) -> GroupAggregatePlanBuilder {
        GroupAggregatePlanBuilder::new(input)
    }

    #[must_use]
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    #[must_use]
    pub fn needs_grouping(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Parameter block carrying this plan's role map.
    #[must_use]
    pub fn param_buf(&self) -> ParamBuf {
        ParamBuf::new(&self.field_roles())
    }

    fn aggregate(&self, col: usize, row: u32) -> Result<(AggregateOp, AggType), KernelError> {
        self.columns
            .get(col)
            .and_then(|column| column.aggregate)
            .ok_or_else(|| {
                KernelError::corruption_at(format!("column {col} is not an aggregate"), col, row)
            })
    }
}

impl fmt::Debug for GroupAggregatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupAggregatePlan")
            .field("columns", &self.columns)
            .field("keys", &self.keys)
            .field("filtered", &self.qualifier.is_some())
            .finish_non_exhaustive()
    }
}

impl PreAggFunctions for GroupAggregatePlan {
    fn output_columns(&self, input: &[ColumnMeta]) -> Result<Vec<ColumnMeta>, InternalError> {
        if input != self.input.as_slice() {
            return Err(InternalError::config_unsupported(
                "input schema does not match the schema the plan was built for",
            ));
        }

        Ok(self
            .columns
            .iter()
            .map(|column| column.meta.clone())
            .collect())
    }

    fn field_roles(&self) -> FieldRoleMap {
        FieldRoleMap::new(self.columns.iter().map(|column| column.role).collect())
    }

    fn qualify(&self, input: &TableBuffer, row: u32) -> Result<bool, KernelError> {
        let Some(qualifier) = &self.qualifier else {
            return Ok(true);
        };

        Ok(qualifier(input, row))
    }

    fn project(
        &self,
        input: &TableBuffer,
        row: u32,
        dst: &TableBuffer,
        slot: u32,
    ) -> Result<(), KernelError> {
        for (col, column) in self.columns.iter().enumerate() {
            match column.source {
                ProjectionSource::Column(src_col) => {
                    data_move(dst, col, slot, input, src_col, row)?;
                }
                ProjectionSource::Constant(value) => {
                    data_store(dst, col, slot, Some(value.to_bits()))?;
                }
            }
        }

        Ok(())
    }

    fn hash(
        &self,
        lookup: &LookupTable<'_>,
        buf: &TableBuffer,
        row: u32,
    ) -> Result<u32, KernelError> {
        key::hash_key(lookup, buf, row, &self.keys)
    }

    fn keys_equal(&self, buf: &TableBuffer, a: u32, b: u32) -> Result<Ordering, KernelError> {
        key::compare_keys(buf, a, b, &self.keys)
    }

    fn merge_local(
        &self,
        col: usize,
        accum: &AtomicDatum,
        newval: &AggDatum,
    ) -> Result<(), KernelError> {
        let (op, ty) = self.aggregate(col, newval.group_id)?;

        merge_into_cell(op, ty, accum, newval.bits())
            .map_err(|err| KernelError::from_merge(col, newval.group_id, err))
    }

    fn merge_global(
        &self,
        col: usize,
        buf: &TableBuffer,
        accum_row: u32,
        newval_row: u32,
    ) -> Result<(), KernelError> {
        let (op, ty) = self.aggregate(col, newval_row)?;
        let newval = data_load(buf, col, newval_row)?;
        let Some(accum) = buf.cell(accum_row, col) else {
            return Err(KernelError::corruption_at(
                format!("owner row {accum_row} is outside the buffer"),
                col,
                accum_row,
            ));
        };

        merge_into_cell(op, ty, accum, newval)
            .map_err(|err| KernelError::from_merge(col, newval_row, err))
    }
}

// Columns as requested, resolved against the input schema by `build`.
#[derive(Clone, Debug)]
enum PendingColumn {
    Key(String),
    PassThrough(String),
    Aggregate(AggregateOp, String),
    Count,
}

///
/// GroupAggregatePlanBuilder
///

pub struct GroupAggregatePlanBuilder {
    input: Vec<ColumnMeta>,
    pending: Vec<PendingColumn>,
    qualifier: Option<Qualifier>,
}

impl GroupAggregatePlanBuilder {
    #[must_use]
    pub const fn new(input: Vec<ColumnMeta>) -> Self {
        Self {
            input,
            pending: Vec::new(),
            qualifier: None,
        }
    }

    #[must_use]
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.pending.push(PendingColumn::Key(column.into()));
        self
    }

    #[must_use]
    pub fn pass_through(mut self, column: impl Into<String>) -> Self {
        self.pending.push(PendingColumn::PassThrough(column.into()));
        self
    }

    #[must_use]
    pub fn aggregate(mut self, op: AggregateOp, column: impl Into<String>) -> Self {
        self.pending
            .push(PendingColumn::Aggregate(op, column.into()));
        self
    }

    /// Partial row count: a SUM over the constant 1.
    #[must_use]
    pub fn count(mut self) -> Self {
        self.pending.push(PendingColumn::Count);
        self
    }

    #[must_use]
    pub fn filter(
        mut self,
        qualifier: impl Fn(&TableBuffer, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.qualifier = Some(Box::new(qualifier));
        self
    }

    pub fn build(self) -> Result<GroupAggregatePlan, InternalError> {
        if self.pending.is_empty() {
            return Err(InternalError::config_unsupported("plan has no output columns"));
        }

        let mut columns = Vec::with_capacity(self.pending.len());
        for pending in &self.pending {
            columns.push(self.resolve(pending)?);
        }
        let keys = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.role == FieldRole::GroupKey)
            .map(|(col, column)| (col, column.meta.ty))
            .collect();

        Ok(GroupAggregatePlan {
            input: self.input,
            columns,
            keys,
            qualifier: self.qualifier,
        })
    }

    fn lookup(&self, name: &str) -> Result<(usize, &ColumnMeta), InternalError> {
        self.input
            .iter()
            .enumerate()
            .find(|(_, meta)| meta.name == name)
            .ok_or_else(|| {
                InternalError::config_unsupported(format!("unknown input column '{name}'"))
            })
    }

    fn resolve(&self, pending: &PendingColumn) -> Result<OutputColumn, InternalError> {
        let column = match pending {
            PendingColumn::Key(name) | PendingColumn::PassThrough(name) => {
                let (src, meta) = self.lookup(name)?;
                let role = if matches!(pending, PendingColumn::Key(_)) {
                    FieldRole::GroupKey
                } else {
                    FieldRole::Null
                };

                OutputColumn {
                    meta: meta.clone(),
                    role,
                    source: ProjectionSource::Column(src),
                    aggregate: None,
                }
            }
            PendingColumn::Aggregate(op, name) => {
                let (src, meta) = self.lookup(name)?;
                let ty = AggType::for_column(meta.ty).ok_or_else(|| {
                    InternalError::config_unsupported(format!(
                        "{op} is not defined over {} column '{name}'",
                        meta.ty
                    ))
                })?;

                OutputColumn {
                    meta: ColumnMeta::new(format!("{op}({name})"), meta.ty),
                    role: FieldRole::AggFunc,
                    source: ProjectionSource::Column(src),
                    aggregate: Some((*op, ty)),
                }
            }
            PendingColumn::Count => OutputColumn {
                meta: ColumnMeta::new("pcount", ColumnType::Int64),
                role: FieldRole::AggFunc,
                source: ProjectionSource::Constant(AggValue::Int64(1)),
                aggregate: Some((AggregateOp::Sum, AggType::Int64)),
            },
        };

        Ok(column)
    }
}
