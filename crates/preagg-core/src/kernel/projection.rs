use crate::{
    buffer::TableBuffer,
    job::RowMap,
    kernel::{ErrorSlot, KernelError, PreAggFunctions, StatusChannel, writeback_status},
    team::TeamContext,
};

///
/// ProjectionArgs
///

#[derive(Clone, Copy)]
pub struct ProjectionArgs<'a> {
    pub input: &'a TableBuffer,
    pub row_map: &'a RowMap,
    pub dst: &'a TableBuffer,
    pub functions: &'a dyn PreAggFunctions,
    pub status: &'a StatusChannel,
}

/// Filter and project input rows into `dst`.
///
/// Each member handles one row-map position. Surviving rows are counted
/// with a team prefix sum; the leader reserves the team's rows in one
/// step, and a failed reservation abandons the whole team.
pub fn projection(ctx: &TeamContext<'_>, args: &ProjectionArgs<'_>) {
    let mut errors = ErrorSlot::new();
    let nitems = args.input.nitems();

    let source = args
        .row_map
        .source_row(ctx.global_id(), nitems)
        .filter(|row| *row < nitems)
        .filter(|row| errors.record(args.functions.qualify(args.input, *row)) == Some(true));

    let (offset, survivors) = ctx.stairlike_add(u32::from(source.is_some()));
    let base = ctx.broadcast(|| match args.dst.reserve(survivors) {
        Ok(base) => Some(base),
        Err(err) => {
            errors.set(KernelError::no_space("projection destination", err));
            None
        }
    });

    if let (Some(base), Some(row)) = (base, source) {
        let projected = args
            .functions
            .project(args.input, row, args.dst, base + offset);
        errors.record(projected);
    }

    writeback_status(ctx, errors, args.status);
}
