use crate::{
    buffer::TableBuffer,
    job::{FieldRoleMap, crc32::LOOKUP_TABLE_LEN},
    kernel::{
        ErrorSlot, KernelError, PreAggFunctions, StatusChannel,
        data::{data_load_agg, data_move, data_store},
        writeback_status,
    },
    team::TeamContext,
};

///
/// LocalReductionArgs
///

#[derive(Clone, Copy)]
pub struct LocalReductionArgs<'a> {
    pub src: &'a TableBuffer,
    pub dst: &'a TableBuffer,
    pub functions: &'a dyn PreAggFunctions,
    pub roles: &'a FieldRoleMap,
    pub lookup_table: &'a [u32; LOOKUP_TABLE_LEN],
    pub status: &'a StatusChannel,
}

/// Reduce each team's rows to one row per distinct key.
///
/// Phases, each closed by a barrier: stage lookup table, clear team slots,
/// claim owners, reserve destination rows, then per column load, merge
/// into the owner's accumulator, and store.
pub fn local_reduction(ctx: &TeamContext<'_>, args: &LocalReductionArgs<'_>) {
    let mut errors = ErrorSlot::new();
    let LocalReductionArgs {
        src,
        dst,
        functions,
        ..
    } = *args;

    ctx.stage_lookup(args.lookup_table);

    let row = ctx.global_id();
    let live = row < src.nitems();
    let hash = if live {
        errors.record(functions.hash(&ctx.lookup(), src, row))
    } else {
        None
    };

    let slots = &ctx.shared().local_slots;
    slots.clear_by_team(ctx);

    // owners are team-local ids
    let owner = hash.and_then(|hash| {
        errors.record(slots.claim(hash, ctx.local_id(), |buddy| {
            functions
                .keys_equal(src, row, ctx.teammate_global_id(buddy))
                .map(|ordering| ordering.is_eq())
        }))
    });
    ctx.barrier();

    let is_owner = owner == Some(ctx.local_id());
    let (offset, ngroups) = ctx.stairlike_add(u32::from(is_owner));
    let base = ctx.broadcast(|| match dst.reserve(ngroups) {
        Ok(base) => Some(base),
        Err(err) => {
            errors.set(KernelError::no_space("local reduction destination", err));
            None
        }
    });

    // `base` is team-uniform, so every member takes the same branch
    if let Some(base) = base {
        let dest = base + offset;
        for (col, role) in args.roles.iter().enumerate() {
            if !role.is_aggregate() {
                if is_owner {
                    errors.record(data_move(dst, col, dest, src, col, row));
                }
                continue;
            }
            reduce_column(ctx, args, &mut errors, col, owner, dest);
        }
    }

    writeback_status(ctx, errors, args.status);
}

// One load/merge/store cycle for an aggregate column.
fn reduce_column(
    ctx: &TeamContext<'_>,
    args: &LocalReductionArgs<'_>,
    errors: &mut ErrorSlot,
    col: usize,
    owner: Option<u32>,
    dest: u32,
) {
    let row = ctx.global_id();
    let mine = ctx.accumulator(ctx.local_id());
    let datum = if row < args.src.nitems() && owner.is_some() {
        errors.record(data_load_agg(args.src, col, row))
    } else {
        None
    };
    if let Some(cell) = mine {
        cell.store(datum.and_then(|datum| datum.bits()));
    }
    ctx.barrier();

    let is_owner = owner == Some(ctx.local_id());
    if let (false, Some(owner), Some(datum)) = (is_owner, owner, datum) {
        let datum = datum.with_group(owner);
        let merged = ctx.accumulator(owner).map_or_else(
            || {
                Err(KernelError::corruption_at(
                    format!("owner {owner} has no accumulator"),
                    col,
                    row,
                ))
            },
            |cell| args.functions.merge_local(col, cell, &datum),
        );
        errors.record(merged);
    }
    ctx.barrier();

    if is_owner && let Some(cell) = mine {
        errors.record(data_store(args.dst, col, dest, cell.load()));
    }
    ctx.barrier();
}
