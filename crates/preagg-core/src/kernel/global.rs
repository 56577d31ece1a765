use crate::{
    buffer::TableBuffer,
    job::{FieldRoleMap, RowMap, crc32::LOOKUP_TABLE_LEN},
    kernel::{ErrorSlot, KernelError, PreAggFunctions, SlotTable, StatusChannel, writeback_status},
    team::TeamContext,
};

///
/// GlobalPreparationArgs
///

#[derive(Clone, Copy, Debug)]
pub struct GlobalPreparationArgs<'a> {
    pub slots: &'a SlotTable,
    pub row_map: &'a RowMap,
}

/// Empty the global slot table and the row map before global reduction.
pub fn global_preparation(ctx: &TeamContext<'_>, args: &GlobalPreparationArgs<'_>) {
    if ctx.global_id() == 0 {
        args.row_map.reset();
    }
    args.slots.clear_strided(ctx.global_id(), ctx.global_size());
}

///
/// GlobalReductionArgs
///
/// Global reduction works in place: each group's owner row in `buf`
/// becomes its accumulator, and the row map lists the owner rows.
///

#[derive(Clone, Copy)]
pub struct GlobalReductionArgs<'a> {
    pub buf: &'a TableBuffer,
    pub slots: &'a SlotTable,
    pub row_map: &'a RowMap,
    pub functions: &'a dyn PreAggFunctions,
    pub roles: &'a FieldRoleMap,
    pub lookup_table: &'a [u32; LOOKUP_TABLE_LEN],
    pub status: &'a StatusChannel,
}

/// Merge every row of `buf` into the owner row of its key.
///
/// Owners are elected on the full-scope slot table; each owner records
/// its row in the row map once. Non-owners merge aggregate columns into
/// the owner row with atomic cell updates. Key and pass-through columns
/// are left as they are.
pub fn global_reduction(ctx: &TeamContext<'_>, args: &GlobalReductionArgs<'_>) {
    let mut errors = ErrorSlot::new();
    let GlobalReductionArgs {
        buf,
        slots,
        row_map,
        functions,
        ..
    } = *args;

    ctx.stage_lookup(args.lookup_table);

    let row = ctx.global_id();
    let hash = if row < buf.nitems() {
        errors.record(functions.hash(&ctx.lookup(), buf, row))
    } else {
        None
    };

    // owners are buffer rows
    let owner = hash.and_then(|hash| {
        errors.record(slots.claim(hash, row, |other| {
            functions
                .keys_equal(buf, row, other)
                .map(|ordering| ordering.is_eq())
        }))
    });
    ctx.barrier();

    let is_owner = owner == Some(row);
    let (offset, ngroups) = ctx.stairlike_add(u32::from(is_owner));
    let base = ctx.broadcast(|| match row_map.reserve(ngroups, buf.nrooms()) {
        Ok(base) => Some(base),
        Err(err) => {
            errors.set(KernelError::no_space("row map", err));
            None
        }
    });

    match (base, owner) {
        (Some(base), Some(_)) if is_owner => {
            if !row_map.set(base + offset, row) {
                errors.set(KernelError::corruption(format!(
                    "row map entry {} is out of range",
                    base + offset
                )));
            }
        }
        (Some(_), Some(owner)) => {
            for (col, role) in args.roles.iter().enumerate() {
                if role.is_aggregate() {
                    errors.record(functions.merge_global(col, buf, owner, row));
                }
            }
        }
        _ => {}
    }

    writeback_status(ctx, errors, args.status);
}
