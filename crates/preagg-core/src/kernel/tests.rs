use crate::{
    aggregate::{AggType, AggregateOp, MergeError},
    buffer::{ColumnMeta, ColumnType, Datum, TableBuffer, TableBufferBuilder, ToastArena},
    job::{JobDescriptor, RowMap, crc32::CRC32_TABLE},
    kernel::{
        ErrorSlot, GlobalPreparationArgs, GlobalReductionArgs, HashSlot, KernelError,
        LocalReductionArgs, LookupTable, PreAggFunctions, ProjectionArgs, SlotTable,
        StatusChannel, StatusCode, data_load, data_move, global_preparation, global_reduction,
        local_reduction, projection, writeback_status,
    },
    plan::GroupAggregatePlan,
    team::{NdRange, TeamContext, TeamLauncher},
};
use proptest::prelude::*;
use std::{
    sync::{Arc, atomic::AtomicU32},
    thread,
};

fn overflow() -> MergeError {
    MergeError::Overflow {
        op: AggregateOp::Sum,
        ty: AggType::Int32,
    }
}

fn schema() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("k", ColumnType::Text),
        ColumnMeta::new("v", ColumnType::Int64),
    ]
}

fn input(rows: &[(&str, i64)]) -> TableBuffer {
    TableBufferBuilder::new(schema())
        .rows(
            rows.iter()
                .map(|(k, v)| vec![Datum::Text((*k).to_string()), Datum::Int64(*v)]),
        )
        .build()
        .expect("input should build")
}

fn sum_plan() -> GroupAggregatePlan {
    GroupAggregatePlan::builder(schema())
        .group_by("k")
        .aggregate(AggregateOp::Sum, "v")
        .build()
        .expect("plan should build")
}

fn group(key: &str, total: i64) -> (String, i64) {
    (key.to_string(), total)
}

fn sorted_groups(buf: &TableBuffer, rows: impl IntoIterator<Item = u32>) -> Vec<(String, i64)> {
    let mut groups: Vec<_> = rows
        .into_iter()
        .map(|row| match buf.row(row).expect("row should decode").as_slice() {
            [Datum::Text(k), Datum::Int64(v)] => (k.clone(), *v),
            other => panic!("unexpected group row {other:?}"),
        })
        .collect();
    groups.sort();
    groups
}

//
// slots
//

#[test]
fn hash_slot_packs_hash_low_and_owner_high() {
    let slot = HashSlot::new(0xdead_beef, 7);

    assert_eq!(slot.pack(), (7u64 << 32) | 0xdead_beef);
    assert_eq!(HashSlot::unpack(slot.pack()), slot);
    assert!(HashSlot::unpack(HashSlot::EMPTY.pack()).is_empty());
    assert!(
        !HashSlot::new(0, 0).is_empty(),
        "hash 0 with a real owner is occupied"
    );
}

#[test]
fn claim_adopts_equal_keys_and_skips_hash_collisions() {
    let table = SlotTable::new(4);

    assert_eq!(
        table.claim(5, 0, |_| Ok(true)),
        Ok(0),
        "empty slot is claimed"
    );
    assert_eq!(
        table.claim(5, 1, |_| Ok(true)),
        Ok(0),
        "equal key adopts the owner"
    );
    assert_eq!(
        table.claim(5, 2, |_| Ok(false)),
        Ok(2),
        "different key with the same hash moves to the next slot"
    );
    assert_eq!(
        table.claim(5, 3, |owner| Ok(owner == 2)),
        Ok(2),
        "the scan continues until the matching owner"
    );
    assert_eq!(table.get(1), Some(HashSlot::new(5, 0)));
    assert_eq!(table.get(2), Some(HashSlot::new(5, 2)));
}

#[test]
fn claim_stops_after_one_full_cycle() {
    let table = SlotTable::new(2);
    table.claim(0, 0, |_| Ok(false)).expect("first claim fits");
    table.claim(1, 1, |_| Ok(false)).expect("second claim fits");

    let err = table
        .claim(2, 2, |_| Ok(false))
        .expect_err("a full table must not spin");

    assert_eq!(err.status(), StatusCode::DataStoreNoSpace);
}

#[test]
fn claim_propagates_key_comparison_failures() {
    let table = SlotTable::new(2);
    table.claim(9, 0, |_| Ok(false)).expect("first claim fits");

    let err = table
        .claim(9, 1, |_| Err(KernelError::corruption("bad key")))
        .expect_err("comparison failure must surface");

    assert_eq!(err.status(), StatusCode::DataStoreCorruption);
}

proptest! {
    #[test]
    fn concurrent_claims_elect_one_owner_per_key(keys in prop::collection::vec(0u8..16, 1..48)) {
        let table = SlotTable::new(2 * keys.len() as u32);
        // few distinct hashes force collisions between different keys
        let owners: Vec<u32> = thread::scope(|scope| {
            let handles: Vec<_> = keys
                .iter()
                .enumerate()
                .map(|(index, key)| {
                    let (table, keys) = (&table, &keys);
                    scope.spawn(move || {
                        table
                            .claim(u32::from(key % 3), index as u32, |owner| {
                                Ok(keys[owner as usize] == *key)
                            })
                            .expect("table holds twice the keys")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("claimant should not panic"))
                .collect()
        });

        for (index, owner) in owners.iter().enumerate() {
            prop_assert_eq!(
                keys[*owner as usize],
                keys[index],
                "owner holds the same key"
            );
            prop_assert_eq!(owners[*owner as usize], *owner, "owners own themselves");
        }
        let mut distinct_keys = keys.clone();
        distinct_keys.sort_unstable();
        distinct_keys.dedup();
        let mut distinct_owners = owners.clone();
        distinct_owners.sort_unstable();
        distinct_owners.dedup();
        prop_assert_eq!(distinct_owners.len(), distinct_keys.len());
    }
}

#[test]
fn strided_clear_touches_only_its_lane() {
    let table = SlotTable::new(4);
    for index in 0..4 {
        table
            .claim(index, index, |_| Ok(false))
            .expect("claim fits");
    }
    table.clear_strided(1, 2);

    let empty: Vec<bool> = (0..4)
        .map(|index| table.get(index).is_some_and(HashSlot::is_empty))
        .collect();
    assert_eq!(empty, [false, true, false, true]);
}

//
// status
//

#[test]
fn merge_overflow_maps_to_recheck_and_faults_to_corruption() {
    assert_eq!(
        KernelError::from_merge(2, 4, overflow()),
        KernelError::CpuRecheck {
            column: 2,
            source: overflow(),
        }
    );

    let err = KernelError::from_merge(
        1,
        3,
        MergeError::TypeMismatch {
            op: AggregateOp::Min,
            expected: AggType::Int32,
            found: AggType::Float32,
        },
    );
    assert!(matches!(
        err,
        KernelError::DataStoreCorruption {
            column: Some(1),
            row: Some(3),
            ..
        }
    ));
}

#[test]
fn unknown_status_codes_read_as_corruption() {
    assert_eq!(StatusCode::from_code(3), StatusCode::DataStoreNoSpace);
    assert_eq!(StatusCode::from_code(42), StatusCode::DataStoreCorruption);
    assert!(StatusCode::CpuRecheck.is_recoverable());
    assert!(!StatusCode::DataStoreNoSpace.is_recoverable());
}

#[test]
fn error_slot_keeps_first_error() {
    let mut slot = ErrorSlot::new();
    assert_eq!(slot.record(Ok::<_, KernelError>(3)), Some(3));
    assert!(!slot.is_set());

    assert_eq!(
        slot.record::<u32>(Err(KernelError::corruption("first"))),
        None
    );
    slot.set(KernelError::CpuRecheck {
        column: 0,
        source: overflow(),
    });

    assert_eq!(slot.into_inner(), Some(KernelError::corruption("first")));
}

#[test]
fn forwarding_a_quiet_channel_is_a_no_op() {
    let team = StatusChannel::new();
    let job = StatusChannel::new();

    assert!(!team.forward_to(&job));
    assert_eq!(job.code(), StatusCode::Success);

    team.raise(KernelError::corruption("lost key"));
    assert!(team.forward_to(&job));
    assert_eq!(job.code(), StatusCode::DataStoreCorruption);
}

#[test]
fn writeback_forwards_one_error_per_team() {
    let launcher = TeamLauncher::new(2).expect("launcher should build");
    let job = StatusChannel::new();
    let range = NdRange::for_items(16, 4).expect("range should be valid");

    launcher
        .launch(range, &|ctx: &TeamContext<'_>| {
            let mut slot = ErrorSlot::new();
            if ctx.global_id() == 6 {
                slot.set(KernelError::CpuRecheck {
                    column: 1,
                    source: overflow(),
                });
            }
            writeback_status(ctx, slot, &job);
        })
        .expect("launch should succeed");

    assert_eq!(job.code(), StatusCode::CpuRecheck);
}

//
// data
//

#[test]
fn data_move_checks_types_and_arenas() {
    let src = input(&[("alpha", 1)]);
    let shared = src.empty_like(1).expect("buffer should allocate");
    shared.reserve(1).expect("room should be free");

    data_move(&shared, 0, 0, &src, 0, 0).expect("same arena move succeeds");
    assert_eq!(
        shared.datum(0, 0).expect("cell"),
        Datum::Text("alpha".into())
    );

    let err = data_move(&shared, 0, 0, &src, 1, 0).expect_err("int8 into text must fail");
    assert_eq!(err.status(), StatusCode::DataStoreCorruption);

    let foreign = TableBuffer::empty(schema(), 1, Arc::new(ToastArena::new()))
        .expect("buffer should allocate");
    foreign.reserve(1).expect("room should be free");
    let err = data_move(&foreign, 0, 0, &src, 0, 0)
        .expect_err("a reference from another arena must not resolve");
    let KernelError::DataStoreCorruption { column, .. } = err else {
        panic!("expected corruption, got {err:?}");
    };
    assert_eq!(column, Some(0));
}

#[test]
fn data_load_rejects_rows_beyond_nitems() {
    let buf = TableBufferBuilder::new(schema())
        .row(vec![Datum::Null, Datum::Int64(1)])
        .nrooms(4)
        .build()
        .expect("buffer should build");

    assert_eq!(data_load(&buf, 0, 0), Ok(None));
    assert!(
        data_load(&buf, 1, 2).is_err(),
        "row 2 is a room, not a live item"
    );
}

#[test]
fn lookup_table_crc_matches_reference_check_value() {
    let entries: Vec<AtomicU32> = CRC32_TABLE
        .iter()
        .map(|entry| AtomicU32::new(*entry))
        .collect();
    let table = LookupTable::new(&entries);

    assert_eq!(!table.crc32_update(u32::MAX, b"123456789"), 0xcbf4_3926);
}

//
// stages
//

#[test]
fn projection_compacts_qualifying_rows() {
    let plan = GroupAggregatePlan::builder(schema())
        .group_by("k")
        .aggregate(AggregateOp::Sum, "v")
        .filter(|buf, row| buf.datum(row, 1).is_ok_and(|v| v != Datum::Int64(0)))
        .build()
        .expect("plan should build");
    let src = input(&[("a", 1), ("b", 0), ("a", 2), ("c", 0), ("c", 5)]);
    let dst = src
        .empty_with_columns(plan.output_columns(src.columns()).expect("columns"), 5)
        .expect("buffer should allocate");
    let row_map = RowMap::all_valid(0);
    let status = StatusChannel::new();
    let args = ProjectionArgs {
        input: &src,
        row_map: &row_map,
        dst: &dst,
        functions: &plan,
        status: &status,
    };

    TeamLauncher::new(2)
        .expect("launcher should build")
        .launch(NdRange::for_items(5, 2).expect("range"), &|ctx: &TeamContext<'_>| {
            projection(ctx, &args);
        })
        .expect("launch should succeed");

    assert_eq!(status.code(), StatusCode::Success);
    assert_eq!(
        sorted_groups(&dst, 0..dst.nitems()),
        vec![group("a", 1), group("a", 2), group("c", 5)]
    );
}

#[test]
fn projection_reports_destination_overflow() {
    let plan = sum_plan();
    let src = input(&[("a", 1), ("b", 2), ("c", 3)]);
    let dst = src
        .empty_with_columns(plan.output_columns(src.columns()).expect("columns"), 2)
        .expect("buffer should allocate");
    let row_map = RowMap::all_valid(0);
    let status = StatusChannel::new();
    let args = ProjectionArgs {
        input: &src,
        row_map: &row_map,
        dst: &dst,
        functions: &plan,
        status: &status,
    };

    TeamLauncher::new(1)
        .expect("launcher should build")
        .launch(NdRange::for_items(3, 4).expect("range"), &|ctx: &TeamContext<'_>| {
            projection(ctx, &args);
        })
        .expect("launch should succeed");

    assert_eq!(status.code(), StatusCode::DataStoreNoSpace);
    assert_eq!(dst.nitems(), 0, "a failed team reservation writes nothing");
}

#[test]
fn local_reduction_groups_within_each_team() {
    let plan = sum_plan();
    let roles = plan.field_roles();
    let src = input(&[
        ("a", 1),
        ("a", 2),
        ("b", 3),
        ("a", 4),
        ("b", 5),
        ("b", 6),
        ("c", 7),
    ]);
    let dst = src
        .empty_like(src.nitems())
        .expect("buffer should allocate");
    let status = StatusChannel::new();
    let args = LocalReductionArgs {
        src: &src,
        dst: &dst,
        functions: &plan,
        roles: &roles,
        lookup_table: &CRC32_TABLE,
        status: &status,
    };

    TeamLauncher::new(2)
        .expect("launcher should build")
        .launch(NdRange::for_items(7, 4).expect("range"), &|ctx: &TeamContext<'_>| {
            local_reduction(ctx, &args);
        })
        .expect("launch should succeed");

    assert_eq!(status.code(), StatusCode::Success);
    assert_eq!(
        sorted_groups(&dst, 0..dst.nitems()),
        vec![
            group("a", 7),
            group("b", 3),
            group("b", 11),
            group("c", 7),
        ],
        "team 0 holds rows 0..4, team 1 rows 4..7"
    );
}

#[test]
fn global_reduction_merges_in_place_and_lists_owners() {
    let plan = sum_plan();
    let roles = plan.field_roles();
    let buf = input(&[("x", 1), ("y", 2), ("x", 3), ("y", 4), ("z", 5), ("x", 6)]);
    let slots = SlotTable::new(16);
    let job = JobDescriptor::new(plan.param_buf(), RowMap::all_valid(buf.nitems()));
    let launcher = TeamLauncher::new(2).expect("launcher should build");

    let prep = GlobalPreparationArgs {
        slots: &slots,
        row_map: job.row_map(),
    };
    launcher
        .launch(NdRange::for_items(16, 4).expect("range"), &|ctx: &TeamContext<'_>| {
            global_preparation(ctx, &prep);
        })
        .expect("launch should succeed");
    assert_eq!(
        job.row_map().nvalids(),
        0,
        "preparation empties the row map"
    );

    let args = GlobalReductionArgs {
        buf: &buf,
        slots: &slots,
        row_map: job.row_map(),
        functions: &plan,
        roles: &roles,
        lookup_table: &CRC32_TABLE,
        status: job.status_channel(),
    };
    launcher
        .launch(NdRange::for_items(6, 2).expect("range"), &|ctx: &TeamContext<'_>| {
            global_reduction(ctx, &args);
        })
        .expect("launch should succeed");

    assert_eq!(job.status(), StatusCode::Success);
    let owners = job.row_map().snapshot().expect("explicit row map");
    assert_eq!(owners.len(), 3, "one owner row per distinct key");
    assert_eq!(
        sorted_groups(&buf, owners),
        vec![group("x", 10), group("y", 6), group("z", 5)]
    );
}

#[test]
fn global_reduction_overflow_requests_recheck() {
    let schema = vec![
        ColumnMeta::new("k", ColumnType::Int32),
        ColumnMeta::new("v", ColumnType::Int32),
    ];
    let plan = GroupAggregatePlan::builder(schema.clone())
        .group_by("k")
        .aggregate(AggregateOp::Sum, "v")
        .build()
        .expect("plan should build");
    let roles = plan.field_roles();
    let buf = TableBufferBuilder::new(schema)
        .row(vec![Datum::Int32(1), Datum::Int32(i32::MAX)])
        .row(vec![Datum::Int32(1), Datum::Int32(1)])
        .build()
        .expect("buffer should build");
    let slots = SlotTable::new(8);
    let row_map = RowMap::with_capacity(2);
    let status = StatusChannel::new();
    let args = GlobalReductionArgs {
        buf: &buf,
        slots: &slots,
        row_map: &row_map,
        functions: &plan,
        roles: &roles,
        lookup_table: &CRC32_TABLE,
        status: &status,
    };

    TeamLauncher::new(1)
        .expect("launcher should build")
        .launch(NdRange::for_items(2, 2).expect("range"), &|ctx: &TeamContext<'_>| {
            global_reduction(ctx, &args);
        })
        .expect("launch should succeed");

    assert_eq!(status.code(), StatusCode::CpuRecheck);
    assert!(matches!(
        status.detail(),
        Some(KernelError::CpuRecheck { column: 1, .. })
    ));
}
