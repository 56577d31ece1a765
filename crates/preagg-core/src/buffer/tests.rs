use crate::{
    buffer::{
        ColumnMeta, ColumnType, ColumnWidth, Datum, TableBuffer, TableBufferBuilder, ToastArena,
        ToastRef,
    },
    error::ErrorClass,
};
use rust_decimal::Decimal;
use std::{
    str::FromStr,
    sync::{Arc, atomic::AtomicU32},
    thread,
};

fn schema() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("k", ColumnType::Text),
        ColumnMeta::new("v", ColumnType::Int32),
        ColumnMeta::new("d", ColumnType::Numeric),
    ]
}

#[test]
fn builder_round_trips_rows() {
    let rows = vec![
        vec![
            Datum::Text("a".into()),
            Datum::Int32(7),
            Datum::Numeric(Decimal::from_str("1.50").expect("decimal")),
        ],
        vec![Datum::Null, Datum::Null, Datum::Null],
    ];
    let buffer = TableBufferBuilder::new(schema())
        .rows(rows.clone())
        .nrooms(4)
        .build()
        .expect("buffer should build");

    assert_eq!(buffer.nitems(), 2);
    assert_eq!(buffer.nrooms(), 4);
    assert_eq!(buffer.rows().expect("rows should decode"), rows);
}

#[test]
fn builder_rejects_type_mismatch() {
    let err = TableBufferBuilder::new(schema())
        .row(vec![Datum::Int32(1), Datum::Int32(1), Datum::Null])
        .build()
        .expect_err("int value in a text column must be rejected");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn builder_rejects_rows_beyond_rooms() {
    let err = TableBufferBuilder::new(vec![ColumnMeta::new("v", ColumnType::Int64)])
        .rows((0..3).map(|v| vec![Datum::Int64(v)]))
        .nrooms(2)
        .build()
        .expect_err("three rows cannot fit two rooms");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn column_widths_follow_types() {
    assert_eq!(ColumnType::Int16.width(), ColumnWidth::Fixed(2));
    assert_eq!(ColumnType::Float32.width(), ColumnWidth::Fixed(4));
    assert_eq!(ColumnType::Numeric.width(), ColumnWidth::Fixed(8));
    assert_eq!(ColumnType::Text.width(), ColumnWidth::VarLen);
}

#[test]
fn failed_reservation_leaves_nitems_unchanged() {
    let buffer = TableBuffer::empty(
        vec![ColumnMeta::new("v", ColumnType::Int32)],
        5,
        Arc::new(ToastArena::new()),
    )
    .expect("buffer should allocate");

    assert_eq!(buffer.reserve(3), Ok(0));
    let err = buffer.reserve(3).expect_err("3 + 3 rows exceed 5 rooms");

    assert_eq!((err.requested, err.used, err.capacity), (3, 3, 5));
    assert_eq!(
        buffer.nitems(),
        3,
        "no partial credit for a failed reservation"
    );
    assert_eq!(
        buffer.reserve(2),
        Ok(3),
        "the remaining rooms are still available"
    );
}

#[test]
fn concurrent_reservations_never_overshoot() {
    let counter = AtomicU32::new(0);
    let granted = AtomicU32::new(0);

    thread::scope(|scope| {
        for _ in 0..16 {
            scope.spawn(|| {
                for _ in 0..10 {
                    if super::reserve_rooms(&counter, 3, 100).is_ok() {
                        granted.fetch_add(3, std::sync::atomic::Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let used = counter.load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(used, 99, "33 grants of 3 fit 100 rooms");
    assert_eq!(granted.load(std::sync::atomic::Ordering::Relaxed), used);
}

#[test]
fn cells_outside_rooms_are_unreachable() {
    let buffer = TableBufferBuilder::new(vec![ColumnMeta::new("v", ColumnType::Int16)])
        .row(vec![Datum::Int16(1)])
        .build()
        .expect("buffer should build");

    assert!(buffer.cell(0, 0).is_some());
    assert!(buffer.cell(1, 0).is_none());
    assert!(buffer.cell(0, 1).is_none());
    assert_eq!(
        buffer.datum(3, 0).expect_err("outside the buffer").class,
        ErrorClass::InvariantViolation
    );
}

#[test]
fn derived_buffers_share_the_arena() {
    let source = TableBufferBuilder::new(schema())
        .build()
        .expect("buffer should build");
    let like = source.empty_like(8).expect("buffer should allocate");
    let other = source
        .empty_with_columns(vec![ColumnMeta::new("x", ColumnType::Int64)], 2)
        .expect("buffer should allocate");

    assert!(like.shares_toast_with(&source));
    assert!(other.shares_toast_with(&source));
    assert_eq!(like.nrooms(), 8);
    assert_eq!(like.nitems(), 0);
}

#[test]
fn toast_refs_resolve_only_inside_the_arena() {
    let mut arena = ToastArena::new();
    let hello = arena.push("hello").expect("push should fit");
    let world = arena.push("world").expect("push should fit");

    assert_eq!(arena.get(hello), Some("hello"));
    assert_eq!(
        arena.get(ToastRef::from_bits(world.to_bits())),
        Some("world")
    );
    assert!(!arena.contains(ToastRef { offset: 8, len: 4 }));
    assert_eq!(arena.len(), 10);
}
