use crate::{
    aggregate::{
        AggDatum, AggType, AggValue, AggregateOp, MergeError, merge_datum, merge_into_cell,
        merge_values, numeric::PackedNumeric,
    },
    buffer::AtomicDatum,
};
use rust_decimal::Decimal;
use std::{str::FromStr, thread};

fn fold_i32(op: AggregateOp, values: &[Option<i32>]) -> (Option<i32>, bool) {
    let mut accum = AggDatum::null(AggType::Int32);
    let mut overflow = false;
    for value in values {
        let newval = AggDatum::from_bits(
            AggType::Int32,
            value.map(|v| AggValue::Int32(v).to_bits()),
        );
        match merge_datum(op, &mut accum, &newval) {
            Ok(()) => {}
            Err(MergeError::Overflow { .. }) => overflow = true,
            Err(err) => panic!("unexpected merge error: {err}"),
        }
    }
    let value = match (accum.isnull, accum.value) {
        (false, AggValue::Int32(v)) => Some(v),
        (true, _) => None,
        (false, other) => panic!("running total changed type: {other:?}"),
    };

    (value, overflow)
}

fn decimal(text: &str) -> PackedNumeric {
    PackedNumeric::encode(Decimal::from_str(text).expect("test decimal should parse"))
        .expect("test decimal should pack")
}

#[test]
fn sum_skips_nulls_and_stays_non_null() {
    assert_eq!(
        fold_i32(AggregateOp::Sum, &[Some(5), None, Some(3)]),
        (Some(8), false),
        "SUM over [5, null, 3] must be a non-null 8"
    );
}

#[test]
fn sum_of_only_nulls_is_null() {
    let (value, overflow) = fold_i32(AggregateOp::Sum, &[None, None]);

    assert_eq!(value, None, "SUM over [null, null] must keep the null flag");
    assert!(!overflow);
}

#[test]
fn min_and_max_ignore_nulls() {
    let values = [Some(7), Some(2), None, Some(9)];

    assert_eq!(fold_i32(AggregateOp::Min, &values), (Some(2), false));
    assert_eq!(fold_i32(AggregateOp::Max, &values), (Some(9), false));
}

#[test]
fn min_adopts_first_value_after_null_accumulator() {
    assert_eq!(
        fold_i32(AggregateOp::Min, &[None, Some(-4)]),
        (Some(-4), false)
    );
}

#[test]
fn integer_sum_overflow_is_recoverable() {
    let (_, overflow) = fold_i32(AggregateOp::Sum, &[Some(i32::MAX), Some(1)]);

    assert!(overflow, "INT_MAX + 1 must raise the overflow signal");
}

#[test]
fn negative_overflow_is_detected_for_every_width() {
    let merged = merge_values(
        AggregateOp::Sum,
        Some(AggValue::Int16(i16::MIN)),
        Some(AggValue::Int16(-1)),
    )
    .expect("int2 merge should not fail");
    assert!(merged.overflow);

    let merged = merge_values(
        AggregateOp::Sum,
        Some(AggValue::Int64(i64::MAX)),
        Some(AggValue::Int64(-1)),
    )
    .expect("int8 merge should not fail");
    assert!(!merged.overflow, "mixed-sign operands never overflow");
    assert_eq!(merged.value, Some(AggValue::Int64(i64::MAX - 1)));
}

#[test]
fn float_sum_flags_transition_to_infinity_only() {
    let merged = merge_values(
        AggregateOp::Sum,
        Some(AggValue::Float64(f64::MAX)),
        Some(AggValue::Float64(f64::MAX)),
    )
    .expect("float merge should not fail");
    assert!(
        merged.overflow,
        "finite + finite reaching infinity is an overflow"
    );

    let merged = merge_values(
        AggregateOp::Sum,
        Some(AggValue::Float32(f32::INFINITY)),
        Some(AggValue::Float32(1.0)),
    )
    .expect("float merge should not fail");
    assert!(
        !merged.overflow,
        "an infinite operand is not a new overflow"
    );
}

#[test]
fn numeric_sum_and_extrema_use_decimal_paths() {
    let merged = merge_values(
        AggregateOp::Sum,
        Some(AggValue::Numeric(decimal("1.25"))),
        Some(AggValue::Numeric(decimal("2.5"))),
    )
    .expect("numeric sum should succeed");
    let Some(AggValue::Numeric(sum)) = merged.value else {
        panic!("numeric sum should stay numeric");
    };
    assert_eq!(sum.decode(), Decimal::from_str("3.75").ok());

    let merged = merge_values(
        AggregateOp::Max,
        Some(AggValue::Numeric(decimal("10.0"))),
        Some(AggValue::Numeric(decimal("9.99"))),
    )
    .expect("numeric max should succeed");
    assert_eq!(merged.value, Some(AggValue::Numeric(decimal("10.0"))));
}

#[test]
fn numeric_sum_overflow_keeps_previous_total() {
    let big = decimal("36028797018963967");
    let merged = merge_values(
        AggregateOp::Sum,
        Some(AggValue::Numeric(big)),
        Some(AggValue::Numeric(big)),
    )
    .expect("numeric overflow is reported, not failed");

    assert!(merged.overflow);
    assert_eq!(merged.value, Some(AggValue::Numeric(big)));
}

#[test]
fn corrupt_numeric_operand_is_rejected() {
    let corrupt = PackedNumeric::from_bits(u64::MAX);
    let err = merge_values(
        AggregateOp::Min,
        Some(AggValue::Numeric(decimal("1"))),
        Some(AggValue::Numeric(corrupt)),
    )
    .expect_err("a scale byte above the limit is corrupt");

    assert!(matches!(err, MergeError::Corrupt { .. }));
}

#[test]
fn mismatched_types_are_rejected() {
    let mut accum = AggDatum::new(AggValue::Int32(1));
    let newval = AggDatum::new(AggValue::Int64(1));
    let err = merge_datum(AggregateOp::Sum, &mut accum, &newval)
        .expect_err("int4 and int8 running totals must not mix");

    assert_eq!(
        err,
        MergeError::TypeMismatch {
            op: AggregateOp::Sum,
            expected: AggType::Int32,
            found: AggType::Int64,
        }
    );
}

#[test]
fn narrow_values_round_trip_through_words() {
    for value in [
        AggValue::Int16(-3),
        AggValue::Int32(i32::MIN),
        AggValue::Float32(-0.5),
    ] {
        assert_eq!(AggValue::from_bits(value.ty(), value.to_bits()), value);
    }
}

#[test]
fn concurrent_cell_merges_lose_no_updates() {
    let cell = AtomicDatum::null();
    let threads = 8;
    let per_thread = 500;

    thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                for _ in 0..per_thread {
                    merge_into_cell(
                        AggregateOp::Sum,
                        AggType::Int64,
                        &cell,
                        Some(AggValue::Int64(1).to_bits()),
                    )
                    .expect("sum of ones must not overflow");
                }
            });
        }
    });

    assert_eq!(
        cell.load()
            .map(|bits| AggValue::from_bits(AggType::Int64, bits)),
        Some(AggValue::Int64(threads * per_thread))
    );
}

#[test]
fn cell_merge_reports_overflow() {
    let cell = AtomicDatum::new(Some(AggValue::Int32(i32::MAX).to_bits()));
    let err = merge_into_cell(
        AggregateOp::Sum,
        AggType::Int32,
        &cell,
        Some(AggValue::Int32(1).to_bits()),
    )
    .expect_err("INT_MAX + 1 must overflow");

    assert_eq!(
        err,
        MergeError::Overflow {
            op: AggregateOp::Sum,
            ty: AggType::Int32,
        }
    );
}

#[test]
fn null_operand_leaves_cell_untouched() {
    let cell = AtomicDatum::null();
    merge_into_cell(AggregateOp::Max, AggType::Int16, &cell, None)
        .expect("null operands are ignored");

    assert!(cell.is_null());
}

#[test]
fn float_extrema_rank_nan_above_every_value() {
    let nan = Some(AggValue::Float64(f64::NAN));
    let negative_nan = Some(AggValue::Float64(-f64::NAN));
    let one = Some(AggValue::Float64(1.0));
    let bits = |op, x, y| {
        merge_values(op, x, y)
            .expect("same-type merge")
            .value
            .map(AggValue::to_bits)
    };

    for (x, y) in [
        (nan, one),
        (one, nan),
        (negative_nan, one),
        (one, negative_nan),
    ] {
        assert_eq!(bits(AggregateOp::Min, x, y), one.map(AggValue::to_bits));
        assert_eq!(
            bits(AggregateOp::Max, x, y),
            Some(AggValue::Float64(f64::NAN).to_bits())
        );
    }
    assert_eq!(
        bits(AggregateOp::Max, nan, negative_nan),
        bits(AggregateOp::Max, negative_nan, nan),
        "every NaN payload collapses to one value"
    );
}

#[test]
fn float32_extrema_keep_infinity_below_nan() {
    let inf = Some(AggValue::Float32(f32::INFINITY));
    let nan = Some(AggValue::Float32(f32::NAN));

    let max = merge_values(AggregateOp::Max, inf, nan).expect("same-type merge");
    assert!(matches!(max.value, Some(AggValue::Float32(value)) if value.is_nan()));

    let min = merge_values(AggregateOp::Min, nan, inf).expect("same-type merge");
    assert_eq!(min.value, inf);
}
