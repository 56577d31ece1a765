//! Metrics sink boundary.
//!
//! Execution logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink, and only
//! from the coordinating thread; kernel threads never record.
use crate::{kernel::StatusCode, obs::metrics};
use derive_more::Display;
use std::{cell::RefCell, time::Instant};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn MetricsSink>> = RefCell::new(None);
}

///
/// Stage
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Stage {
    #[display("global_preparation")]
    GlobalPreparation,
    #[display("projection")]
    Projection,
    #[display("local_reduction")]
    LocalReduction,
    #[display("global_reduction")]
    GlobalReduction,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    JobStart,
    StageStart {
        stage: Stage,
    },
    StageFinish {
        stage: Stage,
        rows_in: u64,
        rows_out: u64,
        elapsed_micros: u64,
    },
    HashResize {
        from: u32,
        to: u32,
    },
    StatusRaised {
        status: StatusCode,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink that writes into the thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::JobStart => {
                metrics::with_state_mut(|m| m.ops.jobs = m.ops.jobs.saturating_add(1));
            }

            MetricsEvent::StageStart { stage } => {
                metrics::with_state_mut(|m| {
                    let entry = m.stages.entry(stage.to_string()).or_default();
                    entry.calls = entry.calls.saturating_add(1);
                });
            }

            MetricsEvent::StageFinish {
                stage,
                rows_in,
                rows_out,
                elapsed_micros,
            } => {
                metrics::with_state_mut(|m| {
                    let entry = m.stages.entry(stage.to_string()).or_default();
                    entry.rows_in = entry.rows_in.saturating_add(rows_in);
                    entry.rows_out = entry.rows_out.saturating_add(rows_out);
                    metrics::add_elapsed(
                        &mut entry.elapsed_micros_total,
                        &mut entry.elapsed_micros_max,
                        elapsed_micros,
                    );
                });
            }

            MetricsEvent::HashResize { to, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.hash_resizes = m.ops.hash_resizes.saturating_add(1);
                    m.ops.hash_size_max = m.ops.hash_size_max.max(u64::from(to));
                });
            }

            MetricsEvent::StatusRaised { status } => {
                metrics::with_state_mut(|m| {
                    if !status.is_success() {
                        m.ops.failed_statuses = m.ops.failed_statuses.saturating_add(1);
                    }
                    let entry = m.statuses.entry(status.to_string()).or_default();
                    *entry = entry.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // Preconditions:
        // - `ptr` was produced from a valid `&dyn MetricsSink` in `with_metrics_sink`.
        // - `with_metrics_sink` restores the previous pointer before returning,
        //   including unwind paths via `Guard::drop`.
        // - `record` is synchronous and never stores `ptr` beyond this call.
        //
        // Aliasing:
        // - Only a shared reference is materialized, matching the shared borrow
        //   used to install the override.
        unsafe { (&*ptr).record(event) };
    } else {
        GLOBAL_METRICS_SINK.record(event);
    }
}

/// Snapshot the current thread's metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: &dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // Preconditions:
    // - `sink_ptr` is installed only for this dynamic scope.
    // - `Guard` restores the previous slot on all exits, including panic.
    // - `record` only dereferences synchronously and never persists `sink_ptr`.
    //
    // What would break this:
    // - Any deferred use of `sink_ptr` beyond this scope.
    // - Any path that bypasses Guard restoration.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn MetricsSink, *const dyn MetricsSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}

/// StageSpan
/// RAII guard that emits start/finish events for one stage launch.
/// Finish accounting happens even on unwind.

pub(crate) struct StageSpan {
    stage: Stage,
    start: Instant,
    rows_in: u64,
    rows_out: u64,
}

impl StageSpan {
    #[must_use]
    pub(crate) fn new(stage: Stage, rows_in: u32) -> Self {
        record(MetricsEvent::StageStart { stage });

        Self {
            stage,
            start: Instant::now(),
            rows_in: u64::from(rows_in),
            rows_out: 0,
        }
    }

    pub(crate) const fn set_rows_out(&mut self, rows: u32) {
        self.rows_out = rows as u64;
    }
}

impl Drop for StageSpan {
    fn drop(&mut self) {
        let elapsed_micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);

        record(MetricsEvent::StageFinish {
            stage: self.stage,
            rows_in: self.rows_in,
            rows_out: self.rows_out,
            elapsed_micros,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::RefCell,
        panic::{AssertUnwindSafe, catch_unwind},
    };

    #[derive(Default)]
    struct CapturingSink {
        events: RefCell<Vec<MetricsEvent>>,
    }

    impl MetricsSink for CapturingSink {
        fn record(&self, event: MetricsEvent) {
            self.events.borrow_mut().push(event);
        }
    }

    #[test]
    fn with_metrics_sink_routes_and_restores_nested_overrides() {
        let outer = CapturingSink::default();
        let inner = CapturingSink::default();

        with_metrics_sink(&outer, || {
            record(MetricsEvent::JobStart);
            let resize = MetricsEvent::HashResize { from: 4, to: 16 };
            with_metrics_sink(&inner, || record(resize));
            record(MetricsEvent::JobStart);
        });

        assert_eq!(
            outer.events.borrow().len(),
            2,
            "outer sink sees its own scope only"
        );
        assert_eq!(
            inner.events.borrow().as_slice(),
            &[MetricsEvent::HashResize { from: 4, to: 16 }]
        );
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none(), "override must be cleared"));
    }

    #[test]
    fn with_metrics_sink_restores_override_on_panic() {
        let sink = CapturingSink::default();

        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(&sink, || {
                record(MetricsEvent::JobStart);
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();

        assert!(panicked);
        assert_eq!(sink.events.borrow().len(), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none(), "guard restores after unwind"));
    }

    #[test]
    fn stage_span_emits_finish_with_rows() {
        let sink = CapturingSink::default();

        with_metrics_sink(&sink, || {
            let mut span = StageSpan::new(Stage::Projection, 10);
            span.set_rows_out(7);
        });

        let events = sink.events.borrow();
        assert_eq!(
            events[0],
            MetricsEvent::StageStart {
                stage: Stage::Projection,
            }
        );
        match events[1] {
            MetricsEvent::StageFinish {
                stage,
                rows_in,
                rows_out,
                ..
            } => {
                assert_eq!(stage, Stage::Projection);
                assert_eq!((rows_in, rows_out), (10, 7));
            }
            other => panic!("expected StageFinish, got {other:?}"),
        }
    }

    #[test]
    fn global_sink_accumulates_stage_and_status_counters() {
        metrics_reset_all();

        record(MetricsEvent::JobStart);
        record(MetricsEvent::StageStart {
            stage: Stage::LocalReduction,
        });
        record(MetricsEvent::StageFinish {
            stage: Stage::LocalReduction,
            rows_in: 100,
            rows_out: 12,
            elapsed_micros: 40,
        });
        record(MetricsEvent::StatusRaised {
            status: StatusCode::CpuRecheck,
        });
        record(MetricsEvent::HashResize { from: 8, to: 64 });

        let counters = metrics_report().counters;
        assert_eq!(counters.ops.jobs, 1);
        assert_eq!(counters.ops.failed_statuses, 1);
        assert_eq!(counters.ops.hash_resizes, 1);
        assert_eq!(counters.ops.hash_size_max, 64);

        let stage = counters
            .stages
            .get("local_reduction")
            .expect("local reduction counters should be present");
        assert_eq!((stage.calls, stage.rows_in, stage.rows_out), (1, 100, 12));
        assert_eq!(stage.elapsed_micros_max, 40);
        assert_eq!(counters.statuses.get("cpu_recheck"), Some(&1));
    }
}
