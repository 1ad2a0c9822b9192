#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use fc_dispatch::device::{Capability, DeviceId, DeviceQuery};
use fc_dispatch::ops::dispatch::{ForwardState, GradientState, TypedExecutor};
use fc_dispatch::plan::{ForwardPlan, GradientPlan, WeightLayout};
use log::{Level, LevelFilter, Log, Metadata, Record};

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps log records per thread so parallel tests do not see each other.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.with(|r| {
            r.borrow_mut()
                .push((record.level(), record.args().to_string()));
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

/// Installs the capturing logger and clears this thread's records.
pub fn capture_logs() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });
    RECORDS.with(|r| r.borrow_mut().clear());
}

/// Number of FP32 fallback notices logged on this thread.
pub fn fallback_notices() -> usize {
    RECORDS.with(|r| {
        r.borrow()
            .iter()
            .filter(|(level, msg)| *level == Level::Info && msg.contains("falling back to FP32"))
            .count()
    })
}

/// Reports a fixed level and counts how often it was asked.
#[derive(Debug, Default)]
pub struct CountingDevice {
    pub level: u32,
    queries: AtomicUsize,
}

impl CountingDevice {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl DeviceQuery for CountingDevice {
    fn capability_of(&self, _device: DeviceId) -> Capability {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Capability::new(self.level)
    }
}

/// Records every plan it receives and returns a fixed result.
#[derive(Debug, Default)]
pub struct SpyExecutor {
    pub result: bool,
    pub forward_plans: Vec<(ForwardPlan, WeightLayout)>,
    pub gradient_plans: Vec<(GradientPlan, WeightLayout)>,
}

impl SpyExecutor {
    pub fn returning(result: bool) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.forward_plans.len() + self.gradient_plans.len()
    }
}

impl TypedExecutor for SpyExecutor {
    fn forward(
        &mut self,
        plan: ForwardPlan,
        layout: WeightLayout,
        _state: &mut ForwardState<'_>,
    ) -> bool {
        self.forward_plans.push((plan, layout));
        self.result
    }

    fn gradient(
        &mut self,
        plan: GradientPlan,
        layout: WeightLayout,
        _state: &mut GradientState<'_>,
    ) -> bool {
        self.gradient_plans.push((plan, layout));
        self.result
    }
}
