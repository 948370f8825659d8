//! Per-second countdown timers.
//!
//! Each running countdown is an owned [`CountdownHandle`]; dropping the handle
//! aborts its task. [`Countdowns`] keeps at most one handle per
//! [`CountdownKind`] and cancels the previous one before starting another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info};

const SECONDS_PER_DAY: i64 = 86_400;
const MAX_SILENT_STEP: Duration = Duration::from_secs(60);

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountdownKind {
    ShabbatCandles,
    NextHoliday,
    /// Wakes the dashboard when the day rolls over; never displayed.
    DayRollover,
}

impl CountdownKind {
    /// Silent kinds emit only [`CountdownTick::RefreshDue`].
    pub fn is_silent(self) -> bool {
        matches!(self, CountdownKind::DayRollover)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownTick {
    Remaining(String),
    /// The target was reached; show the terminal label.
    Elapsed,
    /// Sent once after the refresh delay that follows [`CountdownTick::Elapsed`].
    RefreshDue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownFrame {
    pub kind: CountdownKind,
    /// Identifies which start of this kind produced the frame.
    pub generation: u64,
    pub tick: CountdownTick,
}

/// `DD:HH:MM` above 24 hours, `HH:MM:SS` otherwise.
pub fn format_remaining(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds > SECONDS_PER_DAY {
        let days = seconds / SECONDS_PER_DAY;
        let hours = (seconds % SECONDS_PER_DAY) / 3_600;
        let minutes = (seconds % 3_600) / 60;
        format!("{days:02}:{hours:02}:{minutes:02}")
    } else {
        let hours = seconds / 3_600;
        let minutes = (seconds % 3_600) / 60;
        let secs = seconds % 60;
        format!("{hours:02}:{minutes:02}:{secs:02}")
    }
}

#[derive(Debug)]
pub struct CountdownHandle {
    kind: CountdownKind,
    generation: u64,
    target: DateTime<Utc>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn kind(&self) -> CountdownKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Countdowns {
    clock: Arc<dyn Clock>,
    sink: mpsc::UnboundedSender<CountdownFrame>,
    refresh_delay: Duration,
    active: HashMap<CountdownKind, CountdownHandle>,
    next_generation: u64,
}

impl Countdowns {
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: mpsc::UnboundedSender<CountdownFrame>,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            clock,
            sink,
            refresh_delay,
            active: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Starts a countdown, replacing any running countdown of the same kind.
    ///
    /// Must be called from within a tokio runtime. Returns the generation
    /// stamped on every frame of the new countdown.
    pub fn start(&mut self, kind: CountdownKind, target: DateTime<Utc>) -> u64 {
        self.cancel(kind);
        self.next_generation += 1;
        let generation = self.next_generation;

        let task = tokio::spawn(run_countdown(
            kind,
            generation,
            target,
            self.clock.clone(),
            self.sink.clone(),
            self.refresh_delay,
        ));
        info!(?kind, generation, until = %target, "Countdown started");

        self.active.insert(
            kind,
            CountdownHandle {
                kind,
                generation,
                target,
                task,
            },
        );
        generation
    }

    /// Keeps a running countdown when the target is unchanged, otherwise restarts it.
    pub fn ensure(&mut self, kind: CountdownKind, target: DateTime<Utc>) -> u64 {
        match self.active.get(&kind) {
            Some(handle) if handle.target == target && handle.is_running() => handle.generation,
            _ => self.start(kind, target),
        }
    }

    pub fn cancel(&mut self, kind: CountdownKind) -> bool {
        match self.active.remove(&kind) {
            Some(handle) => {
                debug!(?kind, generation = handle.generation, "Countdown cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.active.clear();
    }

    pub fn is_active(&self, kind: CountdownKind) -> bool {
        self.active
            .get(&kind)
            .is_some_and(CountdownHandle::is_running)
    }

    pub fn handle(&self, kind: CountdownKind) -> Option<&CountdownHandle> {
        self.active.get(&kind)
    }

    /// Frames from a cancelled or replaced countdown may still be queued.
    pub fn is_current(&self, frame: &CountdownFrame) -> bool {
        self.active
            .get(&frame.kind)
            .is_some_and(|handle| handle.generation == frame.generation)
    }
}

async fn run_countdown(
    kind: CountdownKind,
    generation: u64,
    target: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    sink: mpsc::UnboundedSender<CountdownFrame>,
    refresh_delay: Duration,
) {
    let emit = |tick: CountdownTick| {
        sink.send(CountdownFrame {
            kind,
            generation,
            tick,
        })
        .is_ok()
    };

    if kind.is_silent() {
        wait_until(target, clock.as_ref()).await;
        info!(?kind, generation, "Rollover reached");
        sleep(refresh_delay).await;
        emit(CountdownTick::RefreshDue);
        return;
    }

    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let remaining_ms = (target - clock.now()).num_milliseconds();
        if remaining_ms > 0 {
            if !emit(CountdownTick::Remaining(format_remaining(remaining_ms / 1_000))) {
                return;
            }
            continue;
        }

        info!(?kind, generation, "Countdown elapsed");
        if !emit(CountdownTick::Elapsed) {
            return;
        }
        sleep(refresh_delay).await;
        emit(CountdownTick::RefreshDue);
        return;
    }
}

/// Sleeps in bounded steps so a wall-clock jump is noticed within a minute.
async fn wait_until(target: DateTime<Utc>, clock: &dyn Clock) {
    loop {
        let Ok(remaining) = (target - clock.now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        sleep(remaining.min(MAX_SILENT_STEP)).await;
    }
}
