// tempo-timeline: Execution strategies over the shared timeline
// HighRes busy-spins, LowRes sleeps, Polled is caller-driven, Background
// parks a dedicated worker on a condvar between deadlines

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tempo_clock as clock;
use tempo_signal::Notify;

use crate::error::TimelineError;
use crate::jitter::{Compensation, JitterFilter, JitterReport};
use crate::queue::{NodeRef, Timeline};

/// Execution policy: when and how the queue head is dispatched. All four
/// share the same sorted queue and dispatch sequence; only the wait
/// differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Busy-spin on the monotonic clock until the deadline.
    /// Sub-microsecond phase at 100% CPU during waits; for short,
    /// well-bounded chains where precise phase matters.
    HighRes,
    /// OS sleep, rounded to the nearest millisecond (half-up). Negligible
    /// cost, platform-sleep resolution; for human-scale scheduling.
    #[default]
    LowRes,
    /// Never waits. The caller drives dispatch by invoking `poll` on its
    /// own cadence, e.g. once per frame.
    Polled,
    /// Dedicated worker thread, woken through a condvar when a new head
    /// arrives and parked between deadlines.
    Background,
}

impl Strategy {
    /// Earliness tolerated before a dispatch is flagged as clock skew.
    /// LowRes legitimately wakes up to half a rounding step early.
    fn skew_tolerance_us(self) -> i64 {
        match self {
            Strategy::LowRes => 1_000,
            _ => SKEW_TOLERANCE_US,
        }
    }
}

/// Earliness (beyond the compensated target) tolerated before warning.
const SKEW_TOLERANCE_US: i64 = 8;

/// Upper bound on a single worker wait so `stop` stays responsive.
const MAX_WORKER_WAIT_US: i64 = 1_000_000;

struct State {
    timeline: Timeline,
    jitter: JitterFilter,
    metrics: Option<JitterReport>,
    /// Worker keeps looping while set; cleared by `stop` and by poisoning.
    running: bool,
    /// A worker thread currently exists for this scheduler.
    worker_live: bool,
    /// `stop` was called; scheduling afterwards is a programmer error.
    stopped: bool,
    /// A listener panicked on the worker; the scheduler rejects work.
    poisoned: bool,
}

struct Shared {
    queue: Mutex<State>,
    wakeup: Condvar,
}

/// Configures a [`Scheduler`]: execution strategy, jitter-compensation
/// rule, and the debug jitter recorder.
pub struct SchedulerBuilder {
    strategy: Strategy,
    compensation: Compensation,
    record_jitter: bool,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            strategy: Strategy::default(),
            compensation: Compensation::default(),
            record_jitter: false,
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn compensation(mut self, compensation: Compensation) -> Self {
        self.compensation = compensation;
        self
    }

    /// Record every measured lateness into a [`JitterReport`] for
    /// post-hoc analysis.
    pub fn record_jitter(mut self) -> Self {
        self.record_jitter = true;
        self
    }

    pub fn build(self) -> Scheduler {
        // Polled has no wait to compensate.
        let compensation = match self.strategy {
            Strategy::Polled => Compensation::Off,
            _ => self.compensation,
        };
        Scheduler {
            strategy: self.strategy,
            shared: Arc::new(Shared {
                queue: Mutex::new(State {
                    timeline: Timeline::new(),
                    jitter: JitterFilter::new(compensation),
                    metrics: self.record_jitter.then(JitterReport::new),
                    running: false,
                    worker_live: false,
                    stopped: false,
                    poisoned: false,
                }),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A timeline of type-erased triggers fired at absolute microsecond
/// instants by the configured [`Strategy`].
///
/// Listener callbacks run synchronously on the thread driving the
/// scheduler: the caller's thread for HighRes/LowRes/Polled, the worker
/// for Background. The queue lock is released across every notification,
/// so listeners may `schedule`, `cancel`, and `clear` reentrantly.
pub struct Scheduler {
    strategy: Strategy,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// A scheduler with the given strategy and default compensation
    /// (quarter-step, disabled for Polled).
    pub fn new(strategy: Strategy) -> Self {
        SchedulerBuilder::new().strategy(strategy).build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Enqueue `trigger` for execution at the absolute instant
    /// `execute_at_us`. The returned reference stays valid until the node
    /// is removed by execution or [`cancel`].
    ///
    /// For the Background strategy the worker is woken only when the new
    /// node became the queue head.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler was explicitly stopped.
    ///
    /// [`cancel`]: Scheduler::cancel
    pub fn schedule(
        &self,
        trigger: Arc<dyn Notify>,
        execute_at_us: i64,
    ) -> Result<NodeRef, TimelineError> {
        let mut state = self.shared.queue.lock();
        assert!(!state.stopped, "schedule on a stopped scheduler");
        if state.poisoned {
            return Err(TimelineError::Poisoned);
        }
        let (node, became_head) = state.timeline.insert(trigger, execute_at_us);
        if self.strategy == Strategy::Background && became_head {
            self.shared.wakeup.notify_one();
        }
        Ok(node)
    }

    /// Enqueue `trigger` to run `delay_us` microseconds from now.
    pub fn delay(
        &self,
        trigger: Arc<dyn Notify>,
        delay_us: i64,
    ) -> Result<NodeRef, TimelineError> {
        self.schedule(trigger, clock::now_us() + delay_us)
    }

    /// Remove a pending node. A no-op for nodes that already executed or
    /// were already cancelled; safe to call any number of times.
    pub fn cancel(&self, node: NodeRef) {
        let mut state = self.shared.queue.lock();
        if state.timeline.remove(node) {
            tracing::trace!(target: "tempo::timeline", ?node, "cancelled pending trigger");
        }
    }

    /// Cancel every pending node and reset the jitter offset.
    pub fn clear(&self) {
        let mut state = self.shared.queue.lock();
        state.timeline.clear();
        state.jitter.reset();
        drop(state);
        // An idle worker re-checks the now-empty queue and exits early.
        self.shared.wakeup.notify_all();
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().timeline.is_empty()
    }

    /// Deadline of the earliest pending trigger.
    pub fn next_deadline_us(&self) -> Option<i64> {
        self.shared.queue.lock().timeline.peek().map(|(_, at)| at)
    }

    /// Current accumulated wake-time correction.
    pub fn jitter_offset_us(&self) -> i64 {
        self.shared.queue.lock().jitter.offset_us()
    }

    /// Snapshot of the jitter recorder, if enabled through the builder.
    pub fn jitter_report(&self) -> Option<JitterReport> {
        self.shared.queue.lock().metrics.clone()
    }

    /// Drive the timeline according to the strategy.
    ///
    /// - HighRes / LowRes: dispatch on the calling thread until the queue
    ///   is empty, then return.
    /// - Polled: one [`poll`] pass.
    /// - Background: launch the worker thread on demand; a no-op while a
    ///   worker is alive. The worker exits when the queue drains; call
    ///   `exec` again to relaunch it.
    ///
    /// [`poll`]: Scheduler::poll
    pub fn exec(&self) -> Result<(), TimelineError> {
        match self.strategy {
            Strategy::HighRes => {
                self.drain(WaitKind::Spin);
                Ok(())
            }
            Strategy::LowRes => {
                self.drain(WaitKind::Sleep);
                Ok(())
            }
            Strategy::Polled => {
                self.poll();
                Ok(())
            }
            Strategy::Background => self.spawn_worker(),
        }
    }

    /// Execute every pending trigger whose deadline is already in the
    /// past, in order, without sleeping. Returns the number executed.
    /// Triggers chained at or before the current instant are drained in
    /// the same pass.
    pub fn poll(&self) -> usize {
        let mut fired = 0;
        loop {
            let popped = {
                let mut state = self.shared.queue.lock();
                match state.timeline.peek() {
                    Some((_, deadline)) if deadline <= clock::now_us() => {
                        state.timeline.pop_head()
                    }
                    _ => None,
                }
            };
            let Some((trigger, scheduled_us)) = popped else {
                return fired;
            };
            trigger.notify();
            fired += 1;

            let delta_us = clock::now_us() - scheduled_us;
            let mut state = self.shared.queue.lock();
            record_dispatch(&mut state, self.strategy.skew_tolerance_us(), delta_us);
        }
    }

    /// Stop the Background worker: flip the running flag, wake every
    /// waiter, and join the thread. Idempotent. After `stop`, scheduling
    /// is a programmer error.
    ///
    /// Must not be called from a listener running on the worker itself.
    pub fn stop(&self) {
        {
            let mut state = self.shared.queue.lock();
            state.stopped = true;
            state.running = false;
        }
        self.shared.wakeup.notify_all();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // A worker that died unwinding already logged and poisoned.
            let _ = handle.join();
        }
    }

    /// Single-threaded dispatch loop for HighRes and LowRes: wait for the
    /// head's compensated deadline, pop under the lock, notify outside it.
    fn drain(&self, wait: WaitKind) {
        let tolerance_us = self.strategy.skew_tolerance_us();
        loop {
            let target = {
                let state = self.shared.queue.lock();
                match state.timeline.peek() {
                    Some((_, deadline)) => {
                        state.jitter.compensated_deadline(deadline, clock::now_us())
                    }
                    None => return,
                }
            };

            match wait {
                WaitKind::Spin => {
                    clock::busy_wait_until(target);
                }
                WaitKind::Sleep => sleep_until(target),
            }

            let popped = {
                let mut state = self.shared.queue.lock();
                state.timeline.pop_head()
            };
            let Some((trigger, scheduled_us)) = popped else {
                return;
            };
            trigger.notify();

            let delta_us = clock::now_us() - scheduled_us;
            let mut state = self.shared.queue.lock();
            record_dispatch(&mut state, tolerance_us, delta_us);
        }
    }

    fn spawn_worker(&self) -> Result<(), TimelineError> {
        let mut worker = self.worker.lock();
        {
            let mut state = self.shared.queue.lock();
            assert!(!state.stopped, "exec on a stopped scheduler");
            if state.poisoned {
                return Err(TimelineError::Poisoned);
            }
            if state.worker_live {
                return Ok(());
            }
            state.worker_live = true;
            state.running = true;
        }

        // Reap the handle of a worker that already drained and exited.
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("tempo-timeline".into())
            .spawn(move || worker_loop(shared));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                let mut state = self.shared.queue.lock();
                state.worker_live = false;
                state.running = false;
                tracing::error!(target: "tempo::timeline", error = %err, "worker spawn failed");
                Err(TimelineError::WorkerSpawn(err.to_string()))
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.strategy == Strategy::Background {
            self.stop();
        }
        self.shared.queue.lock().timeline.clear();
    }
}

#[derive(Clone, Copy)]
enum WaitKind {
    Spin,
    Sleep,
}

/// Background worker: dispatch the head when due, otherwise park on the
/// condvar until the head's deadline or a head-became-earlier signal. The
/// wait is capped so `stop` is honored within a second even without a
/// wakeup. Exits when the queue drains or the running flag clears.
fn worker_loop(shared: Arc<Shared>) {
    tracing::debug!(target: "tempo::timeline", "background worker started");
    let mut state = shared.queue.lock();
    loop {
        if !state.running {
            break;
        }
        let Some((_, deadline)) = state.timeline.peek() else {
            break;
        };
        let now = clock::now_us();
        let target = state.jitter.compensated_deadline(deadline, now);
        let delay_us = target - now;

        if delay_us <= 0 {
            let Some((trigger, scheduled_us)) = state.timeline.pop_head() else {
                continue;
            };
            drop(state);

            // Popped before notifying: listeners may reschedule or cancel
            // freely, and a cancel against this node is already a no-op.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| trigger.notify()));
            let delta_us = clock::now_us() - scheduled_us;

            state = shared.queue.lock();
            match outcome {
                Ok(()) => {
                    record_dispatch(
                        &mut state,
                        Strategy::Background.skew_tolerance_us(),
                        delta_us,
                    );
                }
                Err(payload) => {
                    state.poisoned = true;
                    state.running = false;
                    state.worker_live = false;
                    drop(state);
                    tracing::error!(
                        target: "tempo::timeline",
                        "listener panicked on the background worker; scheduler poisoned"
                    );
                    panic::resume_unwind(payload);
                }
            }
        } else {
            let wait_ms = delay_us.min(MAX_WORKER_WAIT_US) / 1000;
            let timeout = Duration::from_millis(wait_ms as u64);
            let _ = shared.wakeup.wait_for(&mut state, timeout);
        }
    }
    state.worker_live = false;
    drop(state);
    tracing::debug!(target: "tempo::timeline", "background worker exited");
}

/// Post-dispatch bookkeeping shared by every strategy: clock-skew check,
/// jitter feedback, optional metrics sample.
fn record_dispatch(state: &mut State, tolerance_us: i64, delta_us: i64) {
    let earliness_us = delta_us + state.jitter.offset_us();
    if earliness_us < -tolerance_us {
        tracing::warn!(
            target: "tempo::timeline",
            delta_us,
            offset_us = state.jitter.offset_us(),
            "dispatch earlier than the compensated deadline; monotonic clock may have skewed"
        );
    }
    state.jitter.observe(delta_us);
    if let Some(metrics) = state.metrics.as_mut() {
        metrics.record(delta_us);
    }
}

/// Sleep once for the remaining delay, rounded half-up to whole
/// milliseconds. Already-past deadlines sleep zero.
fn sleep_until(target_us: i64) {
    let millis = round_to_millis(target_us - clock::now_us());
    if millis > 0 {
        thread::sleep(Duration::from_millis(millis as u64));
    }
}

fn round_to_millis(delay_us: i64) -> i64 {
    if delay_us <= 0 {
        return 0;
    }
    (delay_us + 500) / 1000
}
