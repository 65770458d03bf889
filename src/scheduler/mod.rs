//! Priority-preemptive cooperative task scheduler
//!
//! Runs many long-lived, step-wise background computations (incremental tile
//! decoding, deferred geometry, periodic redraw work) on a single logical
//! thread without blocking the host. Ordering is deterministic: ready tasks
//! are dispatched by `(priority, start sequence)`, equal-priority tasks run
//! to completion in start order, and a task with a strictly smaller priority
//! number preempts the running task at the next step boundary.
//!
//! All mutation of the ready structure happens inside the single dispatch
//! function. `start`/`cancel` calls — including ones issued from inside a
//! running task's hooks — enqueue commands that dispatch drains at every step
//! boundary, which is where preemption is detected.

pub mod queue;
pub mod registry;
pub mod task;

pub use task::{Steppable, TaskBuilder, TaskHandle, TaskId, TaskSpec, TaskState};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::error::{SchedulerError, SchedulerResult};
use queue::ReadyQueue;
use task::{Job, TaskCell};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of pre-sized priority buckets in the ready structure.
    ///
    /// Bounds bookkeeping only: execution concurrency is always 1, and
    /// priorities beyond the capacity still work (they spill into an ordered
    /// overflow tier, so memory tracks queued tasks, not priority values).
    pub capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { capacity: 8 }
    }
}

/// Outcome of one scheduling turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// At least one hook ran this turn.
    Progressed,
    /// Nothing ready: the queue is drained and no task is mid-run.
    Idle,
    /// Another caller is already inside the dispatch function.
    Busy,
}

/// Reentrant mutation request, drained by the dispatch function.
#[derive(Debug, Clone, Copy)]
enum Command {
    Start(TaskId),
    Cancel(TaskId),
}

/// Per-task bookkeeping for a live (non-terminal) task. The job itself lives
/// in the parked-job table so the core lock is never held across a hook
/// invocation. The entry is dropped once the task reaches a terminal state;
/// the shared cell keeps that state readable through handles.
#[derive(Debug)]
struct TaskMeta {
    name: String,
    priority: u32,
    batch: usize,
    /// Lifecycle state plus retained panic message, shared with the handle.
    cell: Arc<TaskCell>,
    /// Assigned at the first `start` call; tie-breaker within a tier.
    seq: Option<u64>,
}

#[derive(Debug)]
struct Core {
    tasks: HashMap<TaskId, TaskMeta>,
    ready: ReadyQueue,
    running: Option<TaskId>,
    next_seq: u64,
}

/// Single-threaded cooperative scheduler with priority preemption.
///
/// Obtain a process-wide shared instance via [`Scheduler::get_instance`], or
/// a private one via [`Scheduler::new`]/[`Scheduler::with_config`]. Register
/// work with [`Scheduler::create`], start it through the returned
/// [`TaskHandle`], then pump turns with [`Scheduler::turn`],
/// [`Scheduler::run_until_idle`] or the async [`Scheduler::run`].
pub struct Scheduler {
    config: SchedulerConfig,
    core: Mutex<Core>,
    /// Jobs not currently being driven (queued, suspended, or parked between
    /// turns). The dispatch function holds the running task's job locally.
    jobs: Mutex<HashMap<TaskId, Box<dyn Job>>>,
    commands: SegQueue<Command>,
    dispatching: AtomicBool,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("Scheduler")
            .field("capacity", &self.config.capacity)
            .field("tasks", &core.tasks.len())
            .field("ready", &core.ready.len())
            .field("running", &core.running)
            .finish()
    }
}

impl Scheduler {
    /// Create a private scheduler with default config.
    #[inline]
    pub fn new() -> Arc<Self> {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a private scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Arc<Self> {
        let capacity = config.capacity.max(1);
        Arc::new(Self {
            config: SchedulerConfig { capacity },
            core: Mutex::new(Core {
                tasks: HashMap::new(),
                ready: ReadyQueue::with_capacity(capacity),
                running: None,
                next_seq: 0,
            }),
            jobs: Mutex::new(HashMap::new()),
            commands: SegQueue::new(),
            dispatching: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        })
    }

    /// Get the process-wide shared instance for `capacity`.
    ///
    /// The first call with a given capacity constructs the instance; later
    /// calls with the same capacity return the same `Arc`.
    pub fn get_instance(capacity: usize) -> Arc<Self> {
        registry::get_or_create(capacity)
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a task. Does not start it.
    pub fn create(
        self: &Arc<Self>,
        spec: TaskSpec,
    ) -> SchedulerResult<TaskHandle> {
        if spec.priority == 0 {
            return Err(SchedulerError::InvalidPriority(spec.priority));
        }
        if spec.batch == 0 {
            return Err(SchedulerError::InvalidBatch);
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let TaskSpec {
            name,
            priority,
            batch,
            job,
        } = spec;
        trace!(task = %name, %id, priority, batch, "task created");

        let cell = Arc::new(TaskCell::new());
        self.core.lock().tasks.insert(
            id,
            TaskMeta {
                name,
                priority,
                batch,
                cell: cell.clone(),
                seq: None,
            },
        );
        self.jobs.lock().insert(id, job);
        Ok(TaskHandle::new(id, self.clone(), cell))
    }

    /// Number of non-terminal tasks the scheduler still tracks.
    #[cfg(test)]
    pub(crate) fn live_tasks(&self) -> usize {
        self.core.lock().tasks.len()
    }

    /// Whether nothing is queued, running, or pending admission.
    pub fn is_idle(&self) -> bool {
        if !self.commands.is_empty() {
            return false;
        }
        let core = self.core.lock();
        core.running.is_none() && core.ready.is_empty()
    }

    pub(crate) fn request_start(
        &self,
        id: TaskId,
    ) {
        self.commands.push(Command::Start(id));
        // Admission is applied immediately unless a dispatch is active, in
        // which case the active loop drains it at the next step boundary.
        if !self.dispatching.load(Ordering::SeqCst) {
            self.apply_commands();
        }
    }

    pub(crate) fn request_cancel(
        &self,
        id: TaskId,
    ) {
        self.commands.push(Command::Cancel(id));
        if !self.dispatching.load(Ordering::SeqCst) {
            self.apply_commands();
        }
    }

    /// Run one scheduling turn.
    ///
    /// A turn drives the most urgent ready task for up to its batch of `step`
    /// calls. Tasks completing mid-turn fire `on_done` and hand over to the
    /// next most urgent task within the same turn; the turn ends when a task
    /// exhausts its batch without completing, or when nothing is ready.
    pub fn turn(&self) -> Turn {
        if self
            .dispatching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Turn::Busy;
        }
        let outcome = self.dispatch_turn();
        self.dispatching.store(false, Ordering::SeqCst);
        outcome
    }

    /// Pump turns back-to-back until the scheduler is idle.
    pub fn run_until_idle(&self) {
        loop {
            match self.turn() {
                Turn::Idle => break,
                Turn::Busy => std::thread::yield_now(),
                Turn::Progressed => {}
            }
        }
    }

    /// Pump turns until idle, yielding to the host runtime between turns.
    ///
    /// This is the cooperative entry point: one turn per poll keeps the
    /// surrounding program responsive while long tasks make progress.
    pub async fn run(&self) {
        loop {
            match self.turn() {
                Turn::Idle => break,
                _ => tokio::task::yield_now().await,
            }
        }
    }

    /// The single dispatch function. Owns the ready structure for the length
    /// of a turn; the core lock is released around every hook invocation.
    fn dispatch_turn(&self) -> Turn {
        let mut progressed = false;

        'select: loop {
            self.apply_commands();

            let Some((id, batch)) = self.select_current() else {
                if !self.commands.is_empty() {
                    // A start raced in after the drain; admit it this turn.
                    continue 'select;
                }
                return if progressed { Turn::Progressed } else { Turn::Idle };
            };

            let Some(mut job) = self.jobs.lock().remove(&id) else {
                // Cancelled between selection and pickup.
                self.clear_running(id);
                continue 'select;
            };

            if !job.initialized() {
                trace!(%id, "init");
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.ensure_init())) {
                    self.mark_failed(id, payload.as_ref(), "init");
                    progressed = true;
                    continue 'select;
                }
            }

            let mut used = 0usize;
            while used < batch {
                let outcome = catch_unwind(AssertUnwindSafe(|| job.step_once()));
                used += 1;
                progressed = true;

                match outcome {
                    Err(payload) => {
                        self.mark_failed(id, payload.as_ref(), "step");
                        continue 'select;
                    }
                    Ok(false) => {
                        // Final step taken: on_done fires now, before any
                        // other task at this tier runs or the turn yields.
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.finish())) {
                            self.mark_failed(id, payload.as_ref(), "on_done");
                        } else {
                            self.mark_done(id);
                        }
                        continue 'select;
                    }
                    Ok(true) => {
                        self.apply_commands();
                        match self.after_step(id) {
                            StepVerdict::Continue => {}
                            StepVerdict::Cancelled => {
                                self.abort_job(id, job);
                                continue 'select;
                            }
                            StepVerdict::Preempted => {
                                self.jobs.lock().insert(id, job);
                                continue 'select;
                            }
                        }
                    }
                }
            }

            // Batch exhausted without completing: the task stays running and
            // resumes on the next turn. Yield back to the host.
            self.jobs.lock().insert(id, job);
            return Turn::Progressed;
        }
    }

    /// Pick the task to drive: the running task, unless a strictly more
    /// urgent one is ready, else the smallest `(priority, sequence)`.
    fn select_current(&self) -> Option<(TaskId, usize)> {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        loop {
            if let Some(id) = core.running {
                let meta = core.tasks.get(&id)?;
                if core
                    .ready
                    .min_priority()
                    .is_some_and(|p| p < meta.priority)
                {
                    trace!(task = %meta.name, %id, "suspended by more urgent task");
                    meta.cell.set(TaskState::Suspended);
                    core.ready.push_front(meta.priority, id);
                    core.running = None;
                    continue;
                }
                return Some((id, meta.batch));
            }
            let id = core.ready.pop()?;
            let meta = core.tasks.get(&id)?;
            if meta.cell.get() == TaskState::Suspended {
                trace!(task = %meta.name, %id, "resumed");
            } else {
                trace!(task = %meta.name, %id, "begins");
            }
            meta.cell.set(TaskState::Running);
            core.running = Some(id);
        }
    }

    /// Post-step verdict for the task just stepped: commands drained right
    /// before this call may have cancelled it or admitted a preemptor.
    fn after_step(
        &self,
        id: TaskId,
    ) -> StepVerdict {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        // A cancel drained just before this call removed the entry.
        let Some(meta) = core.tasks.get(&id) else {
            return StepVerdict::Cancelled;
        };
        if core
            .ready
            .min_priority()
            .is_some_and(|p| p < meta.priority)
        {
            trace!(task = %meta.name, %id, "suspended by more urgent task");
            meta.cell.set(TaskState::Suspended);
            core.ready.push_front(meta.priority, id);
            core.running = None;
            return StepVerdict::Preempted;
        }
        StepVerdict::Continue
    }

    /// Drain queued `start`/`cancel` commands into the core structures.
    ///
    /// Cancel hooks of initialized parked tasks run after the lock drops.
    fn apply_commands(&self) {
        let mut aborted: SmallVec<[TaskId; 2]> = SmallVec::new();
        {
            let mut guard = self.core.lock();
            let core = &mut *guard;
            while let Some(command) = self.commands.pop() {
                match command {
                    Command::Start(id) => {
                        let seq = core.next_seq;
                        let Some(meta) = core.tasks.get_mut(&id) else {
                            debug!(%id, "start of finished task ignored");
                            continue;
                        };
                        let state = meta.cell.get();
                        if state != TaskState::Created {
                            debug!(task = %meta.name, %id, ?state, "start ignored");
                            continue;
                        }
                        meta.cell.set(TaskState::Queued);
                        meta.seq = Some(seq);
                        core.next_seq += 1;
                        core.ready.push_back(meta.priority, id);
                        trace!(task = %meta.name, %id, priority = meta.priority, seq, "queued");
                    }
                    Command::Cancel(id) => {
                        // Terminal tasks have no entry, so their cancels
                        // land here.
                        let Some(meta) = core.tasks.remove(&id) else {
                            debug!(%id, "cancel of finished task ignored");
                            continue;
                        };
                        match meta.cell.get() {
                            TaskState::Created => {
                                meta.cell.set(TaskState::Cancelled);
                                aborted.push(id);
                            }
                            TaskState::Queued | TaskState::Suspended => {
                                meta.cell.set(TaskState::Cancelled);
                                core.ready.remove(meta.priority, id);
                                aborted.push(id);
                                trace!(task = %meta.name, %id, "cancelled");
                            }
                            TaskState::Running => {
                                meta.cell.set(TaskState::Cancelled);
                                if core.running == Some(id) {
                                    core.running = None;
                                }
                                // If the job is parked between turns the
                                // abort runs below; if it is being driven
                                // right now the dispatch loop aborts it at
                                // the current step boundary.
                                aborted.push(id);
                                trace!(task = %meta.name, %id, "cancelled while running");
                            }
                            // Live entries never hold a terminal state.
                            TaskState::Done
                            | TaskState::Failed
                            | TaskState::Cancelled => {}
                        }
                    }
                }
            }
        }
        for id in aborted {
            let job = self.jobs.lock().remove(&id);
            if let Some(job) = job {
                self.abort_job(id, job);
            }
        }
    }

    /// Fire `on_cancel` for an initialized job, isolating panics.
    fn abort_job(
        &self,
        id: TaskId,
        mut job: Box<dyn Job>,
    ) {
        if !job.initialized() {
            return;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.abort())) {
            error!(%id, panic = %panic_message(payload.as_ref()), "on_cancel panicked");
        }
    }

    /// Retire a completed task: the handle keeps reporting `Done`, the
    /// scheduler forgets the entry.
    fn mark_done(
        &self,
        id: TaskId,
    ) {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        if core.running == Some(id) {
            core.running = None;
        }
        if let Some(meta) = core.tasks.remove(&id) {
            meta.cell.set(TaskState::Done);
            trace!(task = %meta.name, %id, "done");
        }
    }

    /// Isolate a panicking hook: record it, drop the task, keep dispatching.
    fn mark_failed(
        &self,
        id: TaskId,
        payload: &(dyn Any + Send),
        hook: &'static str,
    ) {
        let message = panic_message(payload);
        let mut guard = self.core.lock();
        let core = &mut *guard;
        if core.running == Some(id) {
            core.running = None;
        }
        if let Some(meta) = core.tasks.remove(&id) {
            meta.cell.set_panic(message.clone());
            meta.cell.set(TaskState::Failed);
            error!(
                task = %meta.name,
                %id,
                hook,
                panic = %message,
                "task hook panicked; continuing with next ready task"
            );
        }
    }

    fn clear_running(
        &self,
        id: TaskId,
    ) {
        let mut core = self.core.lock();
        if core.running == Some(id) {
            core.running = None;
        }
    }
}

enum StepVerdict {
    Continue,
    Cancelled,
    Preempted,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
