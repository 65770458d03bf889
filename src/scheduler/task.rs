//! Task definitions for the scheduler.
//!
//! A task is a named unit of incremental work: an `init` hook producing an
//! opaque state value, a `step` hook invoked repeatedly until it returns
//! `false`, and an `on_done` hook fired exactly once after the final step.
//! The scheduler threads the state value through the hooks but never reads
//! or mutates it itself.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Scheduler;
use crate::error::{SchedulerError, SchedulerResult};

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered via `create`, not yet started.
    Created,
    /// `start` called; waiting in the ready structure.
    Queued,
    /// Currently being driven by the dispatch loop.
    Running,
    /// Preempted by a more urgent task; state retained.
    Suspended,
    /// Final step taken and `on_done` fired.
    Done,
    /// A hook panicked; the panic was isolated and logged.
    Failed,
    /// Explicitly removed; `on_done` never fires.
    Cancelled,
}

impl TaskState {
    /// Convert from u8 (for compact storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => TaskState::Created,
            1 => TaskState::Queued,
            2 => TaskState::Running,
            3 => TaskState::Suspended,
            4 => TaskState::Done,
            5 => TaskState::Failed,
            6 => TaskState::Cancelled,
            _ => TaskState::Created,
        }
    }

    /// Convert to u8 (for compact storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            TaskState::Created => 0,
            TaskState::Queued => 1,
            TaskState::Running => 2,
            TaskState::Suspended => 3,
            TaskState::Done => 4,
            TaskState::Failed => 5,
            TaskState::Cancelled => 6,
        }
    }

    /// Whether the task has reached a final state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Shared lifecycle cell, held by the handle and the scheduler's bookkeeping.
///
/// The scheduler drops its bookkeeping entry once a task reaches a terminal
/// state; the cell keeps the final state (and any retained panic message)
/// readable through outstanding handles.
#[derive(Debug)]
pub(crate) struct TaskCell {
    state: AtomicU8,
    panic: Mutex<Option<String>>,
}

impl TaskCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(TaskState::Created.as_u8()),
            panic: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn set(
        &self,
        state: TaskState,
    ) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn set_panic(
        &self,
        message: String,
    ) {
        *self.panic.lock() = Some(message);
    }

    pub(crate) fn panic(&self) -> Option<String> {
        self.panic.lock().clone()
    }
}

/// A unit of step-wise work drivable by the scheduler.
///
/// `init` runs lazily, exactly once, immediately before the first `step`.
/// `step` is called up to the task's batch size per turn and must return
/// promptly without blocking; returning `false` completes the task and fires
/// `on_done` synchronously within the same turn. `on_cancel` fires instead of
/// `on_done` when an initialized task is cancelled.
///
/// Any hook may call [`TaskHandle::start`] or [`TaskHandle::cancel`] on other
/// tasks; such calls are queued and applied at the next step boundary, so the
/// ordering guarantees hold even under arbitrarily nested starts.
pub trait Steppable: Send + 'static {
    /// Opaque working state, exclusively owned by the task.
    type State: Send + 'static;

    /// Produce the initial state.
    fn init(&mut self) -> Self::State;

    /// Perform one unit of work. Return `false` to complete the task.
    fn step(
        &mut self,
        state: &mut Self::State,
    ) -> bool;

    /// Called exactly once after the final step.
    fn on_done(
        &mut self,
        state: Self::State,
    ) {
        let _ = state;
    }

    /// Called when an initialized task is cancelled. `on_done` does not fire.
    fn on_cancel(
        &mut self,
        state: Self::State,
    ) {
        let _ = state;
    }
}

/// Object-safe driver over a [`Steppable`] plus its lazily-created state.
///
/// The scheduler stores tasks behind this trait so tasks with different state
/// types share one ready structure.
pub(crate) trait Job: Send {
    /// Whether `init` has already run.
    fn initialized(&self) -> bool;

    /// Run `init` and retain the resulting state. Second calls are no-ops.
    fn ensure_init(&mut self);

    /// Run one `step` against the retained state.
    fn step_once(&mut self) -> bool;

    /// Consume the state and fire `on_done`.
    fn finish(&mut self);

    /// Consume the state and fire `on_cancel`, if the state exists.
    fn abort(&mut self);
}

struct Runner<S: Steppable> {
    job: S,
    state: Option<S::State>,
}

impl<S: Steppable> Job for Runner<S> {
    #[inline]
    fn initialized(&self) -> bool {
        self.state.is_some()
    }

    fn ensure_init(&mut self) {
        if self.state.is_none() {
            self.state = Some(self.job.init());
        }
    }

    fn step_once(&mut self) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        self.job.step(state)
    }

    fn finish(&mut self) {
        if let Some(state) = self.state.take() {
            self.job.on_done(state);
        }
    }

    fn abort(&mut self) {
        if let Some(state) = self.state.take() {
            self.job.on_cancel(state);
        }
    }
}

/// Immutable task configuration supplied at creation.
///
/// `priority` is a positive integer, smaller = more urgent; a task whose
/// priority number is strictly smaller than the running task's preempts it at
/// the next step boundary. `batch` is the maximum number of `step` calls
/// performed within one scheduling turn before the scheduler yields back to
/// the host (steps per turn, not a wall-clock budget).
pub struct TaskSpec {
    pub(crate) name: String,
    pub(crate) priority: u32,
    pub(crate) batch: usize,
    pub(crate) job: Box<dyn Job>,
}

impl fmt::Debug for TaskSpec {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("batch", &self.batch)
            .finish()
    }
}

impl TaskSpec {
    /// Create a spec for a [`Steppable`] job with priority 1 and batch 1.
    pub fn new(
        name: impl Into<String>,
        job: impl Steppable,
    ) -> Self {
        Self {
            name: name.into(),
            priority: 1,
            batch: 1,
            job: Box::new(Runner { job, state: None }),
        }
    }

    /// Set the priority (positive integer, smaller = more urgent).
    #[inline]
    pub fn with_priority(
        mut self,
        priority: u32,
    ) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-turn batch size.
    #[inline]
    pub fn with_batch(
        mut self,
        batch: usize,
    ) -> Self {
        self.batch = batch;
        self
    }

    /// Get the diagnostic name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the priority.
    #[inline]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Get the per-turn batch size.
    #[inline]
    pub fn batch(&self) -> usize {
        self.batch
    }
}

/// Closure-backed [`Steppable`], produced by [`TaskBuilder`].
pub struct StepFns<T> {
    init: Box<dyn FnMut() -> T + Send>,
    step: Box<dyn FnMut(&mut T) -> bool + Send>,
    on_done: Option<Box<dyn FnMut(T) + Send>>,
    on_cancel: Option<Box<dyn FnMut(T) + Send>>,
}

impl<T: Send + 'static> Steppable for StepFns<T> {
    type State = T;

    fn init(&mut self) -> T {
        (self.init)()
    }

    fn step(
        &mut self,
        state: &mut T,
    ) -> bool {
        (self.step)(state)
    }

    fn on_done(
        &mut self,
        state: T,
    ) {
        if let Some(hook) = self.on_done.as_mut() {
            hook(state);
        }
    }

    fn on_cancel(
        &mut self,
        state: T,
    ) {
        if let Some(hook) = self.on_cancel.as_mut() {
            hook(state);
        }
    }
}

/// Builder constructing a [`TaskSpec`] from plain closures.
///
/// `init` and `step` are mandatory; [`TaskBuilder::into_spec`] rejects a
/// builder missing either one.
pub struct TaskBuilder<T> {
    name: String,
    priority: u32,
    batch: usize,
    init: Option<Box<dyn FnMut() -> T + Send>>,
    step: Option<Box<dyn FnMut(&mut T) -> bool + Send>>,
    on_done: Option<Box<dyn FnMut(T) + Send>>,
    on_cancel: Option<Box<dyn FnMut(T) + Send>>,
}

impl<T: Send + 'static> TaskBuilder<T> {
    /// Create a builder with priority 1 and batch 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 1,
            batch: 1,
            init: None,
            step: None,
            on_done: None,
            on_cancel: None,
        }
    }

    /// Set the priority (positive integer, smaller = more urgent).
    #[inline]
    pub fn priority(
        mut self,
        priority: u32,
    ) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-turn batch size.
    #[inline]
    pub fn batch(
        mut self,
        batch: usize,
    ) -> Self {
        self.batch = batch;
        self
    }

    /// Set the `init` hook.
    pub fn init(
        mut self,
        hook: impl FnMut() -> T + Send + 'static,
    ) -> Self {
        self.init = Some(Box::new(hook));
        self
    }

    /// Set the `step` hook.
    pub fn step(
        mut self,
        hook: impl FnMut(&mut T) -> bool + Send + 'static,
    ) -> Self {
        self.step = Some(Box::new(hook));
        self
    }

    /// Set the `on_done` hook.
    pub fn on_done(
        mut self,
        hook: impl FnMut(T) + Send + 'static,
    ) -> Self {
        self.on_done = Some(Box::new(hook));
        self
    }

    /// Set the `on_cancel` hook.
    pub fn on_cancel(
        mut self,
        hook: impl FnMut(T) + Send + 'static,
    ) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    /// Validate hook presence and build the spec.
    pub fn into_spec(self) -> SchedulerResult<TaskSpec> {
        let Some(init) = self.init else {
            return Err(SchedulerError::MissingHook {
                name: self.name,
                hook: "init",
            });
        };
        let Some(step) = self.step else {
            return Err(SchedulerError::MissingHook {
                name: self.name,
                hook: "step",
            });
        };
        Ok(TaskSpec {
            name: self.name,
            priority: self.priority,
            batch: self.batch,
            job: Box::new(Runner {
                job: StepFns {
                    init,
                    step,
                    on_done: self.on_done,
                    on_cancel: self.on_cancel,
                },
                state: None,
            }),
        })
    }
}

/// Cloneable public handle to a registered task.
///
/// Handles are the only way work enters the scheduler: a running task's hooks
/// may hold handles to other tasks and `start` them mid-run.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    scheduler: Arc<Scheduler>,
    cell: Arc<TaskCell>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskId,
        scheduler: Arc<Scheduler>,
        cell: Arc<TaskCell>,
    ) -> Self {
        Self { id, scheduler, cell }
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Enqueue the task by `(priority, start order)`.
    ///
    /// Idempotent: second calls on a queued, running, suspended or finished
    /// task have no effect. Safe to call from inside any task hook.
    pub fn start(&self) {
        self.scheduler.request_start(self.id);
    }

    /// Remove the task from every scheduler structure.
    ///
    /// `on_done` never fires for a cancelled task; `on_cancel` fires iff the
    /// task had already initialized. A cancel on an already-finished task is
    /// silently ignored.
    pub fn cancel(&self) {
        self.scheduler.request_cancel(self.id);
    }

    /// Get the current lifecycle state.
    ///
    /// Remains readable after the task has finished: the scheduler drops its
    /// own record of a terminal task, but the handle keeps the final state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.cell.get()
    }

    /// Retained panic message of a [`TaskState::Failed`] task.
    pub fn panic_message(&self) -> Option<String> {
        self.cell.panic()
    }
}
