use crate::context;
use crate::queue::Queue;
use crate::scheduler::Scheduler;
use crate::task::mapper::Mapper;
use crate::task::state::State;
use crate::task::{Finalizer, TaskError, TaskId, Val};
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use tracing::trace;

/// A unit of cancelable, one-shot asynchronous computation.
///
/// Unlike a conventional promise, a task has exactly one consumer: chaining
/// with [`Task::map`] (or converting with [`Task::into_future`]) consumes the
/// receiver, and doing it twice is an error. Share an outcome explicitly with
/// [`Task::weak`].
///
/// The other difference is [`Task::cancel`]: canceling a task runs upstream
/// finalizers synchronously — timers, sockets, whatever the producer parked —
/// while the descendant chain observes a catchable [`Val::Canceled`] error
/// through the normal settle path.
///
/// `Task` is a cheap handle (`Rc` inside); clones refer to the same
/// underlying task. The whole type is thread-confined.
#[derive(Clone)]
pub struct Task {
    cell: Rc<TaskCell>,
}

/// A non-owning task handle.
pub(crate) struct WeakTask {
    cell: Weak<TaskCell>,
}

impl WeakTask {
    pub(crate) fn upgrade(&self) -> Option<Task> {
        self.cell.upgrade().map(|cell| Task { cell })
    }
}

/// The shared state behind a [`Task`] handle.
///
/// Ownership shape, which is what keeps the graph cycle-free: `predecessor`
/// is a strong link (a consumer owns its producer), `successor` is a weak
/// back-link set by the successor's own setup, and weak branches are owned by
/// the parent but hold nothing back. The scheduler's queue holds a handle
/// only from settle until flush.
struct TaskCell {
    id: TaskId,
    state: Cell<State>,
    error: RefCell<Val>,
    result: RefCell<Val>,
    predecessor: RefCell<Option<Task>>,
    successor: RefCell<Option<Weak<TaskCell>>>,
    branches: RefCell<Queue<Task>>,
    mapper: RefCell<Option<Mapper>>,
    finalizer: RefCell<Option<Finalizer>>,
    scheduler: Rc<Scheduler>,
}

/// Which slot of the settle pair a nested task arrived in. Error-slot
/// flattening rethrows the nested outcome; result-slot flattening forwards
/// it unchanged.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    Error,
    Result,
}

impl Task {
    /// A fresh Pending task on the thread default scheduler.
    pub fn new() -> Task {
        Task::with_scheduler(context::default_scheduler())
    }

    /// A fresh Pending task on an explicit scheduler.
    pub fn with_scheduler(scheduler: Rc<Scheduler>) -> Task {
        Task {
            cell: Rc::new(TaskCell {
                id: TaskId::next(),
                state: Cell::new(State::PENDING),
                error: RefCell::new(Val::Null),
                result: RefCell::new(Val::Null),
                predecessor: RefCell::new(None),
                successor: RefCell::new(None),
                branches: RefCell::new(Queue::new()),
                mapper: RefCell::new(None),
                finalizer: RefCell::new(None),
                scheduler,
            }),
        }
    }

    /// A task settled with the given pair. As in [`Task::settle`], a truthy
    /// error wins and the result slot is discarded.
    pub fn from_pair(error: impl Into<Val>, result: impl Into<Val>) -> Result<Task, TaskError> {
        let task = Task::new();
        task.settle_val(error.into(), result.into())?;
        Ok(task)
    }

    /// A task settled with `error` in the error slot.
    pub fn from_error(error: impl Into<Val>) -> Result<Task, TaskError> {
        Task::from_pair(error, Val::Null)
    }

    /// A task settled with `result` in the result slot.
    pub fn from_result(result: impl Into<Val>) -> Result<Task, TaskError> {
        Task::from_pair(Val::Null, result)
    }

    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn is_pending(&self) -> bool {
        !self.state().is_settled()
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    pub fn is_error(&self) -> bool {
        self.state().contains(State::ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.state().contains(State::SUCCESS)
    }

    /// Whether a unique downstream consumer already exists.
    pub fn is_consumed(&self) -> bool {
        self.state().contains(State::CONSUMED)
    }

    /// Settles the task with an `(error, result)` pair. At most one of the
    /// two is meaningful: a non-null `error` wins and the result slot is
    /// discarded.
    ///
    /// This is the single entry point for leaving Pending, and it is
    /// at-most-once: settling an already-settled task (or one whose mapper is
    /// currently running) does nothing. Passing a nested [`Val::Task`] in
    /// either slot chains onto it instead of storing it — the receiver
    /// adopts the nested task as its predecessor and settles with its
    /// eventual outcome (rethrown as an error when the nested task sat in
    /// the error slot).
    ///
    /// # Errors
    ///
    /// [`TaskError::Cyclic`] when either slot references the receiver
    /// itself; [`TaskError::Consumed`] when a nested task is already owned
    /// by another consumer and cannot be chained onto.
    pub fn settle(
        &self,
        error: impl Into<Val>,
        result: impl Into<Val>,
    ) -> Result<(), TaskError> {
        self.settle_val(error.into(), result.into())
    }

    pub(crate) fn settle_val(&self, error: Val, result: Val) -> Result<(), TaskError> {
        let mut error = error;
        let mut result = result;
        loop {
            // Already settled, or the mapper is on the stack right now.
            if self
                .state()
                .intersects(State::ERROR | State::SUCCESS | State::MAPPING)
            {
                return Ok(());
            }

            // Exactly one slot is meaningful.
            if !error.is_null() {
                result = Val::Null;
            }

            if let Val::Task(task) = &error {
                if self.same(task) {
                    return Err(TaskError::Cyclic);
                }
            }
            if let Val::Task(task) = &result {
                if self.same(task) {
                    return Err(TaskError::Cyclic);
                }
            }

            if let Val::Task(nested) = error {
                return self.flatten(nested, Slot::Error);
            }
            if let Val::Task(nested) = result {
                return self.flatten(nested, Slot::Result);
            }

            let mapper = self.cell.mapper.borrow_mut().take();
            if let Some(mapper) = mapper {
                self.insert_state(State::MAPPING);
                let unmapping = ScopeGuard::new(|| self.remove_state(State::MAPPING));
                let mapped = mapper.run(error, result);
                drop(unmapping);
                match mapped {
                    Ok(value) => {
                        error = Val::Null;
                        result = value;
                    }
                    Err(raised) => {
                        error = raised;
                        result = Val::Null;
                    }
                }
                // The mapper's outcome feeds back through the same rules; it
                // may flatten, or terminate below.
                continue;
            }

            self.settle_terminal(error, result);
            return Ok(());
        }
    }

    fn settle_terminal(&self, error: Val, result: Val) {
        let errored = !error.is_null();
        *self.cell.error.borrow_mut() = error;
        *self.cell.result.borrow_mut() = result;
        let mut state = self.state();
        state.remove(State::PENDING);
        state.insert(if errored { State::ERROR } else { State::SUCCESS });
        if errored {
            state.insert(State::PENDING_REJECTION);
        }
        self.cell.state.set(state);
        trace!(task = %self.id(), errored, "task settled");
        self.cell.scheduler.push(self.clone());
    }

    /// Chains onto a nested task that arrived in a settle slot.
    fn flatten(&self, nested: Task, slot: Slot) -> Result<(), TaskError> {
        let nested_free =
            !nested.is_consumed() && nested.cell.mapper.borrow().is_none();
        let direct = nested_free
            && (slot == Slot::Result || self.cell.mapper.borrow().is_none());

        if direct {
            // Adopt the nested task as predecessor and let the normal flush
            // forward its outcome here. For the error slot, an implicit
            // rethrow mapper turns whatever arrives into an error.
            *self.cell.predecessor.borrow_mut() = Some(nested.clone());
            *nested.cell.successor.borrow_mut() = Some(Rc::downgrade(&self.cell));
            nested.insert_state(State::CONSUMED);
            nested.remove_state(State::PENDING_REJECTION);
            if slot == Slot::Error {
                *self.cell.mapper.borrow_mut() = Some(Mapper::Rethrow);
            }
            if nested.is_settled() {
                nested.cell.scheduler.push(nested.clone());
            }
            return Ok(());
        }

        // The nested task already has a mapper or a consumer: chain after it
        // and feed its outcome back into this task.
        let me = self.downgrade();
        let fed = nested.map(move |error, result| {
            if let Some(task) = me.upgrade() {
                let _ = match slot {
                    Slot::Error => {
                        let raised = if error.is_null() { result } else { error };
                        task.settle_val(raised, Val::Null)
                    }
                    Slot::Result => task.settle_val(error, result),
                };
            }
            Ok(Val::Null)
        })?;
        *self.cell.predecessor.borrow_mut() = Some(fed);
        Ok(())
    }

    /// Delivers this task's outcome: forwards to the successor, then to each
    /// weak branch in FIFO order, runs the finalizer, and reports an
    /// unobserved error to the unhandled-rejection hook. Invoked by the
    /// scheduler; safe to invoke again (every slot is taken on first use).
    pub(crate) fn finish_pending(&self) {
        let state = self.state();
        if !state.is_settled() {
            return;
        }
        let errored = state.contains(State::ERROR);
        let error = self.cell.error.borrow().clone();
        let result = self.cell.result.borrow().clone();
        trace!(task = %self.id(), errored, "flushing notification");

        let successor = self.cell.successor.borrow_mut().take();
        if let Some(successor) = successor.and_then(|weak| weak.upgrade()) {
            let successor = Task { cell: successor };
            // The ownership link has served its purpose.
            *successor.cell.predecessor.borrow_mut() = None;
            self.remove_state(State::PENDING_REJECTION);
            let forwarded = if errored {
                successor.settle_val(error.clone(), Val::Null)
            } else {
                successor.settle_val(Val::Null, result.clone())
            };
            if let Err(err) = forwarded {
                trace!(task = %self.id(), %err, "successor refused forwarded outcome");
            }
        }

        let mut branches = mem::take(&mut *self.cell.branches.borrow_mut());
        while let Some(branch) = branches.pop() {
            let _ = if errored {
                branch.settle_val(error.clone(), Val::Null)
            } else {
                branch.settle_val(Val::Null, result.clone())
            };
        }

        let finalizer = self.cell.finalizer.borrow_mut().take();
        if let Some(finalizer) = finalizer {
            // A finalizer counts as a consumer of the outcome.
            self.remove_state(State::PENDING_REJECTION);
            if let Err(raised) = finalizer(error, result) {
                // There is no caller to return this to, and the outcome slot
                // is already taken; report it through the rejection hook as
                // its own rejected task. The default hook rethrows.
                let report = Task::with_scheduler(self.cell.scheduler.clone());
                let _ = report.settle_val(raised, Val::Null);
            }
        }

        if self.state().contains(State::PENDING_REJECTION) {
            self.remove_state(State::PENDING_REJECTION);
            context::emit_rejection(self);
        }
    }

    /// Chains a full-pair mapper, consuming the receiver.
    ///
    /// Returns the new Pending task that will settle with whatever `mapper`
    /// returns once the receiver settles — `Ok` into the result slot, `Err`
    /// into the error slot, and a returned [`Val::Task`] chained onto. The
    /// mapper never runs on the caller's stack: delivery goes through the
    /// scheduler even when the receiver is already settled.
    pub fn map(
        &self,
        mapper: impl FnOnce(Val, Val) -> Result<Val, Val> + 'static,
    ) -> Result<Task, TaskError> {
        self.chain(Mapper::Full(Box::new(mapper)))
    }

    /// Chains a mapper over the error slot only; a success passes through
    /// untouched. The closure's `Ok` value lands in the result slot — this
    /// is the catch operation.
    pub fn map_err(
        &self,
        mapper: impl FnOnce(Val) -> Result<Val, Val> + 'static,
    ) -> Result<Task, TaskError> {
        self.chain(Mapper::OnError(Box::new(mapper)))
    }

    /// Chains a mapper over the result slot only; an error rethrows without
    /// running the closure.
    pub fn map_ok(
        &self,
        mapper: impl FnOnce(Val) -> Result<Val, Val> + 'static,
    ) -> Result<Task, TaskError> {
        self.chain(Mapper::OnSuccess(Box::new(mapper)))
    }

    /// Chains a cleanup observer. The outcome passes through unchanged
    /// unless `mapper` raises (the raised value replaces the outcome) or
    /// returns a task (the outcome waits for it first).
    pub fn finally(
        &self,
        mapper: impl FnOnce(Val, Val) -> Result<Val, Val> + 'static,
    ) -> Result<Task, TaskError> {
        self.chain(Mapper::Finally(Box::new(mapper)))
    }

    fn chain(&self, mapper: Mapper) -> Result<Task, TaskError> {
        if self.is_consumed() {
            return Err(TaskError::Consumed);
        }
        self.insert_state(State::CONSUMED);
        // The new successor is now responsible for the outcome.
        self.remove_state(State::PENDING_REJECTION);

        let next = Task::with_scheduler(self.cell.scheduler.clone());
        *next.cell.mapper.borrow_mut() = Some(mapper);
        *next.cell.predecessor.borrow_mut() = Some(self.clone());
        *self.cell.successor.borrow_mut() = Some(Rc::downgrade(&next.cell));
        if self.is_settled() {
            self.cell.scheduler.push(self.clone());
        }
        trace!(task = %self.id(), next = %next.id(), "task chained");
        Ok(next)
    }

    /// Returns a new Pending task that receives a copy of this task's
    /// outcome without owning it. Any number of weak branches may exist;
    /// none of them consumes the parent, and canceling a branch never
    /// touches the parent. A branch created after the parent settled still
    /// receives the outcome (the parent is rescheduled for flush).
    pub fn weak(&self) -> Task {
        let branch = Task::with_scheduler(self.cell.scheduler.clone());
        self.cell.branches.borrow_mut().push(branch.clone());
        if self.is_settled() {
            self.cell.scheduler.push(self.clone());
        }
        branch
    }

    /// Cancels the task: synchronous cleanup upstream, a catchable
    /// [`Val::Canceled`] error downstream.
    ///
    /// A still-Pending receiver settles with the cancel sentinel (its own
    /// rejection flag is pre-cleared — cancelation counts as handling).
    /// The finalizer, the previous predecessor, and any predecessor the
    /// settle itself attached are then torn down in that order, each step
    /// guarded so a panic or error in one cannot skip the rest. Upstream
    /// finalizers have all run by the time this returns; the descendant
    /// chain observes the sentinel through normal scheduling and may catch
    /// it with [`Task::map_err`].
    ///
    /// Canceling is idempotent, and a cancel that arrives while the task's
    /// own mapper is running is dropped (the mapper finishes first).
    ///
    /// # Errors
    ///
    /// [`TaskError::Finalizer`] when a finalizer raised during teardown.
    /// The teardown itself still completed.
    pub fn cancel(&self) -> Result<(), TaskError> {
        if self.state().contains(State::MAPPING) {
            return Ok(());
        }
        trace!(task = %self.id(), "cancel");

        let prior = self.cell.predecessor.borrow_mut().take();

        if !self.is_settled() {
            let _ = self.settle_val(Val::Canceled, Val::Null);
        }
        self.remove_state(State::PENDING_REJECTION);

        // Settling may have attached a fresh predecessor (a mapper that
        // caught the sentinel and returned a task); it goes down too.
        let attached = self.cell.predecessor.borrow_mut().take();

        let finalizer = self.cell.finalizer.borrow_mut().take();
        let (fin_error, fin_result) = if self.is_settled() {
            (
                self.cell.error.borrow().clone(),
                self.cell.result.borrow().clone(),
            )
        } else {
            (Val::Canceled, Val::Null)
        };

        let mut failure: Option<TaskError> = None;

        {
            // If the finalizer panics, the guard still walks upstream; on
            // the normal path the walk below runs instead, collecting
            // errors.
            let mut upstream = ScopeGuard::new(|| {
                if let Some(task) = &prior {
                    let _ = task.cancel();
                }
                if let Some(task) = &attached {
                    let _ = task.cancel();
                }
            });
            if let Some(finalizer) = finalizer {
                if let Err(raised) = finalizer(fin_error, fin_result) {
                    failure = Some(TaskError::Finalizer(raised));
                }
            }
            upstream.disarm();
        }

        if let Some(task) = &prior {
            let mut fallback = ScopeGuard::new(|| {
                if let Some(task) = &attached {
                    let _ = task.cancel();
                }
            });
            let canceled = task.cancel();
            fallback.disarm();
            if let Err(err) = canceled {
                failure.get_or_insert(err);
            }
        }

        if let Some(task) = &attached {
            if let Err(err) = task.cancel() {
                failure.get_or_insert(err);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Synchronous peek at the outcome: `Ok(None)` while Pending,
    /// `Ok(Some(result))` on success, `Err(error)` on error. Peeking an
    /// error counts as observing it — the unhandled-rejection hook will not
    /// fire for an error that was peeked.
    pub fn peek(&self) -> Result<Option<Val>, Val> {
        let state = self.state();
        if !state.is_settled() {
            return Ok(None);
        }
        if state.contains(State::ERROR) {
            self.remove_state(State::PENDING_REJECTION);
            Err(self.cell.error.borrow().clone())
        } else {
            Ok(Some(self.cell.result.borrow().clone()))
        }
    }

    /// Consumes a settled task's outcome in place, without creating a
    /// successor. Combinator intake uses this for inputs that settled before
    /// the combination was built.
    pub(crate) fn consume_settled(&self) -> (bool, Val) {
        debug_assert!(self.is_settled());
        self.insert_state(State::CONSUMED);
        self.remove_state(State::PENDING_REJECTION);
        let errored = self.is_error();
        let value = if errored {
            self.cell.error.borrow().clone()
        } else {
            self.cell.result.borrow().clone()
        };
        (errored, value)
    }

    pub(crate) fn has_finalizer(&self) -> bool {
        self.cell.finalizer.borrow().is_some()
    }

    pub(crate) fn set_finalizer(&self, finalizer: Finalizer) {
        *self.cell.finalizer.borrow_mut() = Some(finalizer);
    }

    pub(crate) fn downgrade(&self) -> WeakTask {
        WeakTask {
            cell: Rc::downgrade(&self.cell),
        }
    }

    pub(crate) fn same(&self, other: &Task) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    fn state(&self) -> State {
        self.cell.state.get()
    }

    fn insert_state(&self, flags: State) {
        let mut state = self.cell.state.get();
        state.insert(flags);
        self.cell.state.set(state);
    }

    fn remove_state(&self, flags: State) {
        let mut state = self.cell.state.get();
        state.remove(flags);
        self.cell.state.set(state);
    }
}

impl Default for Task {
    fn default() -> Self {
        Task::new()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.cell.id)
            .field("state", &self.cell.state.get())
            .finish_non_exhaustive()
    }
}
