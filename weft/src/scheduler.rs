use crate::queue::Queue;
use crate::task::Task;
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::trace;

/// The host "run soon" hook: invokes the supplied callback asynchronously,
/// but as soon as feasible — a next-tick primitive, a message-channel port,
/// a minimum-delay timer. The only contract is "after the current call stack
/// unwinds".
pub type RunSoon = Box<dyn Fn(Box<dyn FnOnce()>)>;

/// Defers notification delivery for settled tasks.
///
/// Settling a task never runs its successor's mapper on the settling stack:
/// the task is pushed here instead and delivered on the next drain. That
/// linearization is what lets `map` always return before any mapper runs.
///
/// A scheduler built with [`Scheduler::new`] is manual — someone must call
/// [`Scheduler::tick`] (or the crate-level [`crate::tick`]) to drain it,
/// which is the natural shape for tests and for embedders that own their own
/// loop. [`Scheduler::with_hook`] arms a host callback instead: the first
/// push after a quiescent period schedules exactly one deferred drain.
///
/// Beyond FIFO order of `push` calls there are no fairness or priority
/// guarantees.
pub struct Scheduler {
    me: Weak<Scheduler>,
    pending: RefCell<Queue<Task>>,
    armed: Cell<bool>,
    hook: Option<RunSoon>,
}

impl Scheduler {
    /// A manual scheduler, drained by explicit [`Scheduler::tick`] calls.
    pub fn new() -> Rc<Self> {
        Self::build(None)
    }

    /// A scheduler that asks `hook` to run the drain once whenever the queue
    /// goes non-empty.
    pub fn with_hook(hook: RunSoon) -> Rc<Self> {
        Self::build(Some(hook))
    }

    fn build(hook: Option<RunSoon>) -> Rc<Self> {
        Rc::new_cyclic(|me| Scheduler {
            me: me.clone(),
            pending: RefCell::new(Queue::new()),
            armed: Cell::new(false),
            hook,
        })
    }

    /// Queues a settled task for notification flush.
    pub(crate) fn push(&self, task: Task) {
        trace!(task = %task.id(), "scheduler push");
        self.pending.borrow_mut().push(task);
        if !self.armed.replace(true) {
            self.arm();
        }
    }

    fn arm(&self) {
        if let Some(hook) = &self.hook {
            let me = self.me.clone();
            hook(Box::new(move || {
                if let Some(scheduler) = me.upgrade() {
                    scheduler.tick();
                }
            }));
        }
    }

    /// Synchronously drains the queue, delivering each task's pending
    /// notification in FIFO order.
    ///
    /// Draining is re-entrant and idempotent: tasks pushed while a drain is
    /// running are picked up by the same drain, and ticking an empty
    /// scheduler does nothing. If delivery panics (e.g. the default
    /// unhandled-rejection hook rethrowing), the remaining entries stay
    /// queued and the host callback is re-armed before the panic propagates;
    /// programmer errors are not swallowed.
    pub fn tick(&self) {
        self.armed.set(false);
        let mut rearm = ScopeGuard::new(|| {
            if !self.pending.borrow().is_empty() && !self.armed.replace(true) {
                self.arm();
            }
        });
        loop {
            let next = self.pending.borrow_mut().pop();
            match next {
                Some(task) => task.finish_pending(),
                None => break,
            }
        }
        rearm.disarm();
    }

    /// Empties the queue without delivering notifications.
    pub fn clear(&self) {
        *self.pending.borrow_mut() = Queue::new();
        self.armed.set(false);
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskError, Val};
    use crate::test_utils::Spy;

    #[test]
    fn test_tick_drains_in_fifo_order() -> Result<(), TaskError> {
        let scheduler = Scheduler::new();
        let spy = Spy::new();
        for label in ["first", "second", "third"] {
            let task = Task::with_scheduler(scheduler.clone());
            task.set_finalizer(spy.finalizer_with(label));
            task.settle(Val::Null, label)?;
        }
        assert_eq!(spy.count(), 0);
        scheduler.tick();
        assert_eq!(spy.labels(), vec!["first", "second", "third"]);
        assert!(scheduler.is_empty());
        Ok(())
    }

    #[test]
    fn test_tick_on_empty_is_a_noop() {
        let scheduler = Scheduler::new();
        scheduler.tick();
        scheduler.tick();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_clear_drops_notifications() -> Result<(), TaskError> {
        let scheduler = Scheduler::new();
        let spy = Spy::new();
        let task = Task::with_scheduler(scheduler.clone());
        task.set_finalizer(spy.finalizer());
        task.settle(Val::Null, "ignored")?;
        assert_eq!(scheduler.len(), 1);
        scheduler.clear();
        scheduler.tick();
        assert_eq!(spy.count(), 0);
        Ok(())
    }

    #[test]
    fn test_hook_is_armed_once_per_quiescent_period() -> Result<(), TaskError> {
        use std::cell::RefCell;
        use std::rc::Rc;

        let callbacks: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = callbacks.clone();
        let scheduler = Scheduler::with_hook(Box::new(move |run| sink.borrow_mut().push(run)));

        let spy = Spy::new();
        for _ in 0..3 {
            let task = Task::with_scheduler(scheduler.clone());
            task.set_finalizer(spy.finalizer());
            task.settle(Val::Null, 1i64)?;
        }
        // Three pushes, one deferred drain.
        assert_eq!(callbacks.borrow().len(), 1);

        let run = callbacks.borrow_mut().pop().unwrap();
        run();
        assert_eq!(spy.count(), 3);

        // The next push after the drain arms the hook again.
        let task = Task::with_scheduler(scheduler.clone());
        task.set_finalizer(spy.finalizer());
        task.settle(Val::Null, 2i64)?;
        assert_eq!(callbacks.borrow().len(), 1);
        Ok(())
    }
}
