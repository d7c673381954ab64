//! Thread-local defaults: the scheduler new tasks attach to, and the
//! unhandled-rejection hook.
//!
//! Everything in this library is thread-confined, so "process-global" state
//! is per-thread state. Each accessor clones the stored handle out of the
//! thread-local before using it, so hooks are free to call back into the
//! library.

use crate::scheduler::Scheduler;
use crate::task::Task;
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

/// Invoked when a task entered `Error` and its notification flush completed
/// with no consumer having observed the outcome.
pub type RejectionHook = Rc<dyn Fn(&Task)>;

thread_local! {
    static SCHEDULER: RefCell<Rc<Scheduler>> = RefCell::new(Scheduler::new());
    static REJECTION: RefCell<RejectionHook> = RefCell::new(Rc::new(default_rejection));
}

/// The default unhandled-rejection hook rethrows synchronously: an error
/// nobody consumed is a programmer error, and it surfaces at the scheduler
/// drain that discovered it.
fn default_rejection(task: &Task) {
    match task.peek() {
        Err(error) => panic!("unhandled task rejection: {:?}", error),
        _ => panic!("unhandled task rejection (task {})", task.id()),
    }
}

/// The scheduler that [`Task::new`] attaches new tasks to.
pub fn default_scheduler() -> Rc<Scheduler> {
    SCHEDULER.with(|cell| cell.borrow().clone())
}

/// Replaces the thread default scheduler, returning the previous one.
/// Already-created tasks keep the scheduler they were built with.
pub fn set_default_scheduler(scheduler: Rc<Scheduler>) -> Rc<Scheduler> {
    SCHEDULER.with(|cell| mem::replace(&mut *cell.borrow_mut(), scheduler))
}

/// Replaces the unhandled-rejection hook, returning the previous one. The
/// hook receives the rejected task; [`Task::peek`] exposes the stored error.
pub fn set_rejection_hook(hook: RejectionHook) -> RejectionHook {
    REJECTION.with(|cell| mem::replace(&mut *cell.borrow_mut(), hook))
}

pub(crate) fn emit_rejection(task: &Task) {
    let hook = REJECTION.with(|cell| cell.borrow().clone());
    hook(task);
}

/// Drains the thread default scheduler. Shorthand for
/// `default_scheduler().tick()`.
pub fn tick() {
    default_scheduler().tick();
}
