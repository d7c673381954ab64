//! Drives a resumable procedure as a task, treating each yielded task as a
//! suspension point.
//!
//! A [`Procedure`] is the abstract shape of a coroutine: resume it with a
//! value (or inject an error at the suspension point) and it answers with
//! the next [`Step`], or raises. Hand-written state machines are the
//! expected implementation; anything exposing "resume with value", "resume
//! with error" and "request termination" fits.

use crate::task::{Task, Val, WeakTask};
use crate::utils::ScopeGuard;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// What a procedure is resumed with.
pub enum Resume {
    /// Initial entry; nothing has been produced yet.
    Start,
    /// The payload of the previous step — a yielded plain value fed straight
    /// back, or the result of a yielded task.
    Value(Val),
    /// An error injected at the suspension point: the yielded task settled
    /// with this in its error slot. The procedure may recover or rethrow.
    Error(Val),
}

/// What a procedure produces per resumption.
pub enum Step {
    /// An intermediate value. A [`Val::Task`] suspends the driver until the
    /// task settles; any other value is fed back immediately.
    Yield(Val),
    /// An intermediate nested procedure: driven recursively and treated as a
    /// yielded task.
    YieldProc(Box<dyn Procedure>),
    /// Completion. The value may itself be a task, in which case the overall
    /// outcome chains onto it.
    Done(Val),
    /// Completion with a nested procedure as the final value.
    DoneProc(Box<dyn Procedure>),
}

/// A cooperative producer of steps.
pub trait Procedure {
    /// Advances to the next step. Raising (`Err`) fails the overall task
    /// with the raised value.
    fn resume(&mut self, input: Resume) -> Result<Step, Val>;

    /// Asks the procedure to run its cleanup path. Called when the driver's
    /// output task is canceled before completion; an error here propagates
    /// as the cancel outcome.
    fn terminate(&mut self) -> Result<(), Val> {
        Ok(())
    }
}

impl Procedure for Box<dyn Procedure> {
    fn resume(&mut self, input: Resume) -> Result<Step, Val> {
        (**self).resume(input)
    }

    fn terminate(&mut self) -> Result<(), Val> {
        (**self).terminate()
    }
}

struct Driver {
    out: WeakTask,
    procedure: RefCell<Option<Box<dyn Procedure>>>,
    /// The chained task currently parked on a yielded task, canceled when
    /// the driver is canceled.
    suspension: RefCell<Option<Task>>,
}

/// Runs `procedure` as a task.
///
/// Plain yields are driven in a loop — a procedure that yields non-task
/// values in a tight run does not consume stack. Yielded tasks suspend the
/// driver; their outcome (or error) re-enters the procedure at the yield
/// point. Canceling the returned task terminates the procedure and cancels
/// the live suspension, synchronously.
pub fn drive(procedure: impl Procedure + 'static) -> Task {
    drive_boxed(Box::new(procedure))
}

fn drive_boxed(procedure: Box<dyn Procedure>) -> Task {
    let out = Task::new();
    let driver = Rc::new(Driver {
        out: out.downgrade(),
        procedure: RefCell::new(Some(procedure)),
        suspension: RefCell::new(None),
    });

    let shared = driver.clone();
    out.set_finalizer(Box::new(move |_error, _result| {
        let procedure = shared.procedure.borrow_mut().take();
        let suspension = shared.suspension.borrow_mut().take();
        // The suspension goes down even if terminate panics.
        let mut unsuspend = ScopeGuard::new(|| {
            if let Some(task) = &suspension {
                let _ = task.cancel();
            }
        });
        let terminated = match procedure {
            Some(mut procedure) => procedure.terminate(),
            None => Ok(()),
        };
        unsuspend.disarm();
        let mut failure = terminated.err();
        if let Some(task) = &suspension {
            if let Err(err) = task.cancel() {
                failure.get_or_insert(Val::from(err));
            }
        }
        match failure {
            Some(raised) => Err(raised),
            None => Ok(()),
        }
    }));

    step(&driver, Resume::Start);
    out
}

fn step(driver: &Rc<Driver>, input: Resume) {
    let mut input = input;
    loop {
        let Some(out) = driver.out.upgrade() else { return };
        if out.is_settled() {
            // Canceled (or externally settled) mid-drive; stop producing.
            return;
        }
        // Taken out of the cell while on the stack, so a re-entrant cancel
        // sees an empty slot instead of a borrow conflict.
        let Some(mut procedure) = driver.procedure.borrow_mut().take() else {
            return;
        };
        match procedure.resume(input) {
            Err(raised) => {
                let _ = out.settle(raised, Val::Null);
                return;
            }
            Ok(Step::Done(value)) => {
                trace!(task = %out.id(), "procedure done");
                let _ = out.settle(Val::Null, value);
                return;
            }
            Ok(Step::DoneProc(nested)) => {
                let _ = out.settle(Val::Null, Val::Task(drive_boxed(nested)));
                return;
            }
            Ok(Step::Yield(Val::Task(task))) => {
                *driver.procedure.borrow_mut() = Some(procedure);
                suspend(driver, task);
                return;
            }
            Ok(Step::YieldProc(nested)) => {
                *driver.procedure.borrow_mut() = Some(procedure);
                let task = drive_boxed(nested);
                suspend(driver, task);
                return;
            }
            Ok(Step::Yield(value)) => {
                *driver.procedure.borrow_mut() = Some(procedure);
                input = Resume::Value(value);
            }
        }
    }
}

fn suspend(driver: &Rc<Driver>, awaited: Task) {
    let shared = driver.clone();
    let fed = awaited.map(move |error, result| {
        shared.suspension.borrow_mut().take();
        let input = if error.is_null() {
            Resume::Value(result)
        } else {
            Resume::Error(error)
        };
        step(&shared, input);
        Ok(Val::Null)
    });
    match fed {
        Ok(fed) => {
            // A cancel that arrived while the procedure was mid-resume has
            // already emptied the driver; don't park a fresh suspension.
            if driver.out.upgrade().is_none_or(|out| out.is_settled()) {
                let _ = fed.cancel();
                return;
            }
            *driver.suspension.borrow_mut() = Some(fed);
        }
        Err(err) => {
            // The yielded task belongs to another consumer; the procedure
            // cannot make progress.
            if let Some(mut procedure) = driver.procedure.borrow_mut().take() {
                let _ = procedure.terminate();
            }
            if let Some(out) = driver.out.upgrade() {
                let _ = out.settle(Val::from(err), Val::Null);
            }
        }
    }
}

#[cfg(test)]
mod tests;
