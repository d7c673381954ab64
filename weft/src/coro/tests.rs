use super::*;
use crate::task::TaskError;
use crate::test_utils::{capture_rejections, text, Spy};
use crate::tick;
use std::cell::Cell;
use std::rc::Rc;

/// Yields plain values in a tight loop, then completes. Exists to prove the
/// driver iterates instead of recursing.
struct Countdown {
    remaining: u32,
}

impl Procedure for Countdown {
    fn resume(&mut self, _input: Resume) -> Result<Step, Val> {
        if self.remaining == 0 {
            return Ok(Step::Done(Val::from("landed")));
        }
        self.remaining -= 1;
        Ok(Step::Yield(Val::from(i64::from(self.remaining))))
    }
}

#[test]
fn test_plain_yields_drive_iteratively() {
    let out = drive(Countdown { remaining: 50_000 });
    // Completed synchronously, bounded stack.
    assert_eq!(out.peek().unwrap().unwrap(), "landed");
    tick();
}

/// Parks on a yielded task, then builds its completion from the fed-back
/// result.
struct Greeter {
    gate: Task,
    stage: u8,
}

impl Procedure for Greeter {
    fn resume(&mut self, input: Resume) -> Result<Step, Val> {
        match self.stage {
            0 => {
                self.stage = 1;
                Ok(Step::Yield(Val::Task(self.gate.clone())))
            }
            _ => match input {
                Resume::Value(v) => Ok(Step::Done(Val::from(format!("{} indeed", text(&v))))),
                _ => Err(Val::from("expected a value")),
            },
        }
    }
}

#[test]
fn test_yielded_task_suspends_the_procedure() -> Result<(), TaskError> {
    let gate = Task::new();
    let out = drive(Greeter {
        gate: gate.clone(),
        stage: 0,
    });
    assert!(out.is_pending());

    gate.settle(Val::Null, "quiet")?;
    tick();
    assert_eq!(out.peek().unwrap().unwrap(), "quiet indeed");
    Ok(())
}

/// Scenario: a yielded task errors, the procedure catches the injected error
/// and recovers through a second yielded task.
struct Recovering {
    stage: u8,
}

impl Procedure for Recovering {
    fn resume(&mut self, input: Resume) -> Result<Step, Val> {
        match self.stage {
            0 => {
                self.stage = 1;
                Ok(Step::Yield(Val::Task(Task::from_error("boom")?)))
            }
            1 => {
                self.stage = 2;
                match input {
                    // Caught; recover with a fresh task.
                    Resume::Error(_) => Ok(Step::Yield(Val::Task(Task::from_result("ok")?))),
                    _ => Err(Val::from("expected an injected error")),
                }
            }
            _ => match input {
                Resume::Value(v) => Ok(Step::Done(v)),
                _ => Err(Val::from("expected a value")),
            },
        }
    }
}

#[test]
fn test_injected_error_is_catchable() {
    let seen = capture_rejections();
    let out = drive(Recovering { stage: 0 });
    tick();
    assert_eq!(out.peek().unwrap().unwrap(), "ok");
    assert_eq!(seen.borrow().len(), 0);
}

/// Parks forever on a gate; records whether its cleanup path ran.
struct Sleeper {
    gate: Task,
    started: bool,
    terminated: Rc<Cell<bool>>,
}

impl Procedure for Sleeper {
    fn resume(&mut self, _input: Resume) -> Result<Step, Val> {
        if !self.started {
            self.started = true;
            return Ok(Step::Yield(Val::Task(self.gate.clone())));
        }
        Ok(Step::Done(Val::Null))
    }

    fn terminate(&mut self) -> Result<(), Val> {
        self.terminated.set(true);
        Ok(())
    }
}

#[test]
fn test_cancel_terminates_procedure_and_suspension() -> Result<(), TaskError> {
    let seen = capture_rejections();
    let gate = Task::new();
    let cleanup = Spy::new();
    gate.set_finalizer(cleanup.finalizer_with("gate closed"));
    let terminated = Rc::new(Cell::new(false));

    let out = drive(Sleeper {
        gate: gate.clone(),
        started: false,
        terminated: terminated.clone(),
    });
    assert!(out.is_pending());

    out.cancel()?;
    // Termination and upstream cleanup are synchronous.
    assert!(terminated.get());
    assert!(gate.is_error());
    assert_eq!(cleanup.labels(), vec!["gate closed"]);
    assert!(out.peek().unwrap_err().is_canceled());

    tick();
    assert_eq!(seen.borrow().len(), 0);
    Ok(())
}

struct Faulty;

impl Procedure for Faulty {
    fn resume(&mut self, _input: Resume) -> Result<Step, Val> {
        Err(Val::from("bang"))
    }
}

#[test]
fn test_procedure_error_fails_the_task() {
    let out = drive(Faulty);
    assert_eq!(out.peek().unwrap_err(), "bang");
    tick();
}

/// Delegates to a nested procedure and decorates its result.
struct Outer {
    stage: u8,
}

impl Procedure for Outer {
    fn resume(&mut self, input: Resume) -> Result<Step, Val> {
        match self.stage {
            0 => {
                self.stage = 1;
                Ok(Step::YieldProc(Box::new(Countdown { remaining: 3 })))
            }
            _ => match input {
                Resume::Value(v) => Ok(Step::Done(Val::from(format!("outer saw {}", text(&v))))),
                _ => Err(Val::from("expected the nested result")),
            },
        }
    }
}

#[test]
fn test_nested_procedure_is_driven_recursively() {
    let out = drive(Outer { stage: 0 });
    tick();
    assert_eq!(out.peek().unwrap().unwrap(), "outer saw landed");
}
