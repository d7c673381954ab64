//! Cancelable one-shot tasks.
//!
//! An alternative to conventional promises in which each pending unit of
//! work has exactly one consumer and can be canceled, with cleanup
//! propagating both ways: upstream producers are torn down synchronously,
//! downstream consumers observe a catchable [`Val::Canceled`] error.
//!
//! # Chaining
//!
//! ```
//! use weft::{Task, Val};
//!
//! # fn main() -> Result<(), weft::TaskError> {
//! let greeting = Task::from_result("hello")?
//!     .map_ok(|v| Ok(Val::from(format!("{} world", v.downcast_ref::<String>().unwrap()))))?;
//! weft::tick();
//! assert_eq!(greeting.peek().unwrap().unwrap(), "hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Cancelation
//!
//! Canceling anywhere in a chain cleans up the producers immediately, while
//! the consumer side may catch the sentinel like any other error:
//!
//! ```
//! use weft::{Task, Val};
//!
//! # fn main() -> Result<(), weft::TaskError> {
//! let source = Task::new();
//! let consumer = source.map_err(|e| {
//!     if e.is_canceled() {
//!         Ok(Val::from("canceled"))
//!     } else {
//!         Err(e)
//!     }
//! })?;
//! consumer.cancel()?;
//! assert!(source.is_error());
//! weft::tick();
//! assert_eq!(consumer.peek().unwrap().unwrap(), "canceled");
//! # Ok(())
//! # }
//! ```
//!
//! # Scheduling
//!
//! Mappers never run on the stack that settled their input; delivery is
//! deferred through a [`Scheduler`]. The thread default scheduler is manual
//! — drain it with [`tick`] — and embedders with an event loop can build one
//! around a host "run soon" hook via [`Scheduler::with_hook`].

pub mod combine;
pub use combine::{all, race};

pub mod context;
pub use context::{
    default_scheduler, set_default_scheduler, set_rejection_hook, tick, RejectionHook,
};

pub mod coro;
pub use coro::{drive, Procedure, Resume, Step};

mod queue;

pub mod scheduler;
pub use scheduler::{RunSoon, Scheduler};

pub mod task;
pub use task::{Task, TaskError, TaskFuture, TaskId, Val};

mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
