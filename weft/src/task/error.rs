use crate::task::Val;

/// A centralized error type for task and combinator operations.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// A task was settled with itself in the error or result slot. A task
    /// can never wait on its own outcome.
    #[error("a task cannot be settled with itself")]
    Cyclic,

    /// The task already has its unique downstream consumer. Each task may be
    /// chained (or converted to a future) exactly once; share an outcome with
    /// [`crate::Task::weak`] instead.
    #[error("task is already consumed by another successor")]
    Consumed,

    /// A finalizer raised while cancelation was tearing the chain down. The
    /// rest of the upstream walk still ran; the raised value is preserved
    /// here.
    #[error("finalizer raised during cancelation: {0:?}")]
    Finalizer(Val),
}

impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Cyclic, Self::Cyclic)
                | (Self::Consumed, Self::Consumed)
                | (Self::Finalizer(_), Self::Finalizer(_))
        )
    }
}

impl From<TaskError> for Val {
    fn from(err: TaskError) -> Val {
        Val::of(err)
    }
}
