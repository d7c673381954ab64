use std::cell::Cell;
use std::fmt;
use std::num::NonZeroU64;

/// An opaque ID that uniquely identifies a task among all tasks created on
/// the current thread.
///
/// IDs are handed out in creation order and never reused within a thread.
/// They exist for diagnostics: `Debug` output and `tracing` event fields.
/// The counter is thread-local because the whole library is thread-confined;
/// there is nothing to synchronize.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

impl TaskId {
    pub(crate) fn next() -> Self {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            TaskId(NonZeroU64::new(id).expect("task id counter starts at 1"))
        })
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
