use bitflags::bitflags;

bitflags! {
    /// Task lifecycle state.
    ///
    /// Exactly one of `PENDING`, `ERROR`, `SUCCESS` is set at any time; the
    /// remaining bits are orthogonal bookkeeping:
    ///
    /// - `PENDING_REJECTION`: the task entered `ERROR` and no consumer has
    ///   observed the outcome yet. Checked after every notification flush.
    /// - `CONSUMED`: a unique downstream consumer exists. Chaining a consumed
    ///   task again is an error.
    /// - `MAPPING`: the task's mapper is on the stack right now. Settle and
    ///   cancel calls arriving while this bit is set are dropped, which is
    ///   what keeps a self-settling mapper from recursing forever.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct State: u8 {
        const PENDING = 1;
        const ERROR = 1 << 1;
        const SUCCESS = 1 << 2;

        const PENDING_REJECTION = 1 << 3;
        const CONSUMED = 1 << 4;
        const MAPPING = 1 << 5;
    }
}

impl State {
    pub(crate) fn is_settled(self) -> bool {
        self.intersects(State::ERROR | State::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_means_error_or_success() {
        assert!(!State::PENDING.is_settled());
        assert!(State::ERROR.is_settled());
        assert!(State::SUCCESS.is_settled());
        assert!((State::ERROR | State::PENDING_REJECTION).is_settled());
        assert!(!(State::PENDING | State::CONSUMED | State::MAPPING).is_settled());
    }
}
