//! Execution parameters carried through a pipeline and rewritten by mode-switching operators.

/// The execution discipline a node (and everything upstream of it, once rebound) runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecMode {
    /// No overlap: each item's work completes before the next one starts.
    Sequential,
    /// Work overlaps cooperatively on the current executor.
    Concurrent,
    /// Work overlaps and user callbacks are additionally offloaded to a worker pool.
    Parallel,
}

impl ExecMode {
    pub fn is_sequential(self) -> bool {
        matches!(self, ExecMode::Sequential)
    }

    pub fn is_parallel(self) -> bool {
        matches!(self, ExecMode::Parallel)
    }
}

/// `{mode, ordered}`, rebound wholesale by `as_concurrent`/`as_parallel`/`as_sequential`/
/// `as_unordered` rather than inserted as a new pipeline node (see `Operator::with_params`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecParams {
    pub mode: ExecMode,
    pub ordered: bool,
}

impl ExecParams {
    pub const fn sequential() -> Self {
        ExecParams {
            mode: ExecMode::Sequential,
            ordered: true,
        }
    }

    pub fn with_mode(self, mode: ExecMode) -> Self {
        ExecParams { mode, ..self }
    }

    pub fn with_ordered(self, ordered: bool) -> Self {
        ExecParams { ordered, ..self }
    }
}

impl Default for ExecParams {
    fn default() -> Self {
        Self::sequential()
    }
}
