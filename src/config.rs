//! Crate-level tunables. There is no external configuration file format here — a
//! `Default`-derived struct is the whole configuration surface.

/// Default behavior for knobs that individual combinators let callers override per call
/// (e.g. `from_observable`'s explicit `max_buffer` argument always wins over this when positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryStreamConfig {
    /// Buffer size used by [`crate::from_observable_with_config`] (and
    /// [`crate::op::observable::FromObservableOp::with_config`]) when the caller passes a
    /// non-positive `max_buffer`. `None` means unbounded, matching the public contract of
    /// `max_buffer <= 0`. Plain [`crate::from_observable`] always builds this struct via
    /// `Default`, so it stays unbounded in that case.
    pub default_observable_buffer: Option<usize>,
}

impl Default for QueryStreamConfig {
    fn default() -> Self {
        QueryStreamConfig {
            default_observable_buffer: None,
        }
    }
}
