//! `query-stream`: asynchronous query/streaming combinators with Sequential/Concurrent/Parallel
//! execution strategies (§1). Build a pipeline from a source (`empty`, `singleton`,
//! `from_enumerable`, `from_observable`), shape it with `select`/`where_`/`take`/`skip`/`concat`/
//! `flatten`/`join`, run it under a chosen discipline (`as_concurrent`/`as_parallel`/
//! `as_sequential`/`as_unordered`), and drain it with a terminal (`to_list`/`count`/`any`/
//! `for_each`).
//!
//! Every combinator is a concrete, independently testable struct implementing [`op::Operator<T>`]
//! rather than a facade over a boxed trait-object tree (`op` module docs explain why). Fusion —
//! collapsing `select(f).select(g)` into one node, or `from_enumerable(xs).take(3)` into a sliced
//! source instead of a wrapper — happens at construction time via ordinary Rust method-resolution
//! precedence, not a runtime capability query.

pub mod config;
pub mod error;
pub mod op;
pub mod params;
pub mod query_stream;
pub mod runner;

pub use config::QueryStreamConfig;
pub use error::QueryError;
pub use op::flatten::FlattenExt;
pub use op::join::JoinExt;
pub use op::observable::{FnObservable, ObservableSource, Observer, Subscription};
pub use op::select_where::{SelectWhereExt, SelectWhereOutcome};
pub use op::structural::StructuralExt;
pub use op::Operator;
pub use params::{ExecMode, ExecParams};
pub use query_stream::{empty, from_enumerable, from_observable, from_observable_with_config, singleton, ModeExt, TerminalExt};

/// Re-exports the combinator surface in one place, the way a caller setting up a new pipeline
/// file typically wants it: `use query_stream::prelude::*;`.
pub mod prelude {
    pub use crate::op::flatten::FlattenExt;
    pub use crate::op::join::JoinExt;
    pub use crate::op::select_where::SelectWhereExt;
    pub use crate::op::structural::StructuralExt;
    pub use crate::op::Operator;
    pub use crate::query_stream::{empty, from_enumerable, from_observable, from_observable_with_config, singleton, ModeExt, TerminalExt};
}
