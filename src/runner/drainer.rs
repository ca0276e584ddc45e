//! Placeholder for a generic "drainer" shared by the runners in this module: a background task
//! that polls a parent stream to completion and forwards each item into an unbounded channel
//! unchanged, exposed to the consumer as a plain `Stream`.
//!
//! In practice every spawn-per-task runner in this crate (`join`'s two side-tasks, `flatten`'s
//! outer driver) does more than bare forwarding at the point it reads from its source — `join`
//! updates a shared hash table and emits derived pairs, `flatten` dispatches a fresh spawned task
//! per item rather than relaying the item itself — so none of them are actually expressible in
//! terms of a pure forward-unchanged primitive. There is currently nothing in this crate with
//! that exact shape; this module is empty until one shows up.
