//! Request metrics that aggregate across concurrently handled requests.
//!
//! | Type | Records | Middleware hook |
//! |---|---|---|
//! | [`Counter`] | requests seen | after the handler returns |
//! | [`Timer`] / [`Timing`] | count + total handler time | after the handler returns |
//! | [`KeyedCounter`] | requests per resolved identity | before the handler runs |
//!
//! Every metric is a cheaply clonable handle around state guarded by its
//! own lock. Put one clone in the middleware [`Chain`](crate::middleware::Chain),
//! keep another to read from, or hand it to an [`Emitter`] to report it on
//! a schedule.

mod counter;
mod emit;
mod keyed;
mod timer;

pub use counter::Counter;
pub use emit::{Emission, Emitter, EmitterConfig, ReadMode, Source};
pub use keyed::{KeyedCounter, KeyedCounterConfig, KeyedSnapshot, Resolver};
pub use timer::{Timer, TimerSnapshot, Timing};
