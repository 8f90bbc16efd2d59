//! TaskStore - generic persistent state management.
//!
//! A `Store<T>` durably keeps a collection of records of a single type `T:
//! Record` in a directory: a JSONL append log for durability, a SQLite
//! secondary index for filtered lookups, and an in-memory cache for reads.
//! It underlies every durable registry in the workspace - the project
//! registry, per-project task trackers, and the implementation plan store -
//! so they share one tested persistence path instead of each hand-rolling
//! JSON-file I/O.
//!
//! `taskstore` knows nothing about projects, tasks, or plans; those types
//! live in `forgecore` and implement [`Record`] themselves.

pub mod atomic;
pub mod cli;
pub mod debounce;
mod dynamic;
mod hash;
mod record;
mod store;
mod time;

pub use atomic::{atomic_write, atomic_write_json};
pub use debounce::DebouncedWriter;
pub use dynamic::DynamicRecord;
pub use hash::content_hash;
pub use record::{Filter, FilterOp, IndexValue, Record};
pub use store::Store;
pub use time::now_ms;
