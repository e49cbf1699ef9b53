//! In-process backend.
//!
//! Every operation runs under one async mutex, which makes it a
//! single-writer arbiter: claim's scan, lock, and transition cannot
//! interleave with another caller's.

mod store;

pub use store::MemoryStore;
