//! # lidex
//!
//! Persistence backend for a durable workflow engine.
//!
//! Stores workflow records, memoized step outputs, and scheduled naps, and
//! arbitrates which worker owns which workflow through lease-based claiming.
//! Postgres (`db::Db`) is the production backend; `memory::MemoryStore`
//! serves tests and embedded use.

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod model;
pub mod store;
pub mod telemetry;

pub use codec::Payload;
pub use error::{Error, Result};
pub use model::{Nap, Status, StepKey, Workflow};
pub use store::WorkflowStore;
