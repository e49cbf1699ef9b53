//! Secret handling utilities.
//!
//! Re-exports the secrecy types lidex wraps its connection string in.

pub use secrecy::{ExposeSecret, SecretString};
