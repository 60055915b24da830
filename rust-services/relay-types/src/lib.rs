//! Relay Types
//!
//! Shared data model and error taxonomy used across the stream relay
//! services: stream jobs, destination status, outcome records.

pub mod error;
pub mod job;
pub mod outcome;

pub use error::*;
pub use job::*;
pub use outcome::*;
