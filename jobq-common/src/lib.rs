//! Shared types for the jobq runtime.
//!
//! This crate has no queue or store logic of its own — it holds the three
//! things every other `jobq-*` crate depends on: the error taxonomy (C1),
//! the producer-facing message contract (C2), and the nanosecond time
//! helpers the score encoding in `jobq-queue` is built on.

pub mod error;
pub mod message;
pub mod time;

pub use error::{ProcessingError, Signal};
pub use message::{DecodeError, Message};
