//! Priority queue with visibility-timeout recovery (C4), plus the envelope,
//! DLQ record, and sweeper types it's built from.

pub mod config;
pub mod dlq;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod sweeper;

pub use config::QueueConfig;
pub use dlq::DlqRecord;
pub use envelope::{Envelope, EnvelopeId};
pub use error::QueueError;
pub use queue::PriorityQueue;
pub use sweeper::StaleSweeper;
