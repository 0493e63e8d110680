//! Transactional outbox
//!
//! Side effects of writes (cache invalidation, notifications) are recorded
//! as rows in `outbox_jobs` inside the writing transaction, then executed
//! later by a polling drainer.

mod drainer;
mod jobs;

pub use drainer::{run, JobExecutor, OutboxQueue};
pub use jobs::{idempotency_key, Job, OutboxExecutor};
