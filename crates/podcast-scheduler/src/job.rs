use async_trait::async_trait;

/// Result of one job run. Any error is recorded, never propagated further.
pub type JobResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A unit of work the scheduler can invoke by id.
///
/// Targets are held in memory only; the persisted definition stores the
/// trigger and bookkeeping, so a target must be registered again by every
/// process that wants the job to run.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> JobResult;
}
