use std::time::Duration;

use tokio::time::Instant;

use super::{SyncEntity, SyncError, SyncResult};

/// Overall time budget for one sync run.
///
/// Checked between requests only; a call already in flight is never cut short.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Fail with `DeadlineExceeded` if the budget is spent before `page`.
    pub fn check(&self, entity: SyncEntity, page: u32) -> SyncResult<()> {
        if self.is_expired() {
            return Err(SyncError::DeadlineExceeded {
                entity,
                page,
                limit: self.limit,
            });
        }
        Ok(())
    }
}
