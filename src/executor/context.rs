//! Query context: cancellation and deadlines.
//!
//! Queries are synchronous; long-running ones observe the context between
//! index-merge steps and between materialization batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cancellation token plus optional deadline attached to a query.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl QueryContext {
    /// A context that never cancels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Attaches an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attaches a shared cancellation flag; setting it aborts the query at
    /// the next checkpoint.
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Errors when the query was cancelled or the deadline passed.
    pub fn check(&self) -> Result<()> {
        if let Some(token) = &self.cancel {
            if token.load(Ordering::Relaxed) {
                return Err(Error::query("query cancelled"));
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::query("query deadline exceeded"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_passes() {
        assert!(QueryContext::new().check().is_ok());
    }

    #[test]
    fn test_cancel_token_aborts() {
        let token = Arc::new(AtomicBool::new(false));
        let ctx = QueryContext::new().with_cancel_token(token.clone());
        assert!(ctx.check().is_ok());
        token.store(true, Ordering::Relaxed);
        let err = ctx.check().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Query);
    }

    #[test]
    fn test_elapsed_deadline_aborts() {
        let ctx = QueryContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.check().is_err());
    }
}
