use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::errors::Cancelled;

///
/// Cooperative cancellation for long running reads and engine runs.
///
/// Clones share the same flag, so a caller can hand a clone to a worker and
/// cancel it from another thread. An optional deadline turns the token into a
/// timeout.
///
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Token that reports [`Cancelled::TimedOut`] once `timeout` has elapsed.
    ///
    pub fn with_timeout(timeout: Duration) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(Cancelled::ByCaller);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::TimedOut),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let worker = token.clone();
        assert_eq!(worker.check(), Ok(()));

        token.cancel();
        assert_eq!(worker.check(), Err(Cancelled::ByCaller));
    }

    #[rstest]
    fn test_timeout() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert_eq!(token.check(), Err(Cancelled::TimedOut));

        let token = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}
