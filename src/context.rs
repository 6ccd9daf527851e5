//! Cancellation and deadlines for blocking node operations

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Carries a cancellation token and an optional deadline.
///
/// Clones share the token, so cancelling one cancels all of them.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Never cancelled, no deadline
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` until it completes, the context is cancelled or the
    /// deadline passes, whichever comes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ContextError::Cancelled),
            _ = deadline => Err(ContextError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
