use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// Per-request context: correlation id, optional deadline and cancellation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub deadline: Option<Instant>,
    pub cancellation: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Run one store call, bounded by the request deadline and `query_timeout`.
    ///
    /// Timeouts and cancellation abort the call; nothing is retried here.
    pub async fn guard<T, F>(
        &self,
        operation: &'static str,
        query_timeout: Duration,
        call: F,
    ) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let query_deadline = Instant::now() + query_timeout;
        let deadline = match self.deadline {
            Some(deadline) => deadline.min(query_deadline),
            None => query_deadline,
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(StoreError::Cancelled(operation)),
            outcome = tokio::time::timeout_at(deadline, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(operation)),
            },
        }
    }
}
