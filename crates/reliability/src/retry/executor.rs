//! Executor capability and dispatch tickets.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::operation::OperationType;

/// Failure signalled by an executor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    message: String,
}

impl ExecutorError {
    /// Create an executor error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Failure message recorded on the operation
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ExecutorError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ExecutorError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Unit of work a queued operation stands for.
///
/// The coordinator never calls this itself; it hands the executor out inside a
/// [`Dispatch`] and the caller awaits it.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Perform the operation once
    async fn execute(&self) -> Result<(), ExecutorError>;
}

/// Adapter turning an async closure into an [`OperationExecutor`].
pub struct FnExecutor<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> OperationExecutor for FnExecutor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ExecutorError>> + Send + 'static,
{
    async fn execute(&self) -> Result<(), ExecutorError> {
        (self.f)().await
    }
}

/// Wrap an async closure as a shared executor
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn OperationExecutor>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ExecutorError>> + Send + 'static,
{
    Arc::new(FnExecutor { f })
}

/// Ticket for one retry attempt.
///
/// Returned by the coordinator when it marks an operation in flight. The
/// outcome must be handed back via `RetryCoordinator::report`.
#[derive(Clone)]
pub struct Dispatch {
    pub(crate) id: String,
    pub(crate) operation_type: OperationType,
    pub(crate) attempt: u32,
    pub(crate) generation: u64,
    pub(crate) executor: Arc<dyn OperationExecutor>,
}

impl Dispatch {
    /// Operation id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Category of the dispatched operation
    #[must_use]
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Attempt number this dispatch represents (1-based, counting the original failure)
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Run the executor
    pub async fn run(&self) -> Result<(), ExecutorError> {
        self.executor.execute().await
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("id", &self.id)
            .field("operation_type", &self.operation_type)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}
