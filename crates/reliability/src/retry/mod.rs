//! Retry queue for failed operations

pub mod backoff;
pub mod coordinator;
pub mod executor;
pub mod operation;

pub use backoff::{Backoff, JitterPolicy};
pub use coordinator::{ReportOutcome, RetryCoordinator};
pub use executor::{Dispatch, ExecutorError, FnExecutor, OperationExecutor, executor_fn};
pub use operation::{
    Metadata, MetadataValue, OperationRecord, OperationStatus, OperationType, Priority,
    RetryOperation, RetryQueueSnapshot, RetryRequest,
};
