use sqlbench_store::{EcommerceDb, StoreError};
use sqlbench_types::Row;

/// A statement that could not be run. `message` is fed back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
	pub message: String,
}

impl ExecutionError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

impl From<StoreError> for ExecutionError {
	fn from(e: StoreError) -> Self {
		ExecutionError::new(e.to_string())
	}
}

/// Runs candidate SQL. Implementations may be called many times on the same connection.
pub trait QueryExecutor: Send + Sync {
	fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError>;
}

impl QueryExecutor for EcommerceDb {
	fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
		Ok(self.query_rows(sql)?)
	}
}
