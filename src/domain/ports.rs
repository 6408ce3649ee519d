use crate::domain::model::AggregateRow;
use crate::domain::query::AggregateQuery;
use crate::utils::error::StoreError;
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Query-execution capability backed by a bounded pool of handles.
#[async_trait]
pub trait QueryStore: Send + Sync {
    type Handle: ExecutionHandle;

    /// Takes one handle from the pool. Dropping the handle returns it.
    async fn acquire(&self) -> StoreResult<Self::Handle>;
}

#[async_trait]
pub trait ExecutionHandle: Send {
    async fn run(&mut self, query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>>;
}
