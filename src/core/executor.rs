use crate::core::catalog::normalize_rows;
use crate::domain::model::AggregateRow;
use crate::domain::ports::{ExecutionHandle, QueryStore, StoreResult};
use crate::domain::query::AggregateQuery;
use crate::utils::error::{ExecutionError, ExecutionErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first for transient failures.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Runs planned aggregate queries against an injected store.
pub struct AggregationExecutor<S: QueryStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: QueryStore> Clone for AggregationExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}

impl<S: QueryStore> AggregationExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Executes one aggregate. Zero rows is a successful, empty result.
    pub async fn execute(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>, ExecutionError> {
        let kind = query.kind();
        if !query.predicates.is_aligned() {
            return Err(ExecutionError {
                aggregate: kind,
                kind: ExecutionErrorKind::NonTransient,
                attempts: 0,
                message: format!(
                    "{} predicate(s) but {} parameter(s)",
                    query.predicates.predicates.len(),
                    query.predicates.params.len()
                ),
            });
        }

        let max_attempts = self.retry.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.attempt(query).await {
                Ok(rows) => {
                    let rows = normalize_rows(&query.definition, rows);
                    tracing::debug!(
                        "{} returned {} row(s) in {:?} (attempt {})",
                        kind,
                        rows.len(),
                        started.elapsed(),
                        attempt
                    );
                    return Ok(rows);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        "{} attempt {}/{} failed transiently: {}",
                        kind,
                        attempt,
                        max_attempts,
                        e
                    );
                }
                Err(e) => {
                    let error_kind = if e.is_transient() {
                        ExecutionErrorKind::Transient
                    } else {
                        ExecutionErrorKind::NonTransient
                    };
                    if error_kind == ExecutionErrorKind::NonTransient {
                        tracing::error!("{} failed with a non-transient error: {}", kind, e);
                    } else {
                        tracing::error!("{} gave up after {} attempt(s): {}", kind, attempt, e);
                    }
                    return Err(ExecutionError {
                        aggregate: kind,
                        kind: error_kind,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// One attempt on one handle; the handle is dropped, and so returned to
    /// the pool, on every exit path.
    async fn attempt(&self, query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>> {
        let mut handle = self.store.acquire().await?;
        handle.run(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::AggregateCatalog;
    use crate::domain::model::{AggregateKind, FilterSpec, FilterValue, Gender, GroupKey};
    use crate::utils::error::StoreError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Script {
        outcomes: Mutex<VecDeque<StoreResult<Vec<AggregateRow>>>>,
        calls: AtomicUsize,
        outstanding: AtomicUsize,
    }

    /// Replays scripted outcomes and tracks handles that are out of the pool.
    struct ScriptedStore(Arc<Script>);

    struct ScriptedHandle(Arc<Script>);

    impl Drop for ScriptedHandle {
        fn drop(&mut self) {
            self.0.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl QueryStore for ScriptedStore {
        type Handle = ScriptedHandle;

        async fn acquire(&self) -> StoreResult<ScriptedHandle> {
            self.0.outstanding.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedHandle(Arc::clone(&self.0)))
        }
    }

    #[async_trait]
    impl ExecutionHandle for ScriptedHandle {
        async fn run(&mut self, _query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            self.0
                .outcomes
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn gender_query() -> AggregateQuery {
        AggregateCatalog::default()
            .plan(AggregateKind::ByGender, &FilterSpec::new())
            .unwrap()
    }

    fn executor(
        outcomes: Vec<StoreResult<Vec<AggregateRow>>>,
    ) -> (AggregationExecutor<ScriptedStore>, Arc<Script>) {
        let script = Arc::new(Script {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        });
        let store = ScriptedStore(Arc::clone(&script));
        (AggregationExecutor::new(Arc::new(store)), script)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let rows = vec![AggregateRow::players(GroupKey::Gender(Gender::Male), 3)];
        let (executor, store) = executor(vec![
            Err(StoreError::Unavailable("reset".into())),
            Err(StoreError::Timeout("slow".into())),
            Ok(rows.clone()),
        ]);

        let result = executor.execute(&gender_query()).await.unwrap();
        assert_eq!(result, rows);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.outstanding.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_give_up_after_two_retries() {
        let (executor, store) = executor(vec![
            Err(StoreError::Unavailable("1".into())),
            Err(StoreError::Unavailable("2".into())),
            Err(StoreError::Unavailable("3".into())),
            Ok(Vec::new()),
        ]);

        let err = executor.execute(&gender_query()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.attempts, 3);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.outstanding.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_not_retried() {
        let (executor, store) = executor(vec![
            Err(StoreError::Malformed("syntax".into())),
            Ok(Vec::new()),
        ]);

        let err = executor.execute(&gender_query()).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::NonTransient);
        assert_eq!(err.attempts, 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.outstanding.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_result_is_success() {
        let (executor, _store) = executor(vec![Ok(Vec::new())]);
        let rows = executor.execute(&gender_query()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_misaligned_parameters_never_reach_the_store() {
        let (executor, store) = executor(vec![]);
        let mut query = gender_query();
        query
            .predicates
            .params
            .push(FilterValue::Id("stray".into()));

        let err = executor.execute(&query).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::NonTransient);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
