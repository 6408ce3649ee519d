use crate::core::assembler::{AggregateFailure, AggregateOutcome};
use crate::core::cache::{CacheSettings, ResultCache};
use crate::core::catalog::AggregateCatalog;
use crate::core::executor::AggregationExecutor;
use crate::domain::model::{AggregateKind, AggregateRow, FilterSpec};
use crate::domain::ports::QueryStore;
use crate::utils::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tokio::time::Instant;

pub const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// Plans, caches and concurrently executes aggregates for one filter set.
pub struct StatsEngine<S: QueryStore> {
    catalog: AggregateCatalog,
    executor: AggregationExecutor<S>,
    cache: ResultCache,
    fanout_timeout: Duration,
}

impl<S: QueryStore + 'static> StatsEngine<S> {
    pub fn new(catalog: AggregateCatalog, executor: AggregationExecutor<S>, cache: CacheSettings) -> Self {
        Self {
            catalog,
            executor,
            cache: ResultCache::new(cache),
            fanout_timeout: DEFAULT_FANOUT_TIMEOUT,
        }
    }

    pub fn with_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.fanout_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &AggregateCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Fetches one aggregate, serving it from the cache inside the
    /// freshness window.
    pub async fn fetch(&self, kind: AggregateKind, spec: &FilterSpec) -> Result<Vec<AggregateRow>> {
        let query = self.catalog.plan(kind, spec)?;
        if let Some(rows) = self.cache.get_fresh(kind, spec).await {
            return Ok(rows);
        }

        let rows = self.executor.execute(&query).await?;
        self.cache.insert(kind, spec, rows.clone()).await;
        Ok(rows)
    }

    /// Runs the given aggregates concurrently under one filter set.
    ///
    /// Every requested aggregate appears in the result. Those still running
    /// at the fan-out deadline are aborted and reported as timed out, and a
    /// task that panics is reported as a non-transient failure; the rest
    /// keep their own outcome. Dropping the returned future aborts all
    /// outstanding work.
    pub async fn fan_out(
        self: &Arc<Self>,
        kinds: &[AggregateKind],
        spec: &FilterSpec,
    ) -> BTreeMap<AggregateKind, AggregateOutcome> {
        let deadline = Instant::now() + self.fanout_timeout;
        let mut tasks = JoinSet::new();
        let mut task_kinds: HashMap<task::Id, AggregateKind> = HashMap::new();
        for &kind in kinds {
            let engine = Arc::clone(self);
            let spec = spec.clone();
            let handle = tasks.spawn(async move {
                let result = engine.fetch(kind, &spec).await;
                (kind, AggregateOutcome::from_result(result))
            });
            task_kinds.insert(handle.id(), kind);
        }

        let mut settled = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((kind, outcome)))) => {
                    settled.insert(kind, outcome);
                }
                Ok(Some(Err(e))) => match task_kinds.get(&e.id()) {
                    Some(&kind) => {
                        tracing::error!("{} task failed: {}", kind, e);
                        settled.insert(
                            kind,
                            AggregateOutcome::Error {
                                error: AggregateFailure::task_failed(kind, &e.to_string()),
                            },
                        );
                    }
                    None => tracing::error!("Untracked aggregate task failed: {}", e),
                },
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Fan-out deadline of {:?} passed with {} aggregate(s) outstanding",
                        self.fanout_timeout,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        for &kind in kinds {
            settled.entry(kind).or_insert_with(|| AggregateOutcome::Error {
                error: AggregateFailure::timed_out(kind),
            });
        }
        settled
    }
}
