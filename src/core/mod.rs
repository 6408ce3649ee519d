pub mod assembler;
pub mod cache;
pub mod cascade;
pub mod catalog;
pub mod engine;
pub mod executor;
pub mod predicate;
pub mod render;

pub use assembler::{AggregateOutcome, ResultAssembler, ViewModel};
pub use cache::{CacheSettings, ResultCache};
pub use cascade::{CascadeOrchestrator, CascadeState, FetchPlan, RefreshOutcome};
pub use catalog::{AggregateCatalog, CatalogSettings};
pub use engine::StatsEngine;
pub use executor::{AggregationExecutor, RetryPolicy};
pub use predicate::PredicateBuilder;
pub use crate::utils::error::Result;
