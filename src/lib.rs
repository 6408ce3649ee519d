pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::StatsConfig;

pub use crate::adapters::{Dataset, HttpSqlStore, MemoryStore};
pub use crate::core::{AggregateCatalog, AggregationExecutor, CascadeOrchestrator, StatsEngine};
pub use crate::domain::model::{AggregateKind, FilterSpec, Gender, Rating};
pub use crate::utils::error::{Result, StatsError};
